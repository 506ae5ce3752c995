//! Built-in artifact templates

use super::template::Template;

/// NetworkManager: 2 = disable power saving on every WiFi connection
pub const NM_POWERSAVE: Template<'static> = Template::new(
    "networkmanager-powersave",
    "# Managed by loop-setup\n\
     [connection]\n\
     wifi.powersave = 2\n",
);

pub const NM_POWERSAVE_DIRECTIVE: &str = "wifi.powersave = 2";

pub const NM_ACTION: &str = "org.freedesktop.NetworkManager.*";

/// polkit local authority rule letting the runtime user drive NetworkManager
pub const POLKIT_NETWORK: Template<'static> = Template::new(
    "polkit-network",
    "[Allow LOOP to manage NetworkManager]\n\
     Identity=unix-user:__USER__\n\
     Action=org.freedesktop.NetworkManager.*\n\
     ResultAny=yes\n\
     ResultInactive=yes\n\
     ResultActive=yes\n",
);

pub const LOGROTATE: Template<'static> = Template::new(
    "logrotate",
    "__HOME__/.loop/logs/*.log /var/log/loop/*.log {\n    \
     daily\n    \
     rotate 7\n    \
     compress\n    \
     delaycompress\n    \
     missingok\n    \
     notifempty\n    \
     copytruncate\n    \
     su __USER__ __USER__\n\
     }\n",
);

/// Comment written above directives we append to the boot config
pub const BOOT_MARKER: &str = "# LOOP display";
