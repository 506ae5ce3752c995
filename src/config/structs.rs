use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub packages: PackagesConfig,
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub wifi: WifiConfig,
    #[serde(default)]
    pub hotspot: HotspotConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub media: MediaConfig,
}

/// Overrides for values normally taken from the environment
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub user: Option<String>,
    pub home: Option<PathBuf>,
    pub project_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PackagesConfig {
    pub required: Vec<String>,
}

impl Default for PackagesConfig {
    fn default() -> Self {
        Self {
            required: [
                "git",
                "python3",
                "python3-venv",
                "python3-pip",
                "ffmpeg",
                "network-manager",
                "iw",
                "logrotate",
            ]
            .iter()
            .map(|p| p.to_string())
            .collect(),
        }
    }
}

/// How a unit is brought up during install
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    /// The appliance server: enabled, restarted and probed
    Primary,
    /// Runs to completion; enabled only
    Oneshot,
    /// Triggered by the next boot; enabled only, never started
    Boot,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceSpec {
    pub unit: String,
    /// Template path, relative to the project directory
    pub template: PathBuf,
    pub kind: ServiceKind,
}

impl ServiceSpec {
    fn new(unit: &str, template: &str, kind: ServiceKind) -> Self {
        Self {
            unit: unit.to_string(),
            template: PathBuf::from(template),
            kind,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    /// Delay before probing the primary service after restart
    pub settle_secs: u64,
    pub units: Vec<ServiceSpec>,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            settle_secs: 3,
            units: vec![
                ServiceSpec::new("loop.service", "services/loop.service", ServiceKind::Primary),
                ServiceSpec::new(
                    "loop-wifi-powersave.service",
                    "services/loop-wifi-powersave.service",
                    ServiceKind::Oneshot,
                ),
                ServiceSpec::new(
                    "loop-hotspot.service",
                    "services/loop-hotspot.service",
                    ServiceKind::Boot,
                ),
            ],
        }
    }
}

impl ServicesConfig {
    pub fn primary(&self) -> Option<&ServiceSpec> {
        self.units.iter().find(|s| s.kind == ServiceKind::Primary)
    }
}

/// Host-global locations of every artifact we reconcile
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub unit_dir: PathBuf,
    pub binary: PathBuf,
    pub networkmanager_conf: PathBuf,
    pub polkit_rule: PathBuf,
    pub logrotate: PathBuf,
    /// Kernel boot config candidates, first existing one wins
    pub boot_configs: Vec<PathBuf>,
    pub sysfs_net: PathBuf,
    pub device_tree_model: PathBuf,
    pub system_log_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            unit_dir: PathBuf::from("/etc/systemd/system"),
            binary: PathBuf::from("/usr/local/bin/loop-setup"),
            networkmanager_conf: PathBuf::from(
                "/etc/NetworkManager/conf.d/default-wifi-powersave-on.conf",
            ),
            polkit_rule: PathBuf::from("/etc/polkit-1/localauthority/50-local.d/loop-network.pkla"),
            logrotate: PathBuf::from("/etc/logrotate.d/loop"),
            boot_configs: vec![
                PathBuf::from("/boot/firmware/config.txt"),
                PathBuf::from("/boot/config.txt"),
            ],
            sysfs_net: PathBuf::from("/sys/class/net"),
            device_tree_model: PathBuf::from("/proc/device-tree/model"),
            system_log_dir: PathBuf::from("/var/log/loop"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WifiConfig {
    /// Interface names tried in order; a trailing `*` matches by prefix
    pub candidates: Vec<String>,
    pub fallback_interface: String,
    pub settle_secs: u64,
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            candidates: vec![
                "wlan0".to_string(),
                "wlan1".to_string(),
                "wlp*".to_string(),
                "wlx*".to_string(),
            ],
            fallback_interface: "wlan0".to_string(),
            settle_secs: 3,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HotspotConfig {
    pub enabled: bool,
    pub connection_name: String,
    pub ssid: String,
    /// WPA2 passphrase; an open network when unset
    pub password: Option<String>,
    pub address: String,
}

impl Default for HotspotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            connection_name: "LOOP-Hotspot".to_string(),
            ssid: "LOOP-Setup".to_string(),
            password: None,
            address: "192.168.24.1/24".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Lines that must be present in the kernel boot config
    pub boot_directives: Vec<String>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            boot_directives: vec!["dtparam=spi=on".to_string()],
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Bundled media imported on first install, relative to the project directory
    pub default_media_dir: PathBuf,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            default_media_dir: PathBuf::from("assets/default-media"),
        }
    }
}

/// Values resolved for this run from config, environment and CLI
#[derive(Debug, Clone)]
pub struct Host {
    /// Account the appliance runs as
    pub user: String,
    pub home: PathBuf,
    pub project_dir: PathBuf,
}

impl Host {
    pub fn backend_dir(&self) -> PathBuf {
        self.project_dir.join("backend")
    }

    /// Appliance config the server refuses to start without
    pub fn backend_config(&self) -> PathBuf {
        self.backend_dir().join("config.json")
    }

    pub fn state(&self) -> StatePaths {
        StatePaths::under(&self.home)
    }
}

/// Per-user state kept under `$HOME/.loop`
#[derive(Debug, Clone)]
pub struct StatePaths {
    pub root: PathBuf,
    pub raw_media: PathBuf,
    pub processed_media: PathBuf,
    pub index: PathBuf,
    pub logs: PathBuf,
    pub setup_marker: PathBuf,
}

impl StatePaths {
    pub fn under(home: &Path) -> Self {
        let root = home.join(".loop");
        let media = root.join("media");
        Self {
            raw_media: media.join("raw"),
            processed_media: media.join("processed"),
            index: media.join("index.json"),
            logs: root.join("logs"),
            setup_marker: root.join(".setup-complete"),
            root,
        }
    }
}
