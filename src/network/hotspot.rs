//! Access-point fallback through NetworkManager
//!
//! When the frame has no known network it raises its own access point so the
//! operator can reach the setup page.

use anyhow::{bail, Result};
use log::{debug, info, warn};

use crate::config::structs::HotspotConfig;
use crate::network::wifi::WifiInterface;
use crate::utils::command::CommandRunner;

/// What `wifi-fallback` did
#[derive(Debug, PartialEq, Eq)]
pub enum FallbackAction {
    /// A client connection is up; nothing to do
    Connected,
    HotspotStarted,
    Disabled,
}

pub struct Hotspot<'a> {
    runner: &'a dyn CommandRunner,
    config: &'a HotspotConfig,
}

impl<'a> Hotspot<'a> {
    pub fn new(runner: &'a dyn CommandRunner, config: &'a HotspotConfig) -> Self {
        Self { runner, config }
    }

    /// Whether NetworkManager already has our profile
    pub fn profile_exists(&self) -> Result<bool> {
        let out = self
            .runner
            .run("nmcli", &["-t", "-f", "NAME", "connection", "show"])?;
        if !out.success {
            bail!("nmcli connection show failed: {}", out.stderr.trim());
        }
        Ok(out.stdout.lines().any(|l| l == self.config.connection_name))
    }

    fn add_args(&self, ifc: &WifiInterface) -> Vec<String> {
        let mut args: Vec<String> = [
            "connection", "add",
            "type", "wifi",
            "ifname", ifc.name.as_str(),
            "con-name", self.config.connection_name.as_str(),
            "autoconnect", "no",
            "ssid", self.config.ssid.as_str(),
            "802-11-wireless.mode", "ap",
            "802-11-wireless.band", "bg",
            "ipv4.method", "shared",
            "ipv4.addresses", self.config.address.as_str(),
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        if let Some(password) = &self.config.password {
            args.extend(
                ["wifi-sec.key-mgmt", "wpa-psk", "wifi-sec.psk", password.as_str()]
                    .iter()
                    .map(|s| s.to_string()),
            );
        }
        args
    }

    /// Create the access-point profile if missing. Returns whether it was created.
    pub fn ensure_profile(&self, ifc: &WifiInterface) -> Result<bool> {
        if !self.config.enabled {
            debug!("Hotspot fallback disabled");
            return Ok(false);
        }

        if let Some(password) = &self.config.password {
            if password.len() < 8 {
                bail!("Hotspot password must be at least 8 characters");
            }
        }

        if self.profile_exists()? {
            info!("Hotspot profile {} already exists", self.config.connection_name);
            return Ok(false);
        }

        info!(
            "Creating hotspot profile {} (SSID {}) on {}",
            self.config.connection_name, self.config.ssid, ifc.name
        );
        let args = self.add_args(ifc);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let out = self.runner.run("nmcli", &args)?;
        if !out.success {
            bail!("nmcli connection add failed: {}", out.stderr.trim());
        }
        Ok(true)
    }

    /// NetworkManager's state for `ifc`, or `None` if it could not be read
    pub fn device_state(&self, ifc: &WifiInterface) -> Option<String> {
        let out = match self
            .runner
            .run("nmcli", &["-t", "-f", "DEVICE,STATE", "device"])
        {
            Ok(out) if out.success => out,
            Ok(out) => {
                warn!(
                    "nmcli device failed ({}): {}",
                    out.status_text(),
                    out.stderr.trim()
                );
                return None;
            }
            Err(e) => {
                warn!("Could not query NetworkManager: {:#}", e);
                return None;
            }
        };

        out.stdout.lines().find_map(|line| {
            let (device, state) = line.split_once(':')?;
            (device == ifc.name).then(|| state.to_string())
        })
    }

    /// Whether NetworkManager reports `ifc` as connected. Unknown counts as not.
    pub fn is_connected(&self, ifc: &WifiInterface) -> bool {
        self.device_state(ifc).as_deref() == Some("connected")
    }

    /// Bring the hotspot up unless a client connection is already active
    pub fn fallback(&self, ifc: &WifiInterface) -> Result<FallbackAction> {
        if !self.config.enabled {
            return Ok(FallbackAction::Disabled);
        }

        if self.is_connected(ifc) {
            info!("{} is connected, hotspot not needed", ifc.name);
            return Ok(FallbackAction::Connected);
        }

        warn!("{} has no connection, starting hotspot {}", ifc.name, self.config.ssid);
        let out = self
            .runner
            .run("nmcli", &["connection", "up", &self.config.connection_name])?;
        if !out.success {
            bail!(
                "Failed to start hotspot {}: {}",
                self.config.connection_name,
                out.stderr.trim()
            );
        }
        Ok(FallbackAction::HotspotStarted)
    }
}
