//! Wi-Fi interface discovery and runtime power-save control
//!
//! Discovery never fails: it walks conventional names, then asks `iw`, and
//! finally settles for the configured fallback name.

use log::{debug, info, warn};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::utils::command::CommandRunner;

static IW_INTERFACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*Interface\s+(\S+)").expect("valid iw regex"));

static IW_POWER_SAVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Power save:\s*(on|off)").expect("valid iw regex"));

/// Which discovery tier produced the interface name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoverySource {
    /// Matched a configured candidate in sysfs
    Candidate,
    /// Reported by `iw dev`
    WirelessQuery,
    /// Nothing found; configured default used
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WifiInterface {
    pub name: String,
    pub source: DiscoverySource,
}

pub struct InterfaceProbe<'a> {
    runner: &'a dyn CommandRunner,
    sysfs_net: PathBuf,
    candidates: &'a [String],
    fallback: &'a str,
}

impl<'a> InterfaceProbe<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        sysfs_net: &Path,
        candidates: &'a [String],
        fallback: &'a str,
    ) -> Self {
        Self {
            runner,
            sysfs_net: sysfs_net.to_path_buf(),
            candidates,
            fallback,
        }
    }

    /// Interface exists and the kernel exposes wireless capability for it
    fn is_wireless(&self, name: &str) -> bool {
        let dev = self.sysfs_net.join(name);
        dev.join("wireless").exists() || dev.join("phy80211").exists()
    }

    /// Interface names present in sysfs, sorted for stable prefix matching
    fn present(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(&self.sysfs_net)
            .map(|entries| {
                entries
                    .flatten()
                    .map(|e| e.file_name().to_string_lossy().to_string())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    fn from_candidates(&self) -> Option<String> {
        let present = self.present();

        for pattern in self.candidates {
            let found = match pattern.strip_suffix('*') {
                Some(prefix) => present
                    .iter()
                    .find(|n| n.starts_with(prefix) && self.is_wireless(n))
                    .cloned(),
                None => present
                    .iter()
                    .find(|n| *n == pattern && self.is_wireless(n))
                    .cloned(),
            };
            if found.is_some() {
                return found;
            }
        }
        None
    }

    fn from_wireless_query(&self) -> Option<String> {
        match self.runner.run("iw", &["dev"]) {
            Ok(out) if out.success => IW_INTERFACE
                .captures(&out.stdout)
                .map(|c| c[1].to_string()),
            Ok(out) => {
                debug!("iw dev failed: {}", out.stderr.trim());
                None
            }
            Err(e) => {
                debug!("iw unavailable: {}", e);
                None
            }
        }
    }

    pub fn discover(&self) -> WifiInterface {
        if let Some(name) = self.from_candidates() {
            debug!("Found Wi-Fi interface {} in sysfs", name);
            return WifiInterface {
                name,
                source: DiscoverySource::Candidate,
            };
        }

        if let Some(name) = self.from_wireless_query() {
            info!("Found Wi-Fi interface {} via iw", name);
            return WifiInterface {
                name,
                source: DiscoverySource::WirelessQuery,
            };
        }

        warn!(
            "No Wi-Fi interface detected, assuming {}",
            self.fallback
        );
        WifiInterface {
            name: self.fallback.to_string(),
            source: DiscoverySource::Fallback,
        }
    }
}

/// Parse `iw dev <if> get power_save` output; `Some(true)` means power save is on
pub fn parse_power_save(output: &str) -> Option<bool> {
    IW_POWER_SAVE
        .captures(output)
        .map(|c| &c[1] == "on")
}

/// Current power-save state, `None` if it cannot be read
pub fn power_save(runner: &dyn CommandRunner, ifc: &WifiInterface) -> Option<bool> {
    match runner.run("iw", &["dev", &ifc.name, "get", "power_save"]) {
        Ok(out) if out.success => parse_power_save(&out.stdout),
        Ok(out) => {
            debug!("Could not read power save on {}: {}", ifc.name, out.stderr.trim());
            None
        }
        Err(e) => {
            debug!("Could not read power save on {}: {}", ifc.name, e);
            None
        }
    }
}

/// Turn power save off for the running system. Best effort.
pub fn disable_power_save(runner: &dyn CommandRunner, ifc: &WifiInterface) -> bool {
    info!("Disabling power save on {}", ifc.name);

    match runner.run("iw", &["dev", &ifc.name, "set", "power_save", "off"]) {
        Ok(out) if out.success => {
            info!("Power save disabled on {}", ifc.name);
            true
        }
        Ok(out) => {
            warn!("Failed to disable power save on {}: {}", ifc.name, out.stderr.trim());
            false
        }
        Err(e) => {
            warn!("Failed to disable power save on {}: {}", ifc.name, e);
            false
        }
    }
}
