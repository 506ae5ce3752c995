//! Wi-Fi power-save and NetworkManager permission configuration
//!
//! Power saving on the Pi radio drops multicast, which breaks mDNS discovery
//! of the appliance. We disable it at runtime and persistently through
//! NetworkManager, and grant the runtime user NetworkManager rights via polkit
//! so the web UI can switch networks without an auth prompt.

use anyhow::Result;
use log::{info, warn};
use std::thread;
use std::time::Duration;

use crate::config::structs::Config;
use crate::network::wifi::{self, DiscoverySource, InterfaceProbe, WifiInterface};
use crate::provision::state::DesiredFile;
use crate::provision::template::TemplateParams;
use crate::provision::templates::{NM_ACTION, NM_POWERSAVE, NM_POWERSAVE_DIRECTIVE, POLKIT_NETWORK};
use crate::system::systemd::Systemctl;
use crate::utils::command::CommandRunner;

/// Outcome of a read-only Wi-Fi verification
#[derive(Debug)]
pub struct WifiReport {
    pub interface: WifiInterface,
    /// `Some(false)` is the state we want
    pub power_save: Option<bool>,
    pub policy_present: bool,
    /// Persistent NetworkManager power-save config in place
    pub nm_config_ok: bool,
}

impl WifiReport {
    pub fn passed(&self) -> bool {
        self.power_save == Some(false) && self.policy_present
    }
}

pub struct WifiConfigurator<'a> {
    runner: &'a dyn CommandRunner,
    config: &'a Config,
    params: &'a TemplateParams,
}

impl<'a> WifiConfigurator<'a> {
    pub fn new(runner: &'a dyn CommandRunner, config: &'a Config, params: &'a TemplateParams) -> Self {
        Self {
            runner,
            config,
            params,
        }
    }

    pub fn discover(&self) -> WifiInterface {
        InterfaceProbe::new(
            self.runner,
            &self.config.paths.sysfs_net,
            &self.config.wifi.candidates,
            &self.config.wifi.fallback_interface,
        )
        .discover()
    }

    pub fn powersave_file(&self) -> Result<DesiredFile> {
        Ok(
            DesiredFile::new(&self.config.paths.networkmanager_conf, NM_POWERSAVE.render(self.params)?)
                .with_directives([NM_POWERSAVE_DIRECTIVE]),
        )
    }

    pub fn policy_file(&self) -> Result<DesiredFile> {
        Ok(
            DesiredFile::new(&self.config.paths.polkit_rule, POLKIT_NETWORK.render(self.params)?)
                .with_directives([
                    format!("Identity=unix-user:{}", self.params.user),
                    format!("Action={}", NM_ACTION),
                ]),
        )
    }

    /// Disable power save now and for future boots; grant NetworkManager rights.
    ///
    /// Only failing to write the config files is an error. Daemon reloads and
    /// the final read-back are informational.
    pub fn configure(&self) -> Result<WifiInterface> {
        let ifc = self.discover();
        if ifc.source == DiscoverySource::Fallback {
            warn!("Configuring assumed interface {}; check the Wi-Fi adapter", ifc.name);
        }

        wifi::disable_power_save(self.runner, &ifc);

        let nm_written = self.powersave_file()?.reconcile()?;
        let policy_written = self.policy_file()?.reconcile()?;

        let systemctl = Systemctl::new(self.runner);
        if policy_written {
            systemctl.restart_best_effort("polkit");
        }
        if nm_written {
            systemctl.reload_best_effort("NetworkManager");
        }
        if !nm_written && !policy_written {
            info!("Wi-Fi configuration already in place");
        }

        thread::sleep(Duration::from_secs(self.config.wifi.settle_secs));

        match wifi::power_save(self.runner, &ifc) {
            Some(false) => info!("Power save on {} is off", ifc.name),
            Some(true) => warn!("Power save on {} still reports on", ifc.name),
            None => warn!("Could not read back power save state on {}", ifc.name),
        }

        Ok(ifc)
    }

    /// Re-derive the interface and check state without changing anything
    pub fn verify(&self) -> WifiReport {
        let interface = self.discover();
        let power_save = wifi::power_save(self.runner, &interface);
        let policy_present = self.config.paths.polkit_rule.exists();
        let nm_config_ok = self
            .powersave_file()
            .map(|f| !f.needs_write())
            .unwrap_or(false);

        WifiReport {
            interface,
            power_save,
            policy_present,
            nm_config_ok,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::command::fake::FakeRunner;
    use crate::utils::command::CommandOutput;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Config, TemplateParams) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.paths.sysfs_net = dir.path().join("sys/class/net");
        config.paths.networkmanager_conf = dir.path().join("nm/conf.d/default-wifi-powersave-on.conf");
        config.paths.polkit_rule = dir.path().join("polkit/50-local.d/loop-network.pkla");
        config.wifi.settle_secs = 0;
        fs::create_dir_all(config.paths.sysfs_net.join("wlan0/wireless")).unwrap();

        let params = TemplateParams {
            user: "pi".to_string(),
            home: PathBuf::from("/home/pi"),
            project_dir: PathBuf::from("/home/pi/loop"),
            bin: PathBuf::from("/usr/local/bin/loop-setup"),
        };
        (dir, config, params)
    }

    #[test]
    fn test_configure_writes_artifacts_and_reloads() {
        let (_dir, config, params) = setup();
        let runner = FakeRunner::new()
            .on("iw dev wlan0 get power_save", CommandOutput::ok("Power save: off\n"));

        let ifc = WifiConfigurator::new(&runner, &config, &params).configure().unwrap();
        assert_eq!(ifc.name, "wlan0");

        let nm = fs::read_to_string(&config.paths.networkmanager_conf).unwrap();
        assert!(nm.contains("wifi.powersave = 2"));
        let policy = fs::read_to_string(&config.paths.polkit_rule).unwrap();
        assert!(policy.contains("Identity=unix-user:pi"));
        assert!(policy.contains("Action=org.freedesktop.NetworkManager.*"));

        assert_eq!(
            runner.calls(),
            vec![
                "iw dev wlan0 set power_save off",
                "systemctl restart polkit",
                "systemctl reload-or-restart NetworkManager",
                "iw dev wlan0 get power_save",
            ]
        );
    }

    #[test]
    fn test_rerun_is_byte_identical_and_quiet() {
        let (_dir, config, params) = setup();
        let runner = FakeRunner::new();
        let configurator = WifiConfigurator::new(&runner, &config, &params);

        configurator.configure().unwrap();
        let policy = fs::read(&config.paths.polkit_rule).unwrap();
        let nm = fs::read(&config.paths.networkmanager_conf).unwrap();

        let runner = FakeRunner::new();
        WifiConfigurator::new(&runner, &config, &params).configure().unwrap();

        assert_eq!(fs::read(&config.paths.polkit_rule).unwrap(), policy);
        assert_eq!(fs::read(&config.paths.networkmanager_conf).unwrap(), nm);
        assert!(runner.calls_to("systemctl").is_empty());
    }

    #[test]
    fn test_wrong_user_in_policy_is_rewritten() {
        let (_dir, config, params) = setup();
        fs::create_dir_all(config.paths.polkit_rule.parent().unwrap()).unwrap();
        fs::write(
            &config.paths.polkit_rule,
            "[x]\nIdentity=unix-user:olduser\nAction=org.freedesktop.NetworkManager.*\n",
        )
        .unwrap();

        let runner = FakeRunner::new();
        WifiConfigurator::new(&runner, &config, &params).configure().unwrap();

        let policy = fs::read_to_string(&config.paths.polkit_rule).unwrap();
        assert!(policy.contains("Identity=unix-user:pi"));
        assert!(!policy.contains("olduser"));
        assert_eq!(runner.calls_to("systemctl restart polkit").len(), 1);
        // the NetworkManager file was missing too
        assert_eq!(runner.calls_to("systemctl reload-or-restart").len(), 1);
    }

    #[test]
    fn test_reload_failures_are_not_fatal() {
        let (_dir, config, params) = setup();
        let runner = FakeRunner::new()
            .on("systemctl", CommandOutput::failed(1, "Failed to connect to bus"))
            .missing("iw");

        let ifc = WifiConfigurator::new(&runner, &config, &params).configure();
        assert!(ifc.is_ok());
        assert!(config.paths.polkit_rule.exists());
    }

    #[test]
    fn test_verify_reports_without_mutating() {
        let (_dir, config, params) = setup();
        let runner = FakeRunner::new()
            .on("iw dev wlan0 get power_save", CommandOutput::ok("Power save: on\n"));
        let configurator = WifiConfigurator::new(&runner, &config, &params);

        let report = configurator.verify();
        assert_eq!(report.interface.name, "wlan0");
        assert_eq!(report.power_save, Some(true));
        assert!(!report.policy_present);
        assert!(!report.nm_config_ok);
        assert!(!report.passed());
        assert!(!config.paths.polkit_rule.exists());
        assert_eq!(runner.calls(), vec!["iw dev wlan0 get power_save"]);
    }

    #[test]
    fn test_verify_passes_when_configured() {
        let (_dir, config, params) = setup();
        let runner = FakeRunner::new()
            .on("iw dev wlan0 get power_save", CommandOutput::ok("Power save: off\n"));
        let configurator = WifiConfigurator::new(&runner, &config, &params);

        configurator.configure().unwrap();
        let report = configurator.verify();
        assert!(report.passed());
        assert!(report.nm_config_ok);
    }
}
