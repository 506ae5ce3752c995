//! Thin `systemctl` wrapper

use anyhow::{bail, Result};
use log::{debug, warn};
use std::path::Path;

use crate::utils::command::CommandRunner;

/// Where a unit stands on the way to running
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ServiceState {
    Absent,
    /// Unit file present but not enabled
    Registered,
    Enabled,
    Running,
}

impl ServiceState {
    pub fn label(&self) -> &'static str {
        match self {
            ServiceState::Absent => "not installed",
            ServiceState::Registered => "installed, disabled",
            ServiceState::Enabled => "enabled, not running",
            ServiceState::Running => "running",
        }
    }
}

pub struct Systemctl<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> Systemctl<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    fn must(&self, args: &[&str]) -> Result<()> {
        let out = self.runner.run("systemctl", args)?;
        if !out.success {
            bail!(
                "systemctl {} failed ({}): {}",
                args.join(" "),
                out.status_text(),
                out.stderr.trim()
            );
        }
        Ok(())
    }

    pub fn daemon_reload(&self) -> Result<()> {
        self.must(&["daemon-reload"])
    }

    pub fn enable(&self, unit: &str) -> Result<()> {
        self.must(&["enable", unit])
    }

    pub fn restart(&self, unit: &str) -> Result<()> {
        self.must(&["restart", unit])
    }

    pub fn stop(&self, unit: &str) -> Result<()> {
        self.must(&["stop", unit])
    }

    pub fn is_active(&self, unit: &str) -> bool {
        self.runner
            .run("systemctl", &["is-active", "--quiet", unit])
            .map(|o| o.success)
            .unwrap_or(false)
    }

    pub fn is_enabled(&self, unit: &str) -> bool {
        self.runner
            .run("systemctl", &["is-enabled", "--quiet", unit])
            .map(|o| o.success)
            .unwrap_or(false)
    }

    /// Restart a daemon so it picks up new config. Failure is only logged.
    pub fn restart_best_effort(&self, unit: &str) -> bool {
        self.best_effort(&["restart", unit])
    }

    /// Reload a daemon's config, restarting if it cannot reload. Failure is only logged.
    pub fn reload_best_effort(&self, unit: &str) -> bool {
        self.best_effort(&["reload-or-restart", unit])
    }

    fn best_effort(&self, args: &[&str]) -> bool {
        match self.runner.run("systemctl", args) {
            Ok(out) if out.success => {
                debug!("systemctl {} ok", args.join(" "));
                true
            }
            Ok(out) => {
                warn!(
                    "systemctl {} failed: {}; change applies after next boot",
                    args.join(" "),
                    out.stderr.trim()
                );
                false
            }
            Err(e) => {
                warn!("systemctl {} failed: {}", args.join(" "), e);
                false
            }
        }
    }

    /// Probe a unit's position in the Absent → Registered → Enabled → Running chain
    pub fn state(&self, unit_dir: &Path, unit: &str) -> ServiceState {
        if !unit_dir.join(unit).exists() {
            ServiceState::Absent
        } else if self.is_active(unit) {
            ServiceState::Running
        } else if self.is_enabled(unit) {
            ServiceState::Enabled
        } else {
            ServiceState::Registered
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::command::fake::FakeRunner;
    use crate::utils::command::CommandOutput;
    use std::fs;

    #[test]
    fn test_state_probe() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.service"), "").unwrap();
        fs::write(dir.path().join("b.service"), "").unwrap();
        fs::write(dir.path().join("c.service"), "").unwrap();

        let runner = FakeRunner::new()
            .on("systemctl is-active", CommandOutput::failed(3, ""))
            .on("systemctl is-active --quiet a.service", CommandOutput::ok(""))
            .on("systemctl is-enabled", CommandOutput::failed(1, ""))
            .on("systemctl is-enabled --quiet b.service", CommandOutput::ok(""));
        let systemctl = Systemctl::new(&runner);

        assert_eq!(systemctl.state(dir.path(), "a.service"), ServiceState::Running);
        assert_eq!(systemctl.state(dir.path(), "b.service"), ServiceState::Enabled);
        assert_eq!(systemctl.state(dir.path(), "c.service"), ServiceState::Registered);
        assert_eq!(systemctl.state(dir.path(), "d.service"), ServiceState::Absent);
    }

    #[test]
    fn test_best_effort_swallows_failures() {
        let runner = FakeRunner::new()
            .on("systemctl restart polkit", CommandOutput::failed(5, "Unit polkit.service not found."))
            .missing("systemctl reload-or-restart");
        let systemctl = Systemctl::new(&runner);

        assert!(!systemctl.restart_best_effort("polkit"));
        assert!(!systemctl.reload_best_effort("NetworkManager"));
        assert!(systemctl.restart("loop.service").is_ok());
    }

    #[test]
    fn test_mutations_fail_loudly() {
        let runner = FakeRunner::new().on("systemctl enable", CommandOutput::failed(1, "boom"));
        let err = Systemctl::new(&runner).enable("loop.service").unwrap_err();
        assert!(err.to_string().contains("systemctl enable loop.service failed"));
    }
}
