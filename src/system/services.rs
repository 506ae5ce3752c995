//! systemd unit installation for the appliance services
//!
//! Unit templates live in the project tree and are rendered with host values
//! on every install, replacing whatever was registered before.

use anyhow::{bail, Context, Result};
use log::{info, warn};
use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use crate::config::structs::{Config, ServiceKind, ServiceSpec};
use crate::provision::state::write_atomic;
use crate::provision::template::{Template, TemplateParams};
use crate::system::systemd::{ServiceState, Systemctl};
use crate::utils::command::CommandRunner;

/// Result of rendering the declared units
#[derive(Debug, Default)]
pub struct InstallOutcome {
    pub installed: Vec<String>,
    /// Units whose template was not found
    pub skipped: Vec<String>,
}

/// One line of `check` output
#[derive(Debug)]
pub struct ServiceStatus {
    pub unit: String,
    pub kind: ServiceKind,
    pub state: ServiceState,
    pub template_present: bool,
}

impl ServiceStatus {
    pub fn healthy(&self) -> bool {
        match self.kind {
            ServiceKind::Primary => self.state == ServiceState::Running,
            // Optional units without a template were never meant to be here
            _ => !self.template_present || self.state >= ServiceState::Enabled,
        }
    }
}

pub struct ServiceInstaller<'a> {
    systemctl: Systemctl<'a>,
    config: &'a Config,
    params: &'a TemplateParams,
}

impl<'a> ServiceInstaller<'a> {
    pub fn new(runner: &'a dyn CommandRunner, config: &'a Config, params: &'a TemplateParams) -> Self {
        Self {
            systemctl: Systemctl::new(runner),
            config,
            params,
        }
    }

    fn template_path(&self, spec: &ServiceSpec) -> PathBuf {
        self.params.project_dir.join(&spec.template)
    }

    fn unit_path(&self, spec: &ServiceSpec) -> PathBuf {
        self.config.paths.unit_dir.join(&spec.unit)
    }

    /// Render every unit, reload systemd once and enable what was written.
    ///
    /// Nothing is started here; see [`Self::start_primary`].
    pub fn install_units(&self) -> Result<InstallOutcome> {
        let mut outcome = InstallOutcome::default();

        for spec in &self.config.services.units {
            let template_path = self.template_path(spec);
            if !template_path.exists() {
                warn!(
                    "Template {} not found, skipping {}",
                    template_path.display(),
                    spec.unit
                );
                outcome.skipped.push(spec.unit.clone());
                continue;
            }

            let body = fs::read_to_string(&template_path)
                .with_context(|| format!("Failed to read {}", template_path.display()))?;
            let unit = Template::new(&spec.unit, &body).render_unit(self.params)?;

            let unit_path = self.unit_path(spec);
            info!("Creating systemd service: {}", unit_path.display());
            write_atomic(&unit_path, unit.as_bytes(), 0o644)?;
            outcome.installed.push(spec.unit.clone());
        }

        if outcome.installed.is_empty() {
            warn!("No service templates found; nothing registered");
            return Ok(outcome);
        }

        self.systemctl.daemon_reload()?;

        for spec in &self.config.services.units {
            if outcome.installed.contains(&spec.unit) {
                info!("Enabling {} ({:?})", spec.unit, spec.kind);
                self.systemctl.enable(&spec.unit)?;
            }
        }

        Ok(outcome)
    }

    /// Restart the primary service and confirm it came up
    pub fn start_primary(&self) -> Result<()> {
        let Some(primary) = self.config.services.primary() else {
            warn!("No primary service declared");
            return Ok(());
        };

        if !self.unit_path(primary).exists() {
            bail!(
                "{} is not installed (template {} missing)",
                primary.unit,
                self.template_path(primary).display()
            );
        }

        info!("Starting {}...", primary.unit);
        self.systemctl.restart(&primary.unit)?;

        thread::sleep(Duration::from_secs(self.config.services.settle_secs));

        if !self.systemctl.is_active(&primary.unit) {
            bail!(
                "{} failed to start. Check logs: journalctl -u {} -n 50",
                primary.unit,
                primary.unit
            );
        }

        info!("{} is running", primary.unit);
        Ok(())
    }

    /// Whether the primary unit file is registered with systemd
    pub fn primary_registered(&self) -> bool {
        self.config
            .services
            .primary()
            .map(|p| self.unit_path(p).exists())
            .unwrap_or(false)
    }

    /// Report every declared unit's state without changing anything
    pub fn check(&self) -> Vec<ServiceStatus> {
        self.config
            .services
            .units
            .iter()
            .map(|spec| ServiceStatus {
                unit: spec.unit.clone(),
                kind: spec.kind,
                state: self.systemctl.state(&self.config.paths.unit_dir, &spec.unit),
                template_present: self.template_path(spec).exists(),
            })
            .collect()
    }
}
