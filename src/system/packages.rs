//! OS package reconciliation via dpkg/apt

use anyhow::{bail, Result};
use log::{debug, info};
use std::collections::HashSet;

use crate::utils::command::CommandRunner;

pub struct PackageReconciler<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> PackageReconciler<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    /// Whether dpkg reports `package` as fully installed
    pub fn is_installed(&self, package: &str) -> Result<bool> {
        let out = self
            .runner
            .run("dpkg-query", &["-W", "-f=${Status}", package])?;
        // dpkg-query exits non-zero for packages it has never heard of
        Ok(out.success && out.stdout.contains("install ok installed"))
    }

    /// Declared packages not currently installed, in declaration order, deduplicated
    pub fn missing(&self, required: &[String]) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        let mut missing = Vec::new();

        for package in required {
            if !seen.insert(package.as_str()) {
                continue;
            }
            if self.is_installed(package)? {
                debug!("Package {} already installed", package);
            } else {
                missing.push(package.clone());
            }
        }

        Ok(missing)
    }

    /// Install whatever is missing in one batch. Returns what was installed.
    pub fn reconcile(&self, required: &[String]) -> Result<Vec<String>> {
        let missing = self.missing(required)?;
        if missing.is_empty() {
            info!("All {} required packages present", required.len());
            return Ok(missing);
        }

        info!("Installing missing packages: {}", missing.join(" "));

        let update = self.runner.run("apt-get", &["update"])?;
        if !update.success {
            bail!(
                "apt-get update failed ({}): {}",
                update.status_text(),
                update.stderr.trim()
            );
        }

        let mut args = vec!["install", "-y"];
        args.extend(missing.iter().map(String::as_str));

        let install = self.runner.run("apt-get", &args)?;
        if !install.success {
            bail!(
                "apt-get install failed ({}): {}",
                install.status_text(),
                install.stderr.trim()
            );
        }

        Ok(missing)
    }
}
