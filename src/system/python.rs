//! Python virtual environment for the appliance backend

use anyhow::{bail, Result};
use log::info;
use std::path::{Path, PathBuf};

use crate::utils::command::CommandRunner;

pub struct PythonEnv<'a> {
    runner: &'a dyn CommandRunner,
    backend_dir: PathBuf,
}

impl<'a> PythonEnv<'a> {
    pub fn new(runner: &'a dyn CommandRunner, backend_dir: &Path) -> Self {
        Self {
            runner,
            backend_dir: backend_dir.to_path_buf(),
        }
    }

    pub fn venv_dir(&self) -> PathBuf {
        self.backend_dir.join("venv")
    }

    fn requirements(&self) -> PathBuf {
        self.backend_dir.join("requirements.txt")
    }

    fn run_checked(&self, program: &str, args: &[&str]) -> Result<()> {
        let out = self.runner.run(program, args)?;
        if !out.success {
            bail!(
                "{} {} failed ({}): {}",
                program,
                args.join(" "),
                out.status_text(),
                out.stderr.trim()
            );
        }
        Ok(())
    }

    /// Create the venv if needed and install backend requirements into it
    pub fn ensure(&self) -> Result<()> {
        if !self.backend_dir.is_dir() {
            bail!("Backend directory not found: {}", self.backend_dir.display());
        }

        let venv = self.venv_dir();
        let python = venv.join("bin/python");
        if python.exists() {
            info!("Virtual environment present at {}", venv.display());
        } else {
            info!("Creating virtual environment at {}", venv.display());
            self.run_checked("python3", &["-m", "venv", &venv.to_string_lossy()])?;
        }

        let requirements = self.requirements();
        if requirements.exists() {
            info!("Installing Python requirements...");
            let pip = venv.join("bin/pip");
            self.run_checked(
                &pip.to_string_lossy(),
                &["install", "--quiet", "-r", &requirements.to_string_lossy()],
            )?;
        } else {
            info!("No requirements.txt in {}, skipping pip", self.backend_dir.display());
        }

        Ok(())
    }
}
