//! Desired-state reconciliation for config files
//!
//! A [`DesiredFile`] pairs a path with the content we want there. Observing it
//! tells whether a write is needed; reconciling writes only when it is.

use anyhow::{Context, Result};
use log::{debug, info};
use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Observed state of a managed file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Missing,
    /// Present but not what we want
    Drifted,
    Satisfied,
}

#[derive(Debug, Clone)]
pub struct DesiredFile {
    pub path: PathBuf,
    pub content: String,
    /// Lines that must be present. Empty means the whole file must match.
    pub directives: Vec<String>,
    pub mode: u32,
}

impl DesiredFile {
    pub fn new(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            directives: Vec::new(),
            mode: 0o644,
        }
    }

    pub fn with_directives<I, S>(mut self, directives: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.directives = directives.into_iter().map(Into::into).collect();
        self
    }

    pub fn observe(&self) -> FileState {
        let current = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(_) if !self.path.exists() => return FileState::Missing,
            // Unreadable counts as wrong; the rewrite will surface the real error
            Err(_) => return FileState::Drifted,
        };

        let satisfied = if self.directives.is_empty() {
            current == self.content
        } else {
            self.directives
                .iter()
                .all(|d| current.lines().any(|l| l.trim() == d.trim()))
        };

        if satisfied {
            FileState::Satisfied
        } else {
            FileState::Drifted
        }
    }

    pub fn needs_write(&self) -> bool {
        self.observe() != FileState::Satisfied
    }

    /// Write the file if it is missing or drifted. Returns whether it wrote.
    pub fn reconcile(&self) -> Result<bool> {
        match self.observe() {
            FileState::Satisfied => {
                debug!("{} already up to date", self.path.display());
                Ok(false)
            }
            state => {
                info!("Writing {} ({:?})", self.path.display(), state);
                write_atomic(&self.path, self.content.as_bytes(), self.mode)?;
                Ok(true)
            }
        }
    }
}

/// Replace `path` with `data` via a temp file in the same directory
pub fn write_atomic(path: &Path, data: &[u8], mode: u32) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("{} has no parent directory", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create {}", parent.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
    tmp.write_all(data)?;
    tmp.as_file().set_permissions(fs::Permissions::from_mode(mode))?;
    tmp.persist(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
