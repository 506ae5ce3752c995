//! Destructive reset of local media state
//!
//! Operator-invoked only. Leaves the host with empty media directories, the
//! canonical empty index and no setup marker.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use super::index::MediaIndex;
use crate::config::structs::{Config, StatePaths};
use crate::system::systemd::Systemctl;
use crate::utils::command::CommandRunner;
use crate::utils::privilege;

static ROTATED_LOG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\.log\.\d+(\.gz)?|\.gz|\.old)$").expect("valid rotated log regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupMode {
    /// Reset state, then bring the service back
    Cleanup,
    /// Reset state; the caller reinstalls afterwards
    Reset,
}

#[derive(Debug, Default)]
pub struct CleanupSummary {
    pub service_was_active: bool,
    pub removed_entries: usize,
    pub removed_logs: usize,
    pub restarted: bool,
}

/// Remove everything inside `dir`, keeping `dir` itself. Returns entries removed.
fn clear_dir(dir: &Path) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }
    let mut removed = 0;
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))? {
        let path = entry?.path();
        let result = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        result.with_context(|| format!("Failed to remove {}", path.display()))?;
        removed += 1;
    }
    Ok(removed)
}

pub fn is_rotated_log(name: &str) -> bool {
    ROTATED_LOG.is_match(name)
}

fn remove_rotated_logs(dir: &Path) -> Result<usize> {
    let Ok(entries) = fs::read_dir(dir) else {
        debug!("No log directory at {}", dir.display());
        return Ok(0);
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if entry.path().is_file() && is_rotated_log(&name) {
            fs::remove_file(entry.path())
                .with_context(|| format!("Failed to remove {}", entry.path().display()))?;
            removed += 1;
        }
    }
    Ok(removed)
}

pub struct Cleanup<'a> {
    systemctl: Systemctl<'a>,
    config: &'a Config,
    state: StatePaths,
    /// Account the recreated state is handed back to
    owner: Option<String>,
}

impl<'a> Cleanup<'a> {
    pub fn new(runner: &'a dyn CommandRunner, config: &'a Config, state: StatePaths) -> Self {
        Self {
            systemctl: Systemctl::new(runner),
            config,
            state,
            owner: None,
        }
    }

    /// Chown the recreated state to `user` before the service comes back
    pub fn owned_by(mut self, user: &str) -> Self {
        self.owner = Some(user.to_string());
        self
    }

    pub fn run(&self, mode: CleanupMode) -> Result<CleanupSummary> {
        let mut summary = CleanupSummary::default();
        let primary = self.config.services.primary();

        if let Some(primary) = primary {
            if self.systemctl.is_active(&primary.unit) {
                info!("Stopping {}...", primary.unit);
                self.systemctl.stop(&primary.unit)?;
                summary.service_was_active = true;
            }
        }

        summary.removed_entries += clear_dir(&self.state.raw_media)?;
        summary.removed_entries += clear_dir(&self.state.processed_media)?;
        if self.state.index.exists() {
            fs::remove_file(&self.state.index)
                .with_context(|| format!("Failed to remove {}", self.state.index.display()))?;
        }

        fs::create_dir_all(&self.state.raw_media)?;
        fs::create_dir_all(&self.state.processed_media)?;
        MediaIndex::default().save(&self.state.index)?;
        info!("Media state reset ({} entries removed)", summary.removed_entries);

        summary.removed_logs += remove_rotated_logs(&self.state.logs)?;
        summary.removed_logs += remove_rotated_logs(&self.config.paths.system_log_dir)?;
        if summary.removed_logs > 0 {
            info!("Removed {} rotated log file(s)", summary.removed_logs);
        }

        if self.state.setup_marker.exists() {
            fs::remove_file(&self.state.setup_marker)?;
        }

        if let Some(owner) = &self.owner {
            if let Err(e) = privilege::chown_recursive(&self.state.root, owner) {
                warn!("Could not hand {} to {}: {:#}", self.state.root.display(), owner, e);
            }
        }

        if mode == CleanupMode::Cleanup {
            if let Some(primary) = primary {
                if self.config.paths.unit_dir.join(&primary.unit).exists() {
                    info!("Restarting {}...", primary.unit);
                    self.systemctl.restart(&primary.unit)?;
                    summary.restarted = true;
                }
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::command::fake::FakeRunner;
    use crate::utils::command::CommandOutput;
    use serde_json::json;
    use std::os::unix::fs::MetadataExt;
    use tempfile::TempDir;

    fn populated() -> (TempDir, Config, StatePaths) {
        let dir = tempfile::tempdir().unwrap();
        let state = StatePaths::under(&dir.path().join("home/pi"));
        let mut config = Config::default();
        config.paths.unit_dir = dir.path().join("units");
        config.paths.system_log_dir = dir.path().join("var/log/loop");

        fs::create_dir_all(state.raw_media.join("upload-1")).unwrap();
        fs::write(state.raw_media.join("upload-1/clip.mp4"), b"x").unwrap();
        fs::write(state.raw_media.join("clip2.mov"), b"x").unwrap();
        fs::create_dir_all(state.processed_media.join("waves")).unwrap();
        fs::write(state.processed_media.join("waves/frame_0001.jpg"), b"x").unwrap();

        let mut index = MediaIndex::default();
        index.media.insert("waves".to_string(), json!({"title": "Waves"}));
        index.loop_order.push("waves".to_string());
        index.active = Some("waves".to_string());
        index.save(&state.index).unwrap();

        fs::create_dir_all(&state.logs).unwrap();
        fs::write(state.logs.join("loop.log"), b"current").unwrap();
        fs::write(state.logs.join("loop.log.1"), b"old").unwrap();
        fs::write(state.logs.join("loop.log.2.gz"), b"older").unwrap();
        fs::create_dir_all(&config.paths.system_log_dir).unwrap();
        fs::write(config.paths.system_log_dir.join("server.log.old"), b"old").unwrap();

        fs::write(&state.setup_marker, b"").unwrap();

        (dir, config, state)
    }

    #[test]
    fn test_rotated_log_names() {
        assert!(is_rotated_log("loop.log.1"));
        assert!(is_rotated_log("loop.log.12.gz"));
        assert!(is_rotated_log("server.gz"));
        assert!(is_rotated_log("server.log.old"));
        assert!(!is_rotated_log("loop.log"));
        assert!(!is_rotated_log("loop.log.bak"));
    }

    #[test]
    fn test_cleanup_leaves_canonical_empty_state() {
        let (_dir, config, state) = populated();
        let runner = FakeRunner::new().on("systemctl is-active", CommandOutput::failed(3, ""));

        let summary = Cleanup::new(&runner, &config, state.clone())
            .run(CleanupMode::Cleanup)
            .unwrap();

        assert_eq!(summary.removed_entries, 3);
        assert_eq!(summary.removed_logs, 3);
        assert!(!summary.service_was_active);

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&state.index).unwrap()).unwrap();
        assert_eq!(
            raw,
            json!({"media": {}, "loop": [], "active": null, "last_updated": null, "processing": {}})
        );
        assert!(state.raw_media.is_dir());
        assert_eq!(fs::read_dir(&state.raw_media).unwrap().count(), 0);
        assert_eq!(fs::read_dir(&state.processed_media).unwrap().count(), 0);
        assert!(state.logs.join("loop.log").exists());
        assert!(!state.setup_marker.exists());
    }

    #[test]
    fn test_cleanup_stops_and_restarts_registered_service() {
        let (_dir, config, state) = populated();
        fs::create_dir_all(&config.paths.unit_dir).unwrap();
        fs::write(config.paths.unit_dir.join("loop.service"), "[Unit]\n").unwrap();
        let runner = FakeRunner::new();

        let summary = Cleanup::new(&runner, &config, state)
            .run(CleanupMode::Cleanup)
            .unwrap();

        assert!(summary.service_was_active);
        assert!(summary.restarted);
        assert_eq!(
            runner.calls(),
            vec![
                "systemctl is-active --quiet loop.service",
                "systemctl stop loop.service",
                "systemctl restart loop.service",
            ]
        );
    }

    #[test]
    fn test_reset_does_not_restart() {
        let (_dir, config, state) = populated();
        fs::create_dir_all(&config.paths.unit_dir).unwrap();
        fs::write(config.paths.unit_dir.join("loop.service"), "[Unit]\n").unwrap();
        let runner = FakeRunner::new();

        let summary = Cleanup::new(&runner, &config, state)
            .run(CleanupMode::Reset)
            .unwrap();
        assert!(!summary.restarted);
        assert!(runner.calls_to("systemctl restart").is_empty());
    }

    #[test]
    fn test_recreated_state_is_handed_to_owner() {
        if !privilege::is_root() {
            return;
        }
        let Some(nobody) = nix::unistd::User::from_name("nobody").unwrap() else {
            return;
        };
        let (_dir, config, state) = populated();
        let runner = FakeRunner::new().on("systemctl is-active", CommandOutput::failed(3, ""));

        Cleanup::new(&runner, &config, state.clone())
            .owned_by("nobody")
            .run(CleanupMode::Cleanup)
            .unwrap();

        for path in [&state.root, &state.raw_media, &state.processed_media, &state.index] {
            let meta = fs::metadata(path).unwrap();
            assert_eq!(meta.uid(), nobody.uid.as_raw(), "{}", path.display());
            assert_eq!(meta.gid(), nobody.gid.as_raw(), "{}", path.display());
        }
    }

    #[test]
    fn test_unknown_owner_is_not_fatal() {
        let (_dir, config, state) = populated();
        let runner = FakeRunner::new().on("systemctl is-active", CommandOutput::failed(3, ""));

        let summary = Cleanup::new(&runner, &config, state.clone())
            .owned_by("no-such-loop-user")
            .run(CleanupMode::Cleanup)
            .unwrap();
        assert_eq!(summary.removed_entries, 3);
        assert!(state.index.exists());
    }

    #[test]
    fn test_cleanup_on_fresh_host() {
        let dir = tempfile::tempdir().unwrap();
        let state = StatePaths::under(dir.path());
        let mut config = Config::default();
        config.paths.unit_dir = dir.path().join("units");
        config.paths.system_log_dir = dir.path().join("logs");
        let runner = FakeRunner::new().on("systemctl is-active", CommandOutput::failed(3, ""));

        let summary = Cleanup::new(&runner, &config, state.clone())
            .run(CleanupMode::Cleanup)
            .unwrap();
        assert!(!summary.restarted);
        assert_eq!(MediaIndex::load(&state.index).unwrap(), MediaIndex::default());
    }
}
