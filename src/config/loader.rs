use super::structs::{Config, Host};
use crate::utils::privilege;
use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_PATH: &str = "/etc/loop/setup.toml";

pub fn load_config(path: &Path) -> Config {
    if path.exists() {
        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    info!("Loaded configuration from {}", path.display());
                    return config;
                }
                Err(e) => {
                    warn!("Failed to parse config file: {}. Using defaults.", e);
                }
            },
            Err(e) => {
                warn!("Failed to read config file: {}. Using defaults.", e);
            }
        }
    } else {
        debug!("No config file found at {}. Using defaults.", path.display());
    }

    Config::default()
}

/// Process environment relevant to host resolution
#[derive(Debug, Default)]
pub struct HostEnv {
    pub user: Option<String>,
    pub sudo_user: Option<String>,
    pub home: Option<PathBuf>,
    pub cwd: Option<PathBuf>,
    /// `--project-dir` / `LOOP_PROJECT_DIR`
    pub project_dir: Option<PathBuf>,
}

impl HostEnv {
    pub fn from_process(project_dir: Option<PathBuf>) -> Self {
        Self {
            user: std::env::var("USER").ok(),
            sudo_user: std::env::var("SUDO_USER").ok(),
            home: std::env::var_os("HOME").map(PathBuf::from),
            cwd: std::env::current_dir().ok(),
            project_dir,
        }
    }
}

/// Resolve who we provision for and where.
///
/// Config file values override the environment; the CLI overrides both for
/// the project directory.
pub fn resolve_host(config: &Config, env: &HostEnv) -> Result<Host> {
    let (user, from_sudo) = match &config.host.user {
        Some(user) => (user.clone(), false),
        None => privilege::runtime_user(env.user.as_deref(), env.sudo_user.as_deref()),
    };

    let home = match &config.host.home {
        Some(home) => home.clone(),
        None if from_sudo => {
            privilege::home_of(&user).unwrap_or_else(|| PathBuf::from("/home").join(&user))
        }
        None => env
            .home
            .clone()
            .or_else(|| privilege::home_of(&user))
            .unwrap_or_else(|| PathBuf::from("/home").join(&user)),
    };

    let project_dir = env
        .project_dir
        .clone()
        .or_else(|| config.host.project_dir.clone())
        .or_else(|| env.cwd.clone())
        .context("Cannot determine the project directory")?;

    let project_dir = if project_dir.is_absolute() {
        project_dir
    } else {
        match &env.cwd {
            Some(cwd) => cwd.join(project_dir),
            None => bail!("Project directory {} is not absolute", project_dir.display()),
        }
    };

    debug!(
        "Host: user={}, home={}, project={}",
        user,
        home.display(),
        project_dir.display()
    );

    Ok(Host {
        user,
        home,
        project_dir,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::structs::ServiceKind;

    #[test]
    fn test_missing_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.toml"));
        assert_eq!(config.services.units.len(), 3);
        assert_eq!(config.wifi.fallback_interface, "wlan0");
        assert!(config.packages.required.contains(&"ffmpeg".to_string()));
    }

    #[test]
    fn test_partial_config_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("setup.toml");
        fs::write(
            &path,
            r#"
[packages]
required = ["git"]

[wifi]
fallback_interface = "wlan9"

[[services.units]]
unit = "frame.service"
template = "units/frame.service"
kind = "primary"
"#,
        )
        .unwrap();

        let config = load_config(&path);
        assert_eq!(config.packages.required, vec!["git".to_string()]);
        assert_eq!(config.wifi.fallback_interface, "wlan9");
        assert_eq!(config.wifi.settle_secs, 3);
        assert_eq!(config.services.settle_secs, 3);
        assert_eq!(config.services.units.len(), 1);
        assert_eq!(config.services.primary().unwrap().kind, ServiceKind::Primary);
        assert_eq!(config.paths.unit_dir, PathBuf::from("/etc/systemd/system"));
    }

    #[test]
    fn test_unparsable_config_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("setup.toml");
        fs::write(&path, "[packages\nrequired = 1").unwrap();
        let config = load_config(&path);
        assert_eq!(config.hotspot.connection_name, "LOOP-Hotspot");
    }

    #[test]
    fn test_resolve_host_from_environment() {
        let env = HostEnv {
            user: Some("alice".to_string()),
            home: Some(PathBuf::from("/home/alice")),
            cwd: Some(PathBuf::from("/srv")),
            project_dir: Some(PathBuf::from("loop")),
            ..Default::default()
        };
        let host = resolve_host(&Config::default(), &env).unwrap();
        assert_eq!(host.user, "alice");
        assert_eq!(host.home, PathBuf::from("/home/alice"));
        assert_eq!(host.project_dir, PathBuf::from("/srv/loop"));
        assert_eq!(host.state().index, PathBuf::from("/home/alice/.loop/media/index.json"));
        assert_eq!(host.backend_config(), PathBuf::from("/srv/loop/backend/config.json"));
    }

    #[test]
    fn test_resolve_host_config_overrides() {
        let mut config = Config::default();
        config.host.user = Some("frame".to_string());
        config.host.home = Some(PathBuf::from("/opt/frame"));
        config.host.project_dir = Some(PathBuf::from("/opt/frame/app"));

        let env = HostEnv {
            user: Some("root".to_string()),
            sudo_user: Some("pi".to_string()),
            cwd: Some(PathBuf::from("/")),
            ..Default::default()
        };
        let host = resolve_host(&config, &env).unwrap();
        assert_eq!(host.user, "frame");
        assert_eq!(host.home, PathBuf::from("/opt/frame"));
        assert_eq!(host.project_dir, PathBuf::from("/opt/frame/app"));
    }

    #[test]
    fn test_resolve_host_defaults_to_pi() {
        let mut config = Config::default();
        config.host.home = Some(PathBuf::from("/home/pi"));
        let env = HostEnv {
            cwd: Some(PathBuf::from("/home/pi/loop")),
            ..Default::default()
        };
        let host = resolve_host(&config, &env).unwrap();
        assert_eq!(host.user, "pi");
        assert_eq!(host.project_dir, PathBuf::from("/home/pi/loop"));
    }
}
