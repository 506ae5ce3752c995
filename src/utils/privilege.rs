use anyhow::{Context, Result};
use nix::unistd::{chown, Gid, Uid, User};
use std::fs;
use std::path::{Path, PathBuf};

pub fn is_root() -> bool {
    Uid::effective().is_root()
}

/// Home directory of `user` from the passwd database.
pub fn home_of(user: &str) -> Option<PathBuf> {
    User::from_name(user).ok().flatten().map(|u| u.dir)
}

/// Pick the account the appliance runs as.
///
/// `USER` is honoured, except that under `sudo` it reads `root`, in which
/// case `SUDO_USER` names the operator who invoked us. Returns the name and
/// whether it came from `SUDO_USER`.
pub fn runtime_user(user: Option<&str>, sudo_user: Option<&str>) -> (String, bool) {
    let user = user.filter(|u| !u.is_empty());
    let sudo_user = sudo_user.filter(|u| !u.is_empty() && *u != "root");

    match (user, sudo_user) {
        (Some("root"), Some(sudo)) => (sudo.to_string(), true),
        (Some(user), _) => (user.to_string(), false),
        (None, Some(sudo)) => (sudo.to_string(), true),
        (None, None) => ("pi".to_string(), false),
    }
}

/// Hand `path` and everything below it to `user`. Symlinks are skipped.
pub fn chown_recursive(path: &Path, user: &str) -> Result<()> {
    let user = User::from_name(user)
        .with_context(|| format!("Failed to look up user {}", user))?
        .with_context(|| format!("No such user: {}", user))?;
    chown_tree(path, user.uid, user.gid)
}

fn chown_tree(path: &Path, uid: Uid, gid: Gid) -> Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.file_type().is_symlink() {
        return Ok(());
    }
    chown(path, Some(uid), Some(gid))
        .with_context(|| format!("Failed to chown {}", path.display()))?;
    if meta.is_dir() {
        for entry in fs::read_dir(path)? {
            chown_tree(&entry?.path(), uid, gid)?;
        }
    }
    Ok(())
}
