//! Kernel boot config edits for the SPI display
//!
//! The boot config is shared with the OS and other tools, so it is only ever
//! appended to.

use anyhow::{Context, Result};
use log::info;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::provision::templates::BOOT_MARKER;

/// First boot config candidate that exists
pub fn locate(candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates.iter().find(|p| p.is_file()).cloned()
}

/// Directives not yet present as a line of `content`
pub fn missing_directives<'a>(content: &str, directives: &'a [String]) -> Vec<&'a str> {
    directives
        .iter()
        .map(|d| d.trim())
        .filter(|d| !d.is_empty() && !content.lines().any(|l| l.trim() == *d))
        .collect()
}

/// Append any missing directives. Returns what was added.
pub fn ensure_directives(path: &Path, directives: &[String]) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let missing = missing_directives(&content, directives);
    if missing.is_empty() {
        info!("Boot config {} already configured", path.display());
        return Ok(Vec::new());
    }

    let mut file = OpenOptions::new()
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {} for append", path.display()))?;

    let mut block = String::new();
    if !content.is_empty() && !content.ends_with('\n') {
        block.push('\n');
    }
    if !content.lines().any(|l| l.trim() == BOOT_MARKER) {
        block.push('\n');
        block.push_str(BOOT_MARKER);
        block.push('\n');
    }
    for directive in &missing {
        block.push_str(directive);
        block.push('\n');
    }
    file.write_all(block.as_bytes())?;

    info!("Added to {}: {}", path.display(), missing.join(", "));
    Ok(missing.into_iter().map(String::from).collect())
}
