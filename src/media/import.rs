//! First-install import of bundled media

use anyhow::{Context, Result};
use chrono::Utc;
use log::{info, warn};
use serde_json::Value;
use std::fs;
use std::path::Path;

use super::index::MediaIndex;
use crate::config::structs::StatePaths;

fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)
                .with_context(|| format!("Failed to copy {}", entry.path().display()))?;
        }
    }
    Ok(())
}

fn read_metadata(dir: &Path) -> Option<Value> {
    let path = dir.join("metadata.json");
    let content = fs::read_to_string(&path).ok()?;
    match serde_json::from_str::<Value>(&content) {
        Ok(value) if value.is_object() => Some(value),
        Ok(_) => {
            warn!("{} is not a JSON object, skipping", path.display());
            None
        }
        Err(e) => {
            warn!("Skipping {}: {}", path.display(), e);
            None
        }
    }
}

/// Seed an empty index from `<source>/<slug>/metadata.json`.
///
/// Existing media is never replaced, and an index the appliance left in a
/// state we cannot read or extend is left alone. Returns the number of items
/// imported.
pub fn import_default_media(source: &Path, state: &StatePaths) -> Result<usize> {
    if !source.is_dir() {
        info!("No default media at {}", source.display());
        return Ok(0);
    }

    let mut index = match MediaIndex::load(&state.index) {
        Ok(index) => index,
        Err(e) => {
            warn!("{:#}; skipping default media", e);
            return Ok(0);
        }
    };
    if let Err(e) = index.validate() {
        warn!(
            "Media index {} is inconsistent ({:#}); skipping default media",
            state.index.display(),
            e
        );
        return Ok(0);
    }
    if !index.is_empty() {
        info!("Media index already has {} item(s), skipping default media", index.media.len());
        return Ok(0);
    }

    let mut slugs: Vec<_> = fs::read_dir(source)?
        .flatten()
        .filter(|e| e.path().is_dir())
        .collect();
    slugs.sort_by_key(|e| e.file_name());

    for entry in slugs {
        let slug = entry.file_name().to_string_lossy().to_string();
        let Some(metadata) = read_metadata(&entry.path()) else {
            continue;
        };

        copy_dir(&entry.path(), &state.processed_media.join(&slug))?;
        index.media.insert(slug.clone(), metadata);
        index.loop_order.push(slug);
    }

    if index.is_empty() {
        return Ok(0);
    }

    index.active = index.loop_order.first().cloned();
    index.last_updated = Some(Value::String(Utc::now().to_rfc3339()));
    index.save(&state.index)?;

    info!("Imported {} default media item(s)", index.media.len());
    Ok(index.media.len())
}
