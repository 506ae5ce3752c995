//! The appliance's media index (`index.json`)

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::provision::state::write_atomic;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaIndex {
    /// slug -> metadata written by the appliance
    #[serde(default)]
    pub media: BTreeMap<String, Value>,
    /// Display order
    #[serde(default, rename = "loop")]
    pub loop_order: Vec<String>,
    #[serde(default)]
    pub active: Option<String>,
    /// Kept opaque: the appliance may write it in its own format
    #[serde(default)]
    pub last_updated: Option<Value>,
    #[serde(default)]
    pub processing: BTreeMap<String, Value>,
}

impl MediaIndex {
    /// Missing file reads as the empty index
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Malformed media index {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(path, json.as_bytes(), 0o644)
    }

    pub fn validate(&self) -> Result<()> {
        for slug in &self.loop_order {
            if !self.media.contains_key(slug) {
                bail!("Loop entry {} has no media record", slug);
            }
        }
        if let Some(active) = &self.active {
            if !self.media.contains_key(active) || !self.loop_order.contains(active) {
                bail!("Active media {} is not in the loop", active);
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.media.is_empty()
    }
}
