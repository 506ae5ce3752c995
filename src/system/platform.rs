use log::debug;
use std::fs;
use std::path::Path;

/// Raspberry Pi model string from the device tree, if this is a Pi
pub fn detect_pi(model_path: &Path) -> Option<String> {
    let raw = fs::read(model_path).ok()?;
    // device-tree strings are NUL terminated
    let model = String::from_utf8_lossy(&raw)
        .trim_end_matches('\0')
        .trim()
        .to_string();
    debug!("Device tree model: {:?}", model);

    model.contains("Raspberry Pi").then_some(model)
}
