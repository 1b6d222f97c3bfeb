use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use memdiff_core::config::{load_config, AnalysisConfig};
use serde::Serialize;

/// Config from `path`, or the defaults when no file is given.
pub fn load_config_or_default(path: Option<&Path>) -> Result<AnalysisConfig> {
    match path {
        Some(path) => load_config(path),
        None => Ok(AnalysisConfig::default()),
    }
}

/// Write `value` as pretty JSON, creating parent directories as needed.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
