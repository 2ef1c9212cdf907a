//! CLI command implementations

pub mod config;
pub mod extract;
pub mod quota;
pub mod replay;

use anyhow::{Context, Result};
use std::path::PathBuf;

use genguard_runtime::RuntimeConfig;

/// Load the runtime config, or defaults when no path is given.
pub fn load_config(path: Option<PathBuf>) -> Result<RuntimeConfig> {
    match path {
        Some(path) => RuntimeConfig::from_yaml_file(&path)
            .with_context(|| format!("Failed to load config: {}", path.display())),
        None => {
            tracing::debug!("No config file given, using defaults");
            Ok(RuntimeConfig::default())
        }
    }
}
