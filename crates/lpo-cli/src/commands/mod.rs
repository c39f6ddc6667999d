//! Command handler modules for lpo-cli.
//!
//! Shared utilities used by multiple command paths live here.
//! Command-specific logic lives in the submodules.

pub mod predict;
pub mod run;

use anyhow::{Context, Result};
use lpo_config::{LoadedConfig, OracleConfig};

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Load, merge and type-check the layered config.
pub fn load_config(config_paths: &[String]) -> Result<(LoadedConfig, OracleConfig)> {
    let path_refs: Vec<&str> = config_paths.iter().map(|s| s.as_str()).collect();
    let loaded = lpo_config::load_layered_yaml(&path_refs)?;
    let cfg = loaded
        .oracle_config()
        .with_context(|| format!("config layers: {}", config_paths.join(", ")))?;
    Ok((loaded, cfg))
}
