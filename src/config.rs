//! Run configuration.
//!
//! Loads `permute.toml` from the directory holding the layer document. Stock
//! defaults are serialized to a TOML table, the user's file is merged on top
//! key by key, and the merged table is deserialized and validated.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [export]
//! output_dir = "permutations"                 # Relative to the document
//! filename_template = "{0.name}/{1.name}.png" # Positional placeholders per pick
//! expand_subgroups = false                    # Expand (prm) groups at the top level
//!
//! [export.params]
//! jpeg_quality = 90                           # Used for .jpg/.jpeg outputs (1-100)
//! ```
//!
//! Command-line flags override whatever the file says. Unknown keys are
//! rejected to catch typos early.

use crate::host::ExportParams;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name looked up next to the layer document.
pub const CONFIG_FILE: &str = "permute.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PermuteConfig {
    pub export: ExportConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportConfig {
    /// Output directory. Relative paths are resolved against the document.
    pub output_dir: PathBuf,
    pub filename_template: String,
    pub expand_subgroups: bool,
    pub params: ExportParams,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("permutations"),
            filename_template: "{0.name}/{1.name}.png".to_string(),
            expand_subgroups: false,
            params: ExportParams::default(),
        }
    }
}

impl PermuteConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.export.filename_template.trim().is_empty() {
            return Err(ConfigError::Validation(
                "export.filename_template must not be empty".into(),
            ));
        }
        if !(1..=100).contains(&self.export.params.jpeg_quality) {
            return Err(ConfigError::Validation(
                "export.params.jpeg_quality must be 1-100".into(),
            ));
        }
        Ok(())
    }

    /// Output directory, resolved against `base` when relative.
    pub fn output_dir(&self, base: &Path) -> PathBuf {
        if self.export.output_dir.is_absolute() {
            self.export.output_dir.clone()
        } else {
            base.join(&self.export.output_dir)
        }
    }
}

/// Stock defaults as a `toml::Value::Table`, the base layer for merging.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(PermuteConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// Tables merge key by key; any other overlay value replaces the base value.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read `permute.toml` from `dir` as a raw TOML value, `None` when absent.
pub fn load_raw_config(dir: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = dir.join(CONFIG_FILE);
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Load config from `permute.toml` in `dir`, falling back to stock defaults.
pub fn load_config(dir: &Path) -> Result<PermuteConfig, ConfigError> {
    let merged = match load_raw_config(dir)? {
        Some(overlay) => merge_toml(stock_defaults_value()?, overlay),
        None => stock_defaults_value()?,
    };
    let config: PermuteConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Fully-commented stock `permute.toml`, printed by `gen-config`.
pub fn stock_config_toml() -> &'static str {
    r##"# permute-layers configuration
# ============================
# Place this file next to the layer document as permute.toml.
# All settings are optional; values shown are the defaults.
# Command-line flags take precedence over this file.

[export]
# Where exported combinations are written, relative to the document.
output_dir = "permutations"

# File name for each exported combination. Placeholders refer to the picks
# of one combination, bottom-most top-level slot first:
#   {0}          name of the first pick
#   {1.name}     same, spelled out
#   {0.opacity}  any of: name, visible, linked, opacity, mode, width, height
# Subdirectories in the template are created as needed. The extension picks
# the encoder (png, jpg, tif, webp).
filename_template = "{0.name}/{1.name}.png"

# Expand combinatorial "(prm)" groups into all of their alternatives instead
# of treating every top-level group's children as the alternatives.
expand_subgroups = false

[export.params]
# Quality for JPEG outputs (1-100). Chosen once per run.
jpeg_quality = 90
"##
}
