//! Settings loading from configuration files.
//!
//! ## Loading Order
//!
//! 1. Start with default settings.
//! 2. Load from a TOML or JSON file (overriding defaults).
//! 3. Apply environment variable overrides (highest priority).
//!
//! ## Environment Variable Mapping
//!
//! | Env Var | Setting |
//! |---|---|
//! | `EAV_DATABASE` | `database` |
//! | `EAV_DEBUG` | `debug` |
//! | `EAV_LOG_LEVEL` | `log_level` |
//! | `EAV_CHARFIELD_LENGTH` | `charfield_length` |
//! | `EAV_SLUG_MAX_LENGTH` | `slug_max_length` |
//! | `EAV_CSV_SEPARATOR` | `csv_separator` |
//!
//! ## Examples
//!
//! ```rust,no_run
//! use eav_rs_core::settings_loader;
//!
//! let settings = settings_loader::from_toml_file_with_env("config/eav.toml").unwrap();
//! ```

use std::path::Path;

use crate::error::EavError;
use crate::settings::EavSettings;

/// Loads settings from a TOML string.
///
/// Keys absent from the TOML keep their default values.
pub fn from_toml_str(toml_str: &str) -> Result<EavSettings, EavError> {
    let toml_value: toml::Value = toml::from_str(toml_str)
        .map_err(|e| EavError::ConfigurationError(format!("Failed to parse TOML: {e}")))?;

    merge_over_defaults(toml_to_json(toml_value), "TOML")
}

/// Loads settings from a TOML file.
pub fn from_toml_file(path: impl AsRef<Path>) -> Result<EavSettings, EavError> {
    let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
        EavError::ConfigurationError(format!(
            "Failed to read TOML file '{}': {e}",
            path.as_ref().display()
        ))
    })?;
    from_toml_str(&content)
}

/// Loads settings from a TOML file and then applies environment variable overrides.
pub fn from_toml_file_with_env(path: impl AsRef<Path>) -> Result<EavSettings, EavError> {
    let mut settings = from_toml_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Loads settings from a JSON string.
pub fn from_json_str(json_str: &str) -> Result<EavSettings, EavError> {
    let json_value: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| EavError::ConfigurationError(format!("Failed to parse JSON: {e}")))?;

    merge_over_defaults(json_value, "JSON")
}

/// Loads settings from just environment variables (starting from defaults).
pub fn from_env() -> EavSettings {
    let mut settings = EavSettings::default();
    apply_env_overrides(&mut settings);
    settings
}

/// Applies `EAV_*` environment variable overrides to a settings struct.
///
/// Unparseable numeric values are ignored.
pub fn apply_env_overrides(settings: &mut EavSettings) {
    apply_overrides(settings, |key| std::env::var(key).ok());
}

fn apply_overrides(settings: &mut EavSettings, var: impl Fn(&str) -> Option<String>) {
    if let Some(val) = var("EAV_DATABASE") {
        settings.database = val;
    }

    if let Some(val) = var("EAV_DEBUG") {
        settings.debug = matches!(val.to_lowercase().as_str(), "true" | "1" | "yes");
    }

    if let Some(val) = var("EAV_LOG_LEVEL") {
        settings.log_level = val;
    }

    if let Some(val) = var("EAV_CHARFIELD_LENGTH") {
        if let Ok(len) = val.parse::<usize>() {
            settings.charfield_length = len;
        }
    }

    if let Some(val) = var("EAV_SLUG_MAX_LENGTH") {
        if let Ok(len) = val.parse::<usize>() {
            settings.slug_max_length = len;
        }
    }

    if let Some(val) = var("EAV_CSV_SEPARATOR") {
        if !val.is_empty() {
            settings.csv_separator = val;
        }
    }
}

// ============================================================
// Helpers
// ============================================================

fn merge_over_defaults(value: serde_json::Value, format: &str) -> Result<EavSettings, EavError> {
    let default_json = serde_json::to_value(EavSettings::default()).map_err(|e| {
        EavError::ConfigurationError(format!("Failed to serialize default settings: {e}"))
    })?;

    let merged = merge_json(default_json, value);
    serde_json::from_value(merged).map_err(|e| {
        EavError::ConfigurationError(format!("Failed to deserialize settings from {format}: {e}"))
    })
}

/// Converts a TOML value to a `serde_json::Value`.
fn toml_to_json(value: toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::json!(i),
        toml::Value::Float(f) => serde_json::json!(f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
        toml::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => {
            let map: serde_json::Map<String, serde_json::Value> = table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect();
            serde_json::Value::Object(map)
        }
    }
}

/// Deep-merges two JSON values. The `override_val` takes precedence.
fn merge_json(base: serde_json::Value, override_val: serde_json::Value) -> serde_json::Value {
    match (base, override_val) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(override_map)) => {
            for (key, override_v) in override_map {
                let merged = if let Some(base_v) = base_map.remove(&key) {
                    merge_json(base_v, override_v)
                } else {
                    override_v
                };
                base_map.insert(key, merged);
            }
            serde_json::Value::Object(base_map)
        }
        (_, override_val) => override_val,
    }
}
