//! Settings for eav-rs.
//!
//! [`EavSettings`] holds storage and EAV tuning knobs with sensible defaults.
//! [`SETTINGS`] is an optional process-wide instance; library code that is
//! handed an explicit `EavSettings` never consults it.

use std::sync::OnceLock;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::{EavError, EavResult};

/// Workspace settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EavSettings {
    /// Path of the SQLite database, or `:memory:`.
    pub database: String,
    /// Enables pretty, human-readable logging.
    pub debug: bool,
    /// The tracing filter directive (e.g. `info`, `eav_rs_db::sql=debug`).
    pub log_level: String,
    /// Maximum length of short text columns (attribute names, enum labels).
    pub charfield_length: usize,
    /// Maximum length of generated and user-supplied attribute slugs.
    pub slug_max_length: usize,
    /// Separator used when storing csv attribute values.
    pub csv_separator: String,
    /// Whether `PRAGMA foreign_keys=ON` is issued on connect.
    pub sqlite_foreign_keys: bool,
}

impl Default for EavSettings {
    fn default() -> Self {
        Self {
            database: ":memory:".to_string(),
            debug: true,
            log_level: "info".to_string(),
            charfield_length: 100,
            slug_max_length: 50,
            csv_separator: ";".to_string(),
            sqlite_foreign_keys: true,
        }
    }
}

static DEFAULT_SETTINGS: Lazy<EavSettings> = Lazy::new(EavSettings::default);

/// A lazily configured, process-wide settings slot.
pub struct LazySettings {
    inner: OnceLock<EavSettings>,
}

impl Default for LazySettings {
    fn default() -> Self {
        Self::new()
    }
}

impl LazySettings {
    /// Creates a new, unconfigured `LazySettings`.
    pub const fn new() -> Self {
        Self {
            inner: OnceLock::new(),
        }
    }

    /// Configures the global settings. Only the first call succeeds.
    pub fn configure(&self, settings: EavSettings) -> EavResult<()> {
        self.inner.set(settings).map_err(|_| {
            EavError::ImproperlyConfigured("Settings have already been configured".to_string())
        })
    }

    /// Returns the configured settings, or the defaults when unconfigured.
    pub fn get(&self) -> &EavSettings {
        self.inner.get().unwrap_or(&DEFAULT_SETTINGS)
    }

    /// Returns `true` if settings have been configured.
    pub fn is_configured(&self) -> bool {
        self.inner.get().is_some()
    }
}

/// The global settings instance.
pub static SETTINGS: LazySettings = LazySettings::new();
