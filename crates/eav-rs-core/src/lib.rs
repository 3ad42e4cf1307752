//! # eav-rs-core
//!
//! Error types, settings, and logging shared by every eav-rs crate. This crate
//! has no eav-rs dependencies and sits at the bottom of the workspace.
//!
//! ## Modules
//!
//! - [`error`] - Error types, categories, and result aliases
//! - [`settings`] - Workspace settings with defaults
//! - [`settings_loader`] - TOML/JSON loading and environment overrides
//! - [`logging`] - Tracing-based logging integration

pub mod error;
pub mod logging;
pub mod settings;
pub mod settings_loader;

// Re-export the most commonly used types at the crate root.
pub use error::{EavError, EavResult, ErrorCategory, ValidationError};
pub use settings::{EavSettings, SETTINGS};
