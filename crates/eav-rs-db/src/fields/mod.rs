//! Field definitions for models.
//!
//! See [`FieldDef`] and [`FieldType`].

pub mod types;

pub use types::{FieldDef, FieldType, OnDelete};
