//! # eav-rs
//!
//! Entity-Attribute-Value storage for [`eav_rs_db`] models.
//!
//! Register a model and its instances gain attributes defined at runtime,
//! stored as typed rows of a shared value table and queried as if they
//! were columns:
//!
//! ```no_run
//! use eav_rs::{AttrValue, Config, Datatype, EntityAccess, Registry};
//! use eav_rs::models::Attribute;
//! use eav_rs_db::{kwargs, Database, ModelManager};
//! # use eav_rs_db::Model;
//! # fn demo<Patient: Model>(db: &Database) -> eav_rs_core::EavResult<()> {
//! eav_rs::install(db)?;
//! let registry = Registry::new();
//! registry.register::<Patient>(db, Config::default().into_arc())?;
//! Attribute::new("Age", Datatype::Int).create(db)?;
//!
//! let patients = db.manager::<Patient>()?;
//! let anne = patients.create(db, &kwargs! { "eav__age" => 3 })?;
//! assert_eq!(anne.eav()?.get(db, "age")?, AttrValue::Int(3));
//! assert_eq!(patients.filter_kwargs(kwargs! { "eav__age__lt" => 15 }).count_exec(db)?, 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`models`] - the persisted schema: attributes, enum choices, values
//! - [`entity`] - the per-instance proxy
//! - [`registry`] - binding models to EAV, and [`config`] for its policy
//! - [`manager`], [`queryset`] and [`ordering`] - querying by attribute
//! - [`datatype`], [`attr_value`], [`validators`] and [`slug`] - values and their rules

pub mod attr_value;
pub mod config;
pub mod datatype;
pub mod entity;
pub mod manager;
pub mod models;
pub mod ordering;
pub mod queryset;
pub mod registry;
pub mod slug;
pub mod validators;

#[cfg(test)]
pub(crate) mod testing;

pub use attr_value::{AttrValue, ObjectRef};
pub use config::{Config, EavConfig, EavModel, EntityContext};
pub use datatype::Datatype;
pub use entity::{Entity, EntityAccess};
pub use manager::EntityManager;
pub use models::install;
pub use queryset::EavQueryExpander;
pub use registry::Registry;
