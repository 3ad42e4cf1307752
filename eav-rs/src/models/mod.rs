//! The persisted EAV schema.
//!
//! - [`Attribute`] - one virtual column, addressed by slug
//! - [`EnumValue`] / [`EnumGroup`] - labelled choices and named sets of them
//! - [`Value`] - one datum of one attribute for one entity
//!
//! All tables live under the `eav` app label; [`install`] creates them.

pub mod attribute;
pub mod enum_group;
pub mod enum_value;
pub mod value;

pub use attribute::Attribute;
pub use enum_group::{EnumGroup, EnumGroupValue};
pub use enum_value::EnumValue;
pub use value::{EntityKey, Value, ValueColumns};

use chrono::{NaiveDateTime, SubsecRound};
use eav_rs_core::EavResult;
use eav_rs_db::Database;

/// The app label of every EAV table.
pub const APP_LABEL: &str = "eav";

/// Creates the EAV tables. Safe to call more than once.
///
/// # Errors
///
/// Propagates table creation errors.
pub fn install(db: &Database) -> EavResult<()> {
    db.create_table::<EnumValue>()?;
    db.create_table::<EnumGroup>()?;
    db.create_table::<EnumGroupValue>()?;
    db.create_table::<Attribute>()?;
    db.create_table::<Value>()?;
    tracing::debug!("eav tables installed");
    Ok(())
}

/// Returns `true` once [`install`] has run on `db`.
pub fn is_installed(db: &Database) -> bool {
    use eav_rs_db::Model;

    db.apps().is_registered(Value::key()) && db.apps().is_registered(Attribute::key())
}

/// The current UTC time at the microsecond precision the tables store.
pub(crate) fn now() -> NaiveDateTime {
    chrono::Utc::now().naive_utc().trunc_subsecs(6)
}
