//! Atomic blocks built on SQLite savepoints.
//!
//! Every [`atomic`] call opens a uniquely named savepoint, so blocks nest
//! freely: an inner failure rolls back only the inner block, and an outer
//! failure rolls back everything done inside it.
//!
//! # Examples
//!
//! ```
//! use eav_rs_db::connection::Database;
//! use eav_rs_db::transactions::atomic;
//! use eav_rs_db::value::Value;
//!
//! let db = Database::memory().unwrap();
//! db.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();
//! let result: Result<(), _> = atomic(&db, |db| {
//!     db.execute("INSERT INTO t (x) VALUES (?)", &[Value::Int(1)])?;
//!     Err(eav_rs_core::EavError::NotSupported("roll back".into()))
//! });
//! assert!(result.is_err());
//! assert!(db.query("SELECT x FROM t", &[]).unwrap().is_empty());
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use eav_rs_core::EavResult;

use crate::connection::Database;

/// Counter for generating unique savepoint names.
static SAVEPOINT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A named savepoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Savepoint {
    /// The unique name of this savepoint.
    pub name: String,
}

impl Savepoint {
    /// Creates a new savepoint with an auto-generated unique name.
    pub fn new() -> Self {
        let id = SAVEPOINT_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self {
            name: format!("eav_sp_{id}"),
        }
    }

    fn begin_sql(&self) -> String {
        format!("SAVEPOINT \"{}\"", self.name)
    }

    fn release_sql(&self) -> String {
        format!("RELEASE SAVEPOINT \"{}\"", self.name)
    }

    fn rollback_sql(&self) -> String {
        format!(
            "ROLLBACK TO SAVEPOINT \"{0}\"; RELEASE SAVEPOINT \"{0}\"",
            self.name
        )
    }
}

impl Default for Savepoint {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs `f` inside a savepoint, committing on `Ok` and rolling back on `Err`.
///
/// # Errors
///
/// Returns the closure's error (after rolling back), or a storage error if
/// the savepoint itself cannot be created or released.
pub fn atomic<T>(db: &Database, f: impl FnOnce(&Database) -> EavResult<T>) -> EavResult<T> {
    let savepoint = Savepoint::new();
    db.execute_batch(&savepoint.begin_sql())?;
    db.enter_atomic();
    let result = f(db);
    db.exit_atomic();
    match result {
        Ok(value) => {
            db.execute_batch(&savepoint.release_sql())?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = db.execute_batch(&savepoint.rollback_sql()) {
                tracing::warn!(
                    savepoint = %savepoint.name,
                    error = %rollback_err,
                    "savepoint rollback failed"
                );
            }
            Err(err)
        }
    }
}
