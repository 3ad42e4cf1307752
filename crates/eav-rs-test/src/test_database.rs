//! Test database utilities.
//!
//! Provides [`TestDatabase`], a fresh in-memory [`Database`] per test with a
//! resettable statement counter for [`assert_num_queries`](crate::assert_num_queries).
//!
//! ## Example
//!
//! ```
//! use eav_rs_test::test_database::TestDatabase;
//!
//! let db = TestDatabase::new();
//! db.execute_raw("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
//!     .unwrap();
//! assert_eq!(db.query_count(), 1);
//! ```

use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use eav_rs_core::EavResult;
use eav_rs_db::{ContentType, Database, Model};

use crate::models;

/// An in-memory SQLite database for testing.
///
/// Dereferences to [`Database`], so it can be passed wherever a `&Database`
/// is expected. Every `TestDatabase::new()` is isolated from the others.
#[derive(Clone)]
pub struct TestDatabase {
    db: Database,
    baseline: Arc<AtomicUsize>,
}

impl std::fmt::Debug for TestDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestDatabase")
            .field("db", &self.db)
            .field("query_count", &self.query_count())
            .finish()
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl TestDatabase {
    /// Creates a new in-memory database with only the content type table.
    ///
    /// # Panics
    ///
    /// Panics if the in-memory database cannot be created.
    pub fn new() -> Self {
        let db = Database::memory().expect("Failed to create in-memory SQLite database");
        Self {
            db,
            baseline: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Creates a new database with the tables of every fixture model.
    ///
    /// # Panics
    ///
    /// Panics if a fixture table cannot be created.
    pub fn with_fixtures() -> Self {
        let db = Self::new();
        models::create_fixture_tables(&db).expect("Failed to create fixture tables");
        db.reset_query_count();
        db
    }

    /// Returns the wrapped database.
    pub const fn database(&self) -> &Database {
        &self.db
    }

    /// Registers a model and creates its table.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQL execution fails.
    pub fn setup_table<M: Model>(&self) -> EavResult<()> {
        self.db.create_table::<M>()
    }

    /// Drops every table and clears the content type cache.
    ///
    /// # Errors
    ///
    /// Returns an error if a table cannot be dropped.
    pub fn teardown(&self) -> EavResult<()> {
        let rows = self.db.query(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
            &[],
        )?;
        self.db.execute_batch("PRAGMA foreign_keys=OFF")?;
        for row in &rows {
            let table_name: String = row.get("name")?;
            self.db
                .execute_batch(&format!("DROP TABLE IF EXISTS \"{table_name}\""))?;
        }
        self.db.execute_batch("PRAGMA foreign_keys=ON")?;
        ContentType::clear_cache(&self.db);
        Ok(())
    }

    /// Executes a raw SQL string with no parameters. Counts as one query.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQL execution fails.
    pub fn execute_raw(&self, sql: &str) -> EavResult<usize> {
        self.db.execute(sql, &[])
    }

    /// Returns the number of statements executed since the last reset.
    pub fn query_count(&self) -> usize {
        self.db
            .query_count()
            .saturating_sub(self.baseline.load(Ordering::SeqCst))
    }

    /// Resets the statement counter to zero.
    pub fn reset_query_count(&self) {
        self.baseline.store(self.db.query_count(), Ordering::SeqCst);
    }
}

impl Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Database {
        &self.db
    }
}
