//! Shared fixtures for unit tests.

use eav_rs_db::Database;

/// An in-memory database with the EAV tables and the fixture models.
pub fn eav_db() -> Database {
    let db = Database::memory().expect("in-memory database");
    crate::models::install(&db).expect("eav tables");
    eav_rs_test::models::create_fixture_tables(&db).expect("fixture tables");
    db
}
