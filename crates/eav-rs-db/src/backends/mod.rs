//! Database backends.
//!
//! Only SQLite is provided; see [`sqlite::SqliteBackend`].

pub mod sqlite;

pub use sqlite::SqliteBackend;
