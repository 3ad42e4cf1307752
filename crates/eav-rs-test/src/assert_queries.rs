//! Query counting assertions for database tests.
//!
//! [`assert_num_queries`] counts the SQL statements executed during a closure
//! and asserts that the count matches an expected value. Useful for pinning
//! how many statements an attribute save or a rewritten filter costs.
//!
//! ## Example
//!
//! ```
//! use eav_rs_db::value::Value;
//! use eav_rs_test::assert_queries::assert_num_queries;
//! use eav_rs_test::test_database::TestDatabase;
//!
//! let db = TestDatabase::new();
//! db.execute_raw("CREATE TABLE t (id INTEGER PRIMARY KEY, val TEXT)")
//!     .unwrap();
//!
//! assert_num_queries(&db, 1, || {
//!     db.execute("INSERT INTO t (val) VALUES (?)", &[Value::from("x")])
//!         .unwrap();
//! });
//! ```

use crate::test_database::TestDatabase;

/// Asserts that exactly `expected_count` SQL statements are executed during
/// the closure.
///
/// # Panics
///
/// Panics if the number of statements does not match `expected_count`.
pub fn assert_num_queries<F>(db: &TestDatabase, expected_count: usize, f: F)
where
    F: FnOnce(),
{
    db.reset_query_count();
    f();
    let actual = db.query_count();
    assert_eq!(
        actual, expected_count,
        "Expected {expected_count} SQL queries, but {actual} were executed"
    );
}

/// Asserts that at most `max_count` SQL statements are executed during the
/// closure.
///
/// # Panics
///
/// Panics if more than `max_count` statements are executed.
pub fn assert_max_queries<F>(db: &TestDatabase, max_count: usize, f: F)
where
    F: FnOnce(),
{
    db.reset_query_count();
    f();
    let actual = db.query_count();
    assert!(
        actual <= max_count,
        "Expected at most {max_count} SQL queries, but {actual} were executed"
    );
}
