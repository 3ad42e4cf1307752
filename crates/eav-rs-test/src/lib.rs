//! # eav-rs-test
//!
//! Testing utilities for eav-rs. Provides a fresh in-memory
//! [`TestDatabase`] per test, statement-count assertions, and a small set of
//! host models shaped like a typical application (patients, encounters,
//! doctors keyed by UUID) to register attributes onto.

pub mod assert_queries;
pub mod models;
pub mod test_database;

pub use assert_queries::{assert_max_queries, assert_num_queries};
pub use models::{Doctor, Encounter, ExampleModel, Patient, RegisterTestModel};
pub use test_database::TestDatabase;
