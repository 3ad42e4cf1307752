//! Query building, compilation, and execution.
//!
//! - [`lookups`] - Q objects, lookup types, and keyword filter parsing
//! - [`expressions`] - Computed expressions (CASE/WHEN) for annotations
//! - [`compiler`] - Query AST and path-resolving SQL compilation
//! - [`queryset`] - Lazy query sets and the expander hook
//! - [`manager`] - Model managers

pub mod compiler;
pub mod expressions;
pub mod lookups;
pub mod manager;
pub mod queryset;

pub use compiler::{Clause, OrderBy, Query, SqlCompiler, SubQuery};
pub use expressions::{Expression, When};
pub use lookups::{Kwargs, Lookup, Q};
pub use manager::{create_instance, Manager, ModelManager};
pub use queryset::{QueryExpander, QuerySet};
