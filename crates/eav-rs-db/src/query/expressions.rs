//! Query expressions used for annotations.
//!
//! # Examples
//!
//! ```
//! use eav_rs_db::query::expressions::{Expression, When};
//! use eav_rs_db::query::lookups::Q;
//!
//! // CASE WHEN id = 3 THEN 1 WHEN id = 1 THEN 2 END
//! let rank = Expression::case(
//!     vec![
//!         When::new(Q::exact("pk", 3), Expression::value(1)),
//!         When::new(Q::exact("pk", 1), Expression::value(2)),
//!     ],
//!     None,
//! );
//! assert!(matches!(rank, Expression::Case { .. }));
//! ```

use crate::query::lookups::Q;
use crate::value::Value;

/// A query expression that produces a value in the context of a SQL query.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A field reference, resolved like a filter path.
    Col(String),
    /// A literal value.
    Value(Value),
    /// A CASE ... WHEN ... THEN ... ELSE ... END expression.
    Case {
        /// The WHEN/THEN branches.
        whens: Vec<When>,
        /// The ELSE value.
        default: Option<Box<Expression>>,
    },
}

/// A WHEN clause in a CASE expression.
#[derive(Debug, Clone, PartialEq)]
pub struct When {
    /// The condition for this branch.
    pub condition: Q,
    /// The value to return when the condition is met.
    pub then: Expression,
}

impl When {
    /// Creates a new branch.
    pub const fn new(condition: Q, then: Expression) -> Self {
        Self { condition, then }
    }
}

impl Expression {
    /// Creates a field reference expression.
    pub fn col(name: impl Into<String>) -> Self {
        Self::Col(name.into())
    }

    /// Creates a literal value expression.
    pub fn value(v: impl Into<Value>) -> Self {
        Self::Value(v.into())
    }

    /// Creates a CASE expression.
    pub fn case(whens: Vec<When>, default: Option<Expression>) -> Self {
        Self::Case {
            whens,
            default: default.map(Box::new),
        }
    }
}
