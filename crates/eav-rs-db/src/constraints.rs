//! Table constraints for model-level integrity rules.
//!
//! [`CheckConstraint`] and [`UniqueConstraint`] are declared in a model's
//! [`ModelMeta::constraints`](crate::model::ModelMeta::constraints) and are
//! emitted inside `CREATE TABLE`.
//!
//! # Examples
//!
//! ```
//! use eav_rs_db::constraints::{CheckConstraint, Constraint, UniqueConstraint};
//! use eav_rs_db::query::lookups::{Lookup, Q};
//! use eav_rs_db::value::Value;
//!
//! let check = CheckConstraint::new("age_non_negative", Q::filter("age", Lookup::Gte(Value::from(0))));
//! assert_eq!(check.to_sql(), "CONSTRAINT \"age_non_negative\" CHECK (\"age\" >= 0)");
//!
//! let unique = UniqueConstraint::new("unique_email", &["email"]);
//! assert_eq!(unique.to_sql(), "CONSTRAINT \"unique_email\" UNIQUE (\"email\")");
//! ```

use crate::query::lookups::{Lookup, Q};

/// Trait for all constraint types.
pub trait Constraint: std::fmt::Debug + Send + Sync {
    /// Returns the constraint name.
    fn name(&self) -> &str;

    /// Generates the table-constraint clause used in `CREATE TABLE`.
    fn to_sql(&self) -> String;
}

/// A boxed constraint stored in model metadata.
pub type BoxedConstraint = Box<dyn Constraint>;

/// A CHECK constraint. Filter paths name columns directly and values are
/// inlined as literals.
#[derive(Debug, Clone)]
pub struct CheckConstraint {
    name: String,
    condition: Q,
}

impl CheckConstraint {
    /// Creates a new check constraint.
    pub fn new(name: impl Into<String>, condition: Q) -> Self {
        Self {
            name: name.into(),
            condition,
        }
    }

    /// Returns the condition Q object.
    pub const fn condition(&self) -> &Q {
        &self.condition
    }
}

impl Constraint for CheckConstraint {
    fn name(&self) -> &str {
        &self.name
    }

    fn to_sql(&self) -> String {
        format!(
            "CONSTRAINT \"{}\" CHECK ({})",
            self.name,
            inline_condition(&self.condition)
        )
    }
}

fn inline_condition(q: &Q) -> String {
    match q {
        Q::Filter { field, lookup } => {
            let col = format!("\"{field}\"");
            match lookup {
                Lookup::Exact(v) if v.is_null() => format!("{col} IS NULL"),
                Lookup::Exact(v) => format!("{col} = {}", v.to_sql_literal()),
                Lookup::IsNull(true) => format!("{col} IS NULL"),
                Lookup::IsNull(false) => format!("{col} IS NOT NULL"),
                Lookup::Gt(v) => format!("{col} > {}", v.to_sql_literal()),
                Lookup::Gte(v) => format!("{col} >= {}", v.to_sql_literal()),
                Lookup::Lt(v) => format!("{col} < {}", v.to_sql_literal()),
                Lookup::Lte(v) => format!("{col} <= {}", v.to_sql_literal()),
                Lookup::In(vals) => {
                    let list: Vec<String> = vals.iter().map(|v| v.to_sql_literal()).collect();
                    format!("{col} IN ({})", list.join(", "))
                }
                Lookup::Range(low, high) => format!(
                    "{col} BETWEEN {} AND {}",
                    low.to_sql_literal(),
                    high.to_sql_literal()
                ),
                other => format!("1 = 1 /* unsupported {} */", other.name()),
            }
        }
        Q::And(children) if children.is_empty() => "1 = 1".to_string(),
        Q::Or(children) if children.is_empty() => "1 = 0".to_string(),
        Q::And(children) => join(children, " AND "),
        Q::Or(children) => join(children, " OR "),
        Q::Not(inner) => format!("NOT ({})", inline_condition(inner)),
    }
}

fn join(children: &[Q], sep: &str) -> String {
    let parts: Vec<String> = children.iter().map(inline_condition).collect();
    format!("({})", parts.join(sep))
}

/// A UNIQUE constraint across one or more columns.
#[derive(Debug, Clone)]
pub struct UniqueConstraint {
    name: String,
    columns: Vec<String>,
}

impl UniqueConstraint {
    /// Creates a new unique constraint.
    pub fn new(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
        }
    }

    /// Returns the constrained columns.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

impl Constraint for UniqueConstraint {
    fn name(&self) -> &str {
        &self.name
    }

    fn to_sql(&self) -> String {
        let cols: Vec<String> = self.columns.iter().map(|c| format!("\"{c}\"")).collect();
        format!("CONSTRAINT \"{}\" UNIQUE ({})", self.name, cols.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_exclusive_or_check() {
        let check = CheckConstraint::new(
            "one_key",
            (Q::filter("a", Lookup::IsNull(true)) & Q::filter("b", Lookup::IsNull(false)))
                | (Q::filter("a", Lookup::IsNull(false)) & Q::filter("b", Lookup::IsNull(true))),
        );
        assert_eq!(
            check.to_sql(),
            "CONSTRAINT \"one_key\" CHECK (((\"a\" IS NULL AND \"b\" IS NOT NULL) OR (\"a\" IS NOT NULL AND \"b\" IS NULL)))"
        );
    }

    #[test]
    fn test_check_in_and_not() {
        let check = CheckConstraint::new(
            "kind",
            !Q::filter("kind", Lookup::In(vec![Value::from("a"), Value::from("b")])),
        );
        assert_eq!(check.to_sql(), "CONSTRAINT \"kind\" CHECK (NOT (\"kind\" IN ('a', 'b')))");
    }

    #[test]
    fn test_unique_multi_column() {
        let unique = UniqueConstraint::new("u", &["entity_ct_id", "attribute_id", "entity_id"]);
        assert_eq!(unique.name(), "u");
        assert_eq!(
            unique.to_sql(),
            "CONSTRAINT \"u\" UNIQUE (\"entity_ct_id\", \"attribute_id\", \"entity_id\")"
        );
    }
}
