//! Query lookups and Q objects for building complex filters.
//!
//! This module provides the [`Lookup`] enum for field-level comparisons and
//! the [`Q`] enum for combining filters with AND, OR, and NOT operators.
//! Keyword-style filters (`"eav__age__gte" => 3`) are parsed into the same
//! shape by [`parse_kwarg`].
//!
//! # Examples
//!
//! ```
//! use eav_rs_db::query::lookups::{Q, Lookup};
//! use eav_rs_db::value::Value;
//!
//! // name = "Alice" AND age > 25
//! let combined = Q::filter("name", Lookup::Exact(Value::from("Alice")))
//!     & Q::filter("age", Lookup::Gt(Value::from(25)));
//!
//! // NOT(active = false)
//! let negated = !Q::filter("active", Lookup::Exact(Value::from(false)));
//! ```

use std::ops;

use eav_rs_core::{EavError, EavResult};

use super::compiler::SubQuery;
use crate::value::Value;

/// Keyword filter arguments: `(path__lookup, value)` pairs in call order.
pub type Kwargs = Vec<(String, Value)>;

/// Builds a [`Kwargs`] list.
///
/// ```
/// use eav_rs_db::kwargs;
///
/// let kw = kwargs! { "name" => "Bob", "eav__age" => 5 };
/// assert_eq!(kw.len(), 2);
/// ```
#[macro_export]
macro_rules! kwargs {
    () => {
        ::std::vec::Vec::<(::std::string::String, $crate::value::Value)>::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {
        ::std::vec![$((::std::string::String::from($key), $crate::value::Value::from($value))),+]
    };
}

/// A field-level lookup operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// Exact match (`field = value`, `field IS NULL` for `Null`).
    Exact(Value),
    /// Case-insensitive exact match.
    IExact(Value),
    /// Substring match.
    Contains(String),
    /// Case-insensitive substring match.
    IContains(String),
    /// Membership test (`field IN (values...)`).
    In(Vec<Value>),
    /// Membership in the single-column result of a subquery.
    InQuery(Box<SubQuery>),
    /// Greater than.
    Gt(Value),
    /// Greater than or equal.
    Gte(Value),
    /// Less than.
    Lt(Value),
    /// Less than or equal.
    Lte(Value),
    /// Prefix match.
    StartsWith(String),
    /// Case-insensitive prefix match.
    IStartsWith(String),
    /// Suffix match.
    EndsWith(String),
    /// Case-insensitive suffix match.
    IEndsWith(String),
    /// Range test (`field BETWEEN low AND high`).
    Range(Value, Value),
    /// NULL test (`true` for `IS NULL`).
    IsNull(bool),
    /// JSON object key presence.
    HasKey(String),
}

/// All lookup names accepted as the last `__` segment of a keyword filter.
pub const LOOKUP_NAMES: &[&str] = &[
    "exact",
    "iexact",
    "contains",
    "icontains",
    "in",
    "gt",
    "gte",
    "lt",
    "lte",
    "startswith",
    "istartswith",
    "endswith",
    "iendswith",
    "range",
    "isnull",
    "has_key",
];

impl Lookup {
    /// Returns the keyword name of this lookup.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Exact(_) => "exact",
            Self::IExact(_) => "iexact",
            Self::Contains(_) => "contains",
            Self::IContains(_) => "icontains",
            Self::In(_) | Self::InQuery(_) => "in",
            Self::Gt(_) => "gt",
            Self::Gte(_) => "gte",
            Self::Lt(_) => "lt",
            Self::Lte(_) => "lte",
            Self::StartsWith(_) => "startswith",
            Self::IStartsWith(_) => "istartswith",
            Self::EndsWith(_) => "endswith",
            Self::IEndsWith(_) => "iendswith",
            Self::Range(_, _) => "range",
            Self::IsNull(_) => "isnull",
            Self::HasKey(_) => "has_key",
        }
    }

    /// Returns `true` if `name` is a lookup keyword.
    pub fn is_lookup_name(name: &str) -> bool {
        LOOKUP_NAMES.contains(&name)
    }

    /// Builds a lookup from its keyword name and a value.
    ///
    /// # Errors
    ///
    /// Returns [`EavError::NotSupported`] for unknown names or values of the
    /// wrong shape (e.g. a `range` that is not a two-element list).
    pub fn from_name(name: &str, value: Value) -> EavResult<Self> {
        let text = |value: Value| match value {
            Value::String(s) => s,
            other => other.to_string(),
        };
        Ok(match name {
            "exact" => Self::Exact(value),
            "iexact" => Self::IExact(value),
            "contains" => Self::Contains(text(value)),
            "icontains" => Self::IContains(text(value)),
            "in" => match value {
                Value::List(values) => Self::In(values),
                other => Self::In(vec![other]),
            },
            "gt" => Self::Gt(value),
            "gte" => Self::Gte(value),
            "lt" => Self::Lt(value),
            "lte" => Self::Lte(value),
            "startswith" => Self::StartsWith(text(value)),
            "istartswith" => Self::IStartsWith(text(value)),
            "endswith" => Self::EndsWith(text(value)),
            "iendswith" => Self::IEndsWith(text(value)),
            "range" => match value {
                Value::List(mut bounds) if bounds.len() == 2 => {
                    let high = bounds.pop().unwrap_or(Value::Null);
                    let low = bounds.pop().unwrap_or(Value::Null);
                    Self::Range(low, high)
                }
                other => {
                    return Err(EavError::NotSupported(format!(
                        "range lookup needs a two-element list, got {other}"
                    )))
                }
            },
            "isnull" => match value.as_bool() {
                Some(b) => Self::IsNull(b),
                None => {
                    return Err(EavError::NotSupported(format!(
                        "isnull lookup needs a boolean, got {value}"
                    )))
                }
            },
            "has_key" => Self::HasKey(text(value)),
            other => {
                return Err(EavError::NotSupported(format!("Unknown lookup '{other}'")));
            }
        })
    }

    /// Returns the comparison value carried by this lookup, if it has one.
    pub const fn value(&self) -> Option<&Value> {
        match self {
            Self::Exact(v) | Self::IExact(v) | Self::Gt(v) | Self::Gte(v) | Self::Lt(v) | Self::Lte(v) => {
                Some(v)
            }
            _ => None,
        }
    }
}

/// Splits a keyword filter key into its field path and lookup.
///
/// The last `__` segment is treated as the lookup when it names one;
/// otherwise the lookup is `exact`.
///
/// # Examples
///
/// ```
/// use eav_rs_db::query::lookups::{parse_kwarg, Lookup};
/// use eav_rs_db::value::Value;
///
/// let (field, lookup) = parse_kwarg("eav__age__gte", Value::from(3)).unwrap();
/// assert_eq!(field, "eav__age");
/// assert_eq!(lookup, Lookup::Gte(Value::Int(3)));
///
/// let (field, lookup) = parse_kwarg("eav__extras__chills", Value::from("no")).unwrap();
/// assert_eq!(field, "eav__extras__chills");
/// assert!(matches!(lookup, Lookup::Exact(_)));
/// ```
pub fn parse_kwarg(key: &str, value: Value) -> EavResult<(String, Lookup)> {
    if let Some((path, last)) = key.rsplit_once("__") {
        if Lookup::is_lookup_name(last) {
            return Ok((path.to_string(), Lookup::from_name(last, value)?));
        }
    }
    Ok((key.to_string(), Lookup::Exact(value)))
}

/// Returns `true` if the key ends in an explicit lookup other than `exact`.
pub fn has_lookup_suffix(key: &str) -> bool {
    key.rsplit_once("__")
        .is_some_and(|(_, last)| Lookup::is_lookup_name(last))
}

/// A composable query filter.
///
/// `Q` objects can be combined using `&` (AND), `|` (OR), and `!` (NOT)
/// operators to build arbitrarily complex WHERE clauses.
#[derive(Debug, Clone, PartialEq)]
pub enum Q {
    /// A single field lookup.
    Filter {
        /// The field path (may use `__` notation for related fields).
        field: String,
        /// The lookup operation.
        lookup: Lookup,
    },
    /// Logical AND of multiple conditions.
    And(Vec<Q>),
    /// Logical OR of multiple conditions.
    Or(Vec<Q>),
    /// Logical negation of a condition.
    Not(Box<Q>),
}

impl Q {
    /// Creates a new filter Q object.
    pub fn filter(field: impl Into<String>, lookup: Lookup) -> Self {
        Self::Filter {
            field: field.into(),
            lookup,
        }
    }

    /// Creates an exact-match filter.
    pub fn exact(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::filter(field, Lookup::Exact(value.into()))
    }

    /// Builds a Q object from keyword filters, ANDing them in order.
    ///
    /// # Errors
    ///
    /// Propagates lookup parse errors.
    pub fn from_kwargs(kwargs: &[(String, Value)]) -> EavResult<Self> {
        let mut children = Vec::with_capacity(kwargs.len());
        for (key, value) in kwargs {
            let (field, lookup) = parse_kwarg(key, value.clone())?;
            children.push(Self::filter(field, lookup));
        }
        Ok(if children.len() == 1 {
            children.remove(0)
        } else {
            Self::And(children)
        })
    }

    /// Returns `true` if this is an empty AND or OR.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::And(children) | Self::Or(children) => children.is_empty(),
            _ => false,
        }
    }

    /// Returns `true` if this is a single field lookup.
    pub const fn is_leaf(&self) -> bool {
        matches!(self, Self::Filter { .. })
    }
}

impl ops::BitAnd for Q {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        match (self, rhs) {
            // Flatten nested ANDs
            (Self::And(mut left), Self::And(right)) => {
                left.extend(right);
                Self::And(left)
            }
            (Self::And(mut left), other) => {
                left.push(other);
                Self::And(left)
            }
            (other, Self::And(mut right)) => {
                right.insert(0, other);
                Self::And(right)
            }
            (left, right) => Self::And(vec![left, right]),
        }
    }
}

impl ops::BitOr for Q {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        match (self, rhs) {
            // Flatten nested ORs
            (Self::Or(mut left), Self::Or(right)) => {
                left.extend(right);
                Self::Or(left)
            }
            (Self::Or(mut left), other) => {
                left.push(other);
                Self::Or(left)
            }
            (other, Self::Or(mut right)) => {
                right.insert(0, other);
                Self::Or(right)
            }
            (left, right) => Self::Or(vec![left, right]),
        }
    }
}

impl ops::Not for Q {
    type Output = Self;

    fn not(self) -> Self::Output {
        // Double negation cancellation
        match self {
            Self::Not(inner) => *inner,
            other => Self::Not(Box::new(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_and_flattening() {
        let q1 = Q::exact("a", 1);
        let q2 = Q::exact("b", 2);
        let q3 = Q::exact("c", 3);
        match (q1 & q2) & q3 {
            Q::And(children) => assert_eq!(children.len(), 3),
            _ => panic!("Expected And with 3 children"),
        }
    }

    #[test]
    fn test_or_flattening() {
        let combined = (Q::exact("a", 1) | Q::exact("b", 2)) | Q::exact("c", 3);
        match &combined {
            Q::Or(children) => assert_eq!(children.len(), 3),
            _ => panic!("Expected Or with 3 children"),
        }
    }

    #[test]
    fn test_double_negation() {
        let q = Q::exact("active", true);
        assert_eq!(!!q.clone(), q);
    }

    #[test]
    fn test_complex_combination() {
        let combined = (Q::exact("name", "Alice") & Q::filter("age", Lookup::Gt(Value::from(25))))
            | Q::exact("name", "Bob");
        match &combined {
            Q::Or(children) => {
                assert_eq!(children.len(), 2);
                assert!(matches!(&children[0], Q::And(_)));
                assert!(children[1].is_leaf());
            }
            _ => panic!("Expected Or"),
        }
    }

    #[test]
    fn test_parse_kwarg_plain_field() {
        let (field, lookup) = parse_kwarg("name", Value::from("Bob")).unwrap();
        assert_eq!(field, "name");
        assert_eq!(lookup, Lookup::Exact(Value::from("Bob")));
    }

    #[test]
    fn test_parse_kwarg_lookups() {
        let (field, lookup) = parse_kwarg("eav__city__contains", Value::from("Y")).unwrap();
        assert_eq!(field, "eav__city");
        assert_eq!(lookup, Lookup::Contains("Y".into()));

        let (_, lookup) = parse_kwarg("eav__illness__isnull", Value::from(false)).unwrap();
        assert_eq!(lookup, Lookup::IsNull(false));

        let (_, lookup) = parse_kwarg("eav__extras__has_key", Value::from("chills")).unwrap();
        assert_eq!(lookup, Lookup::HasKey("chills".into()));
    }

    #[test]
    fn test_parse_kwarg_in_and_range() {
        let (_, lookup) =
            parse_kwarg("age__in", Value::List(vec![Value::Int(1), Value::Int(2)])).unwrap();
        assert_eq!(lookup, Lookup::In(vec![Value::Int(1), Value::Int(2)]));

        let (_, lookup) =
            parse_kwarg("age__range", Value::List(vec![Value::Int(1), Value::Int(9)])).unwrap();
        assert_eq!(lookup, Lookup::Range(Value::Int(1), Value::Int(9)));

        assert!(parse_kwarg("age__range", Value::Int(1)).is_err());
    }

    #[test]
    fn test_from_kwargs_single_and_many() {
        let single = Q::from_kwargs(&crate::kwargs! { "name" => "Bob" }).unwrap();
        assert!(single.is_leaf());

        let many = Q::from_kwargs(&crate::kwargs! { "name" => "Bob", "age__lt" => 3 }).unwrap();
        match many {
            Q::And(children) => assert_eq!(children.len(), 2),
            _ => panic!("Expected And"),
        }
    }

    #[test]
    fn test_has_lookup_suffix() {
        assert!(has_lookup_suffix("name__contains"));
        assert!(!has_lookup_suffix("eav__age"));
        assert!(!has_lookup_suffix("name"));
    }

    #[test]
    fn test_lookup_names_round_trip() {
        for name in LOOKUP_NAMES {
            let value = match *name {
                "range" => Value::List(vec![Value::Int(0), Value::Int(1)]),
                "isnull" => Value::Bool(true),
                _ => Value::from("x"),
            };
            assert_eq!(Lookup::from_name(name, value).unwrap().name(), *name);
        }
        assert!(Lookup::from_name("regex", Value::from("x")).is_err());
    }
}
