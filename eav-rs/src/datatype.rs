//! Attribute datatypes.
//!
//! Every [`Attribute`](crate::models::Attribute) has exactly one
//! [`Datatype`], which decides how its values are validated and which typed
//! column of the value table stores them.

use std::fmt;
use std::str::FromStr;

use eav_rs_core::ValidationError;
use serde::{Deserialize, Serialize};

/// The kind of data an attribute holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Datatype {
    /// Free text.
    Text,
    /// A floating-point number.
    Float,
    /// An integer.
    Int,
    /// A date, stored as a date-time at midnight.
    Date,
    /// A boolean.
    Bool,
    /// A reference to any persisted record.
    Object,
    /// One value of the attribute's enum group.
    Enum,
    /// A JSON object.
    Json,
    /// A list of strings.
    Csv,
}

impl Datatype {
    /// Every datatype, in declaration order.
    pub const ALL: [Self; 9] = [
        Self::Text,
        Self::Float,
        Self::Int,
        Self::Date,
        Self::Bool,
        Self::Object,
        Self::Enum,
        Self::Json,
        Self::Csv,
    ];

    /// Returns the stored code.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Float => "float",
            Self::Int => "int",
            Self::Date => "date",
            Self::Bool => "bool",
            Self::Object => "object",
            Self::Enum => "enum",
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }

    /// Returns the human-readable label.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Text => "Text",
            Self::Float => "Float",
            Self::Int => "Integer",
            Self::Date => "Date",
            Self::Bool => "True / False",
            Self::Object => "Object",
            Self::Enum => "Multiple Choice",
            Self::Json => "JSON Object",
            Self::Csv => "Comma-Separated-Value",
        }
    }

    /// Returns the value-table field holding values of this datatype.
    ///
    /// Object values are addressed through their primary key column.
    pub const fn value_field(self) -> &'static str {
        match self {
            Self::Text => "value_text",
            Self::Float => "value_float",
            Self::Int => "value_int",
            Self::Date => "value_date",
            Self::Bool => "value_bool",
            Self::Object => "generic_value_id",
            Self::Enum => "value_enum",
            Self::Json => "value_json",
            Self::Csv => "value_csv",
        }
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Datatype {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| {
                ValidationError::new(
                    format!("Value '{s}' is not a valid choice."),
                    "invalid_choice",
                )
                .with_param("value", s)
            })
    }
}
