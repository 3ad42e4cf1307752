//! Field type definitions.
//!
//! Each [`FieldType`] variant corresponds to one column shape, and
//! [`FieldDef`] captures all metadata about a single model field.

use crate::model::ModelKey;
use crate::value::Value;

/// The type of a model field, determining its SQL column type and behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    /// Auto-incrementing integer primary key.
    AutoField,
    /// UUID, generated on first save when used as primary key.
    UuidField,
    /// Variable-length string with a max length.
    CharField,
    /// Unlimited-length text.
    TextField,
    /// 64-bit signed integer.
    IntegerField,
    /// 64-bit floating-point number.
    FloatField,
    /// Boolean (true/false).
    BooleanField,
    /// Date without time.
    DateField,
    /// Date and time.
    DateTimeField,
    /// JSON document.
    JsonField,
    /// Many-to-one relationship.
    ForeignKey {
        /// The target model.
        to: ModelKey,
        /// Behavior when the referenced object is deleted.
        on_delete: OnDelete,
        /// The name used for the reverse relation. Defaults to the source
        /// model name.
        related_name: Option<&'static str>,
    },
}

/// Behavior when a referenced object is deleted (ON DELETE action).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    /// Delete all related objects.
    Cascade,
    /// Prevent deletion if related objects exist.
    Protect,
    /// Set the foreign key to NULL.
    SetNull,
}

impl OnDelete {
    /// Returns the SQL `ON DELETE` action.
    pub const fn sql_action(self) -> &'static str {
        match self {
            Self::Cascade => "CASCADE",
            Self::Protect => "RESTRICT",
            Self::SetNull => "SET NULL",
        }
    }
}

impl FieldType {
    /// Returns the SQLite column type.
    pub const fn sql_type(&self) -> &'static str {
        match self {
            Self::AutoField | Self::IntegerField | Self::BooleanField | Self::ForeignKey { .. } => {
                "INTEGER"
            }
            Self::FloatField => "REAL",
            Self::UuidField | Self::CharField | Self::TextField | Self::JsonField => "TEXT",
            Self::DateField => "DATE",
            Self::DateTimeField => "DATETIME",
        }
    }
}

/// Complete definition of a model field.
///
/// Constructed with [`FieldDef::new`] (or [`FieldDef::foreign_key`]) and the
/// builder methods when implementing [`Model`](crate::model::Model).
#[derive(Debug, Clone)]
pub struct FieldDef {
    /// The attribute name of this field, used in lookups.
    pub name: &'static str,
    /// The database column name.
    pub column: String,
    /// The type of this field.
    pub field_type: FieldType,
    /// Whether this field is the primary key.
    pub primary_key: bool,
    /// Whether NULL is allowed in the database.
    pub null: bool,
    /// Whether a UNIQUE constraint is applied.
    pub unique: bool,
    /// Maximum character length (for `CharField`).
    pub max_length: Option<usize>,
    /// Default value for the column.
    pub default: Option<Value>,
}

impl FieldDef {
    /// Creates a new `FieldDef` with sensible defaults.
    ///
    /// Only the field name and type are required. All other attributes take
    /// their default values (non-null, not unique, no default).
    pub fn new(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            column: name.to_string(),
            field_type,
            primary_key: false,
            null: false,
            unique: false,
            max_length: None,
            default: None,
        }
    }

    /// Creates a foreign key field stored in the `<name>_id` column.
    pub fn foreign_key(name: &'static str, to: ModelKey, on_delete: OnDelete) -> Self {
        Self::new(
            name,
            FieldType::ForeignKey {
                to,
                on_delete,
                related_name: None,
            },
        )
        .column(format!("{name}_id"))
    }

    /// Sets the database column name.
    #[must_use]
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    /// Marks this field as the primary key.
    #[must_use]
    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Allows NULL values in the database.
    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.null = true;
        self
    }

    /// Marks this field as having a UNIQUE constraint.
    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Sets the maximum character length.
    #[must_use]
    pub const fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Sets the default value for this field.
    #[must_use]
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Sets the reverse relation name of a foreign key. No-op on other fields.
    #[must_use]
    pub fn related_name(mut self, name: &'static str) -> Self {
        if let FieldType::ForeignKey { related_name, .. } = &mut self.field_type {
            *related_name = Some(name);
        }
        self
    }

    /// Returns `true` if this field represents a relational field.
    pub const fn is_relation(&self) -> bool {
        matches!(self.field_type, FieldType::ForeignKey { .. })
    }

    /// Returns the target model of a foreign key.
    pub const fn related_model(&self) -> Option<ModelKey> {
        match self.field_type {
            FieldType::ForeignKey { to, .. } => Some(to),
            _ => None,
        }
    }

    /// Returns the column definition used in `CREATE TABLE`.
    pub fn column_sql(&self) -> String {
        let mut sql = format!("\"{}\" {}", self.column, self.field_type.sql_type());
        if self.primary_key {
            sql.push_str(" PRIMARY KEY");
            if self.field_type == FieldType::AutoField {
                sql.push_str(" AUTOINCREMENT");
            }
            return sql;
        }
        if !self.null {
            sql.push_str(" NOT NULL");
        }
        if self.unique {
            sql.push_str(" UNIQUE");
        }
        if let Some(default) = &self.default {
            sql.push_str(&format!(" DEFAULT {}", default.to_sql_literal()));
        }
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGET: ModelKey = ModelKey::new("app", "target");

    #[test]
    fn test_field_def_defaults() {
        let f = FieldDef::new("name", FieldType::CharField);
        assert_eq!(f.column, "name");
        assert!(!f.null);
        assert!(!f.primary_key);
        assert!(f.default.is_none());
    }

    #[test]
    fn test_foreign_key_column() {
        let f = FieldDef::foreign_key("patient", TARGET, OnDelete::Cascade);
        assert_eq!(f.column, "patient_id");
        assert!(f.is_relation());
        assert_eq!(f.related_model(), Some(TARGET));
    }

    #[test]
    fn test_related_name() {
        let f = FieldDef::foreign_key("patient", TARGET, OnDelete::Cascade).related_name("visits");
        match f.field_type {
            FieldType::ForeignKey { related_name, .. } => assert_eq!(related_name, Some("visits")),
            _ => panic!("expected foreign key"),
        }
    }

    #[test]
    fn test_column_sql() {
        let pk = FieldDef::new("id", FieldType::AutoField).primary_key();
        assert_eq!(pk.column_sql(), "\"id\" INTEGER PRIMARY KEY AUTOINCREMENT");

        let flag = FieldDef::new("required", FieldType::BooleanField).default(false);
        assert_eq!(flag.column_sql(), "\"required\" INTEGER NOT NULL DEFAULT 0");

        let slug = FieldDef::new("slug", FieldType::CharField).unique();
        assert_eq!(slug.column_sql(), "\"slug\" TEXT NOT NULL UNIQUE");
    }

    #[test]
    fn test_on_delete_sql() {
        assert_eq!(OnDelete::Protect.sql_action(), "RESTRICT");
        assert_eq!(OnDelete::SetNull.sql_action(), "SET NULL");
    }
}
