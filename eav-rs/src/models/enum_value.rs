//! Enum choices.

use std::fmt;

use eav_rs_core::{EavError, EavResult, ValidationError};
use eav_rs_db::{
    save_model, Database, FieldDef, FieldType, FromValue, Model, ModelMeta, QuerySet, Q,
};
use once_cell::sync::Lazy;

use super::APP_LABEL;

/// Maximum length of an enum label.
pub const MAX_LENGTH: usize = 50;

/// A unique, labelled choice. Groups of choices are [`EnumGroup`](super::EnumGroup)s;
/// one value may belong to several groups.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct EnumValue {
    pub id: Option<i64>,
    pub value: String,
}

impl EnumValue {
    /// Creates an unsaved choice.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            id: None,
            value: value.into(),
        }
    }

    /// Creates and saves a choice.
    ///
    /// # Errors
    ///
    /// Returns a validation error for blank or overlong labels and an
    /// integrity error if the label exists.
    pub fn create(db: &Database, value: impl Into<String>) -> EavResult<Self> {
        let mut choice = Self::new(value);
        choice.save(db)?;
        Ok(choice)
    }

    /// Validates and saves this choice.
    ///
    /// # Errors
    ///
    /// See [`EnumValue::create`].
    pub fn save(&mut self, db: &Database) -> EavResult<()> {
        if self.value.trim().is_empty() {
            return Err(ValidationError::field(
                "value",
                ValidationError::new("This field cannot be blank.", "blank"),
            )
            .into());
        }
        if self.value.chars().count() > MAX_LENGTH {
            return Err(ValidationError::field(
                "value",
                ValidationError::new(
                    format!("Ensure this value has at most {MAX_LENGTH} characters."),
                    "max_length",
                ),
            )
            .into());
        }
        save_model(db, self)?;
        Ok(())
    }

    /// Returns a query set over every choice.
    pub fn objects() -> QuerySet<Self> {
        QuerySet::new()
    }

    /// Fetches a choice by primary key.
    ///
    /// # Errors
    ///
    /// Returns [`EavError::DoesNotExist`] if there is none.
    pub fn get_by_id(db: &Database, id: i64) -> EavResult<Self> {
        Self::objects().filter(Q::exact("pk", id)).get_exec(db)
    }

    /// Fetches a choice by its label, which is its natural key.
    ///
    /// # Errors
    ///
    /// Returns [`EavError::DoesNotExist`] if there is none.
    pub fn get_by_natural_key(db: &Database, value: &str) -> EavResult<Self> {
        Self::objects().filter(Q::exact("value", value)).get_exec(db)
    }

    /// Returns the natural key: the label.
    pub fn natural_key(&self) -> (String,) {
        (self.value.clone(),)
    }

    pub(crate) fn saved_id(&self) -> EavResult<i64> {
        self.id.ok_or_else(|| {
            EavError::DatabaseError(format!("EnumValue '{}' has not been saved", self.value))
        })
    }
}

impl fmt::Display for EnumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// Filters compare enum choices by primary key.
impl From<EnumValue> for eav_rs_db::Value {
    fn from(choice: EnumValue) -> Self {
        Self::from(choice.id)
    }
}

impl From<&EnumValue> for eav_rs_db::Value {
    fn from(choice: &EnumValue) -> Self {
        Self::from(choice.id)
    }
}

impl Model for EnumValue {
    fn meta() -> &'static ModelMeta {
        static META: Lazy<ModelMeta> = Lazy::new(|| ModelMeta {
            app_label: APP_LABEL,
            model_name: "enumvalue",
            db_table: "eav_enumvalue".to_string(),
            verbose_name: "enum value".to_string(),
            ordering: vec![],
            fields: vec![
                FieldDef::new("id", FieldType::AutoField).primary_key(),
                FieldDef::new("value", FieldType::CharField)
                    .max_length(MAX_LENGTH)
                    .unique(),
            ],
            constraints: vec![],
        });
        &META
    }

    fn pk(&self) -> Option<eav_rs_db::Value> {
        self.id.map(eav_rs_db::Value::Int)
    }

    fn set_pk(&mut self, value: eav_rs_db::Value) {
        self.id = value.as_int();
    }

    fn field_values(&self) -> Vec<(&'static str, eav_rs_db::Value)> {
        vec![
            ("id", eav_rs_db::Value::from(self.id)),
            ("value", eav_rs_db::Value::from(self.value.as_str())),
        ]
    }

    fn set_field(&mut self, column: &str, value: &eav_rs_db::Value) -> EavResult<()> {
        match column {
            "id" => self.id = FromValue::from_value(value)?,
            "value" => self.value = FromValue::from_value(value)?,
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::eav_db;

    #[test]
    fn test_create_and_natural_key() {
        let db = eav_db();
        let yes = EnumValue::create(&db, "yes").unwrap();
        assert!(yes.id.is_some());
        assert_eq!(yes.to_string(), "yes");
        assert_eq!(EnumValue::get_by_natural_key(&db, "yes").unwrap(), yes);
        assert_eq!(yes.natural_key(), ("yes".to_string(),));
        assert_eq!(EnumValue::get_by_id(&db, yes.id.unwrap()).unwrap(), yes);
    }

    #[test]
    fn test_labels_are_unique() {
        let db = eav_db();
        EnumValue::create(&db, "yes").unwrap();
        let err = EnumValue::create(&db, "yes").unwrap_err();
        assert!(matches!(err, EavError::IntegrityError(_)));
    }

    #[test]
    fn test_blank_and_long_labels_fail() {
        let db = eav_db();
        assert!(EnumValue::create(&db, " ").unwrap_err().is_validation());
        assert!(EnumValue::create(&db, "x".repeat(51)).unwrap_err().is_validation());
    }

    #[test]
    fn test_filter_value_is_the_id() {
        let db = eav_db();
        let no = EnumValue::create(&db, "no").unwrap();
        assert_eq!(eav_rs_db::Value::from(&no), eav_rs_db::Value::Int(no.id.unwrap()));
        assert_eq!(eav_rs_db::Value::from(EnumValue::new("x")), eav_rs_db::Value::Null);
    }
}
