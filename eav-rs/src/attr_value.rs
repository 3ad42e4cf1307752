//! Attribute values.
//!
//! [`AttrValue`] is what the entity proxy hands out and accepts. Its
//! boundary to the typed columns of the value table lives in
//! [`ValueColumns`](crate::models::ValueColumns).

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, SubsecRound};
use eav_rs_core::{EavError, EavResult, ValidationError};
use eav_rs_db::value::DATETIME_FORMAT;
use eav_rs_db::{ContentType, Database, Model, QuerySet, Value, Q};

use crate::datatype::Datatype;
use crate::models::EnumValue;
use crate::validators;

/// A reference to any persisted record by content type and integer key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    /// The content type of the referenced model.
    pub content_type_id: i64,
    /// The primary key, `None` while the record is unsaved.
    pub pk: Option<i64>,
}

impl ObjectRef {
    /// Builds a reference to `instance`.
    ///
    /// # Errors
    ///
    /// Returns [`EavError::NotSupported`] for models whose primary key is
    /// not an integer.
    pub fn of<M: Model>(db: &Database, instance: &M) -> EavResult<Self> {
        if M::meta().has_uuid_pk() {
            return Err(EavError::NotSupported(format!(
                "object attributes can only reference integer-keyed models, not {}",
                M::key()
            )));
        }
        let content_type = ContentType::get_for_model::<M>(db)?;
        Ok(Self {
            content_type_id: content_type.id_or_zero(),
            pk: instance.pk().and_then(|pk| pk.as_int()),
        })
    }

    /// Loads the referenced record.
    ///
    /// # Errors
    ///
    /// Returns [`EavError::DoesNotExist`] when the reference is unsaved, names
    /// another model, or the row is gone.
    pub fn resolve<M: Model>(&self, db: &Database) -> EavResult<M> {
        let content_type = ContentType::get_for_model::<M>(db)?;
        match self.pk {
            Some(pk) if content_type.id == Some(self.content_type_id) => {
                QuerySet::<M>::new().filter(Q::exact("pk", pk)).get_exec(db)
            }
            _ => Err(EavError::DoesNotExist(format!(
                "{self} does not reference a saved {}",
                M::key()
            ))),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pk {
            Some(pk) => write!(f, "object {}:{pk}", self.content_type_id),
            None => write!(f, "unsaved object of type {}", self.content_type_id),
        }
    }
}

/// Compares as the referenced key, for `eav__<slug>` filters on object
/// attributes.
impl From<ObjectRef> for Value {
    fn from(object: ObjectRef) -> Self {
        object.pk.map_or(Self::Null, Self::Int)
    }
}

/// The value of one attribute of one entity.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// No value.
    Null,
    /// Text.
    Text(String),
    /// A floating-point number.
    Float(f64),
    /// An integer.
    Int(i64),
    /// A date; plain dates are held at midnight.
    Date(NaiveDateTime),
    /// A boolean.
    Bool(bool),
    /// A choice of an enum group.
    Enum(EnumValue),
    /// A reference to another record.
    Object(ObjectRef),
    /// A JSON object.
    Json(serde_json::Value),
    /// A list of strings.
    Csv(Vec<String>),
}

impl AttrValue {
    /// Returns `true` for [`AttrValue::Null`].
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns `true` for values that are stored as "no value": null, empty
    /// text, and empty lists.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.is_empty(),
            Self::Csv(items) => items.is_empty(),
            _ => false,
        }
    }

    /// Returns the text, if this is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer, if this is one.
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the number as `f64`, if this is a float or an integer.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Returns the boolean, if this is one.
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the date-time, if this is a date.
    pub const fn as_date(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Returns the enum choice, if this is one.
    pub const fn as_enum(&self) -> Option<&EnumValue> {
        match self {
            Self::Enum(choice) => Some(choice),
            _ => None,
        }
    }

    /// Returns the object reference, if this is one.
    pub const fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Returns the JSON document, if this is one.
    pub const fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(json) => Some(json),
            _ => None,
        }
    }

    /// Returns the list, if this is one.
    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::Csv(items) => Some(items),
            _ => None,
        }
    }

    /// Converts a query-layer value, as passed in creation keywords.
    ///
    /// Integers stay integers; an enum attribute later resolves them as
    /// enum value ids.
    pub fn from_db(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Int(i) => Self::Int(*i),
            Value::Float(f) => Self::Float(*f),
            Value::String(s) => Self::Text(s.clone()),
            Value::Date(d) => Self::Date(d.and_time(NaiveTime::MIN)),
            Value::DateTime(dt) => Self::Date(*dt),
            Value::Uuid(u) => Self::Text(u.to_string()),
            Value::Json(json) => Self::Json(json.clone()),
            Value::List(items) => Self::Csv(items.iter().map(ToString::to_string).collect()),
        }
    }

    /// Converts this value into the canonical form stored for `datatype`.
    ///
    /// Numeric text becomes a number, JSON text a document, and separated
    /// text a list. Dates are truncated to microseconds. Enum labels are not resolved here; that needs the
    /// database.
    ///
    /// # Errors
    ///
    /// Returns the datatype's [`ValidationError`] when no conversion exists.
    pub fn coerce(&self, datatype: Datatype, separator: &str) -> Result<Self, ValidationError> {
        if self.is_null() {
            return Ok(Self::Null);
        }
        Ok(match datatype {
            Datatype::Float => Self::Float(validators::to_float(self)?),
            Datatype::Int => Self::Int(validators::to_int(self)?),
            Datatype::Json => Self::Json(validators::to_json(self)?),
            Datatype::Csv => Self::Csv(validators::to_csv(self, separator)?),
            Datatype::Date => {
                validators::validate_date(self)?;
                match self {
                    Self::Date(d) => Self::Date(d.trunc_subsecs(6)),
                    other => other.clone(),
                }
            }
            _ => {
                for validator in validators::validators_for(datatype) {
                    validator(self)?;
                }
                self.clone()
            }
        })
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Text(s) => f.write_str(s),
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Date(d) => write!(f, "{}", d.format(DATETIME_FORMAT)),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Enum(choice) => write!(f, "{choice}"),
            Self::Object(object) => write!(f, "{object}"),
            Self::Json(json) => write!(f, "{json}"),
            Self::Csv(items) => f.write_str(&items.join(";")),
        }
    }
}

// ── From implementations ───────────────────────────────────────────────

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for AttrValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<NaiveDate> for AttrValue {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v.and_time(NaiveTime::MIN))
    }
}

impl From<NaiveDateTime> for AttrValue {
    fn from(v: NaiveDateTime) -> Self {
        Self::Date(v)
    }
}

impl From<EnumValue> for AttrValue {
    fn from(v: EnumValue) -> Self {
        Self::Enum(v)
    }
}

impl From<&EnumValue> for AttrValue {
    fn from(v: &EnumValue) -> Self {
        Self::Enum(v.clone())
    }
}

impl From<ObjectRef> for AttrValue {
    fn from(v: ObjectRef) -> Self {
        Self::Object(v)
    }
}

impl From<serde_json::Value> for AttrValue {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v)
    }
}

impl From<Vec<String>> for AttrValue {
    fn from(v: Vec<String>) -> Self {
        Self::Csv(v)
    }
}

impl From<Vec<&str>> for AttrValue {
    fn from(v: Vec<&str>) -> Self {
        Self::Csv(v.into_iter().map(str::to_string).collect())
    }
}

impl<T: Into<Self>> From<Option<T>> for AttrValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_emptiness() {
        assert!(AttrValue::Null.is_empty());
        assert!(AttrValue::from("").is_empty());
        assert!(AttrValue::Csv(vec![]).is_empty());
        assert!(!AttrValue::from(json!({})).is_empty());
        assert!(!AttrValue::Int(0).is_empty());
        assert!(!AttrValue::Bool(false).is_empty());
    }

    #[test]
    fn test_dates_are_held_at_midnight() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let value = AttrValue::from(day);
        assert_eq!(value.as_date().unwrap(), day.and_time(NaiveTime::MIN));
        assert_eq!(AttrValue::from_db(&Value::Date(day)), value);
    }

    #[test]
    fn test_coerce() {
        assert_eq!(
            AttrValue::from("2.5").coerce(Datatype::Float, ";").unwrap(),
            AttrValue::Float(2.5)
        );
        assert_eq!(
            AttrValue::Int(15).coerce(Datatype::Float, ";").unwrap(),
            AttrValue::Float(15.0)
        );
        assert_eq!(
            AttrValue::from("flu;cold").coerce(Datatype::Csv, ";").unwrap(),
            AttrValue::from(vec!["flu", "cold"])
        );
        assert_eq!(
            AttrValue::from(r#"{"a": 1}"#).coerce(Datatype::Json, ";").unwrap(),
            AttrValue::from(json!({"a": 1}))
        );
        assert_eq!(AttrValue::Null.coerce(Datatype::Int, ";").unwrap(), AttrValue::Null);
        assert!(AttrValue::from("df").coerce(Datatype::Int, ";").is_err());
        assert!(AttrValue::Int(1).coerce(Datatype::Bool, ";").is_err());
    }

    #[test]
    fn test_from_option() {
        assert_eq!(AttrValue::from(None::<i64>), AttrValue::Null);
        assert_eq!(AttrValue::from(Some("x")), AttrValue::Text("x".into()));
    }

    #[test]
    fn test_display() {
        assert_eq!(AttrValue::from(vec!["a", "b"]).to_string(), "a;b");
        assert_eq!(AttrValue::Null.to_string(), "");
        assert_eq!(AttrValue::from(json!({"k": 1})).to_string(), r#"{"k":1}"#);
    }
}
