//! Per-datatype value validators.
//!
//! Each validator is a plain function over an [`AttrValue`]; the
//! `to_*` helpers perform the matching coercion so that what validates is
//! exactly what can be stored. Enum group membership needs the database and
//! is checked by [`Attribute::validate_value`](crate::models::Attribute::validate_value).

use eav_rs_core::ValidationError;

use crate::attr_value::AttrValue;
use crate::datatype::Datatype;

/// A datatype validator.
pub type Validator = fn(&AttrValue) -> Result<(), ValidationError>;

fn invalid(message: &str, code: &str, value: &AttrValue) -> ValidationError {
    ValidationError::new(message, code).with_param("value", value.to_string())
}

/// Returns the validators for a datatype.
pub fn validators_for(datatype: Datatype) -> Vec<Validator> {
    vec![match datatype {
        Datatype::Text => validate_text,
        Datatype::Float => validate_float,
        Datatype::Int => validate_int,
        Datatype::Date => validate_date,
        Datatype::Bool => validate_bool,
        Datatype::Object => validate_object,
        Datatype::Enum => validate_enum,
        Datatype::Json => validate_json,
        Datatype::Csv => validate_csv,
    }]
}

/// Accepts text.
pub fn validate_text(value: &AttrValue) -> Result<(), ValidationError> {
    match value {
        AttrValue::Text(_) => Ok(()),
        other => Err(invalid("Must be a string", "invalid_text", other)),
    }
}

/// Accepts anything [`to_float`] converts.
pub fn validate_float(value: &AttrValue) -> Result<(), ValidationError> {
    to_float(value).map(drop)
}

/// Accepts anything [`to_int`] converts.
pub fn validate_int(value: &AttrValue) -> Result<(), ValidationError> {
    to_int(value).map(drop)
}

/// Accepts dates and date-times.
pub fn validate_date(value: &AttrValue) -> Result<(), ValidationError> {
    match value {
        AttrValue::Date(_) => Ok(()),
        other => Err(invalid("Must be a date or datetime", "invalid_date", other)),
    }
}

/// Accepts booleans only; `1` and `"true"` are rejected.
pub fn validate_bool(value: &AttrValue) -> Result<(), ValidationError> {
    match value {
        AttrValue::Bool(_) => Ok(()),
        other => Err(invalid("Must be a boolean value", "invalid_bool", other)),
    }
}

/// Accepts references to saved records.
pub fn validate_object(value: &AttrValue) -> Result<(), ValidationError> {
    match value {
        AttrValue::Object(object) if object.pk.is_some() => Ok(()),
        AttrValue::Object(_) => Err(ValidationError::new(
            "Model has to be saved first",
            "unsaved_object",
        )),
        other => Err(invalid("Must be a saved object", "invalid_object", other)),
    }
}

/// Accepts saved enum values. Group membership is checked separately.
pub fn validate_enum(value: &AttrValue) -> Result<(), ValidationError> {
    match value {
        AttrValue::Enum(choice) if choice.id.is_some() => Ok(()),
        AttrValue::Enum(_) => Err(ValidationError::new(
            "EnumValue has not been saved yet",
            "unsaved_enum",
        )),
        other => Err(invalid("Must be an EnumValue", "invalid_enum", other)),
    }
}

/// Accepts anything [`to_json`] converts.
pub fn validate_json(value: &AttrValue) -> Result<(), ValidationError> {
    to_json(value).map(drop)
}

/// Accepts lists and separator-joined text.
pub fn validate_csv(value: &AttrValue) -> Result<(), ValidationError> {
    match value {
        AttrValue::Csv(_) | AttrValue::Text(_) => Ok(()),
        other => Err(invalid(
            "Must be a list of strings or a separated string",
            "invalid_csv",
            other,
        )),
    }
}

/// Converts floats, integers, and numeric text to `f64`.
pub fn to_float(value: &AttrValue) -> Result<f64, ValidationError> {
    let err = || invalid("Must be a float", "invalid_float", value);
    match value {
        AttrValue::Float(f) if f.is_finite() => Ok(*f),
        #[allow(clippy::cast_precision_loss)]
        AttrValue::Int(i) => Ok(*i as f64),
        AttrValue::Text(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .ok_or_else(err),
        _ => Err(err()),
    }
}

/// Converts integers, whole floats, and integer text to `i64`.
pub fn to_int(value: &AttrValue) -> Result<i64, ValidationError> {
    let err = || invalid("Must be an integer", "invalid_int", value);
    match value {
        AttrValue::Int(i) => Ok(*i),
        #[allow(clippy::cast_possible_truncation)]
        AttrValue::Float(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e18 => {
            Ok(*f as i64)
        }
        AttrValue::Text(s) => s.trim().parse::<i64>().map_err(|_| err()),
        _ => Err(err()),
    }
}

/// Converts JSON objects and text holding one to a JSON object.
pub fn to_json(value: &AttrValue) -> Result<serde_json::Value, ValidationError> {
    let err = || invalid("Must be a JSON object", "invalid_json", value);
    match value {
        AttrValue::Json(json @ serde_json::Value::Object(_)) => Ok(json.clone()),
        AttrValue::Text(s) => match serde_json::from_str::<serde_json::Value>(s) {
            Ok(json @ serde_json::Value::Object(_)) => Ok(json),
            _ => Err(err()),
        },
        _ => Err(err()),
    }
}

/// Rejects list items that contain `separator`; they would split apart
/// once stored.
pub fn validate_csv_items(items: &[String], separator: &str) -> Result<(), ValidationError> {
    match items.iter().find(|item| !separator.is_empty() && item.contains(separator)) {
        Some(item) => Err(ValidationError::new(
            format!("List items cannot contain the separator '{separator}'"),
            "invalid_csv",
        )
        .with_param("value", item.clone())),
        None => Ok(()),
    }
}

/// Converts a list or `separator`-joined text to a list of trimmed items.
pub fn to_csv(value: &AttrValue, separator: &str) -> Result<Vec<String>, ValidationError> {
    match value {
        AttrValue::Csv(items) => {
            validate_csv_items(items, separator)?;
            Ok(items.clone())
        }
        AttrValue::Text(s) if s.trim().is_empty() => Ok(Vec::new()),
        AttrValue::Text(s) => Ok(s.split(separator).map(|item| item.trim().to_string()).collect()),
        other => Err(invalid(
            "Must be a list of strings or a separated string",
            "invalid_csv",
            other,
        )),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use super::*;
    use crate::attr_value::ObjectRef;
    use crate::models::EnumValue;

    #[test]
    fn test_text() {
        assert!(validate_text(&"hello".into()).is_ok());
        assert!(validate_text(&AttrValue::Int(1)).is_err());
    }

    #[test]
    fn test_float_accepts_numeric_text() {
        assert!(validate_float(&AttrValue::Float(2.3)).is_ok());
        assert!(validate_float(&AttrValue::Int(15)).is_ok());
        assert!((to_float(&"2.3".into()).unwrap() - 2.3).abs() < f64::EPSILON);
        assert!(validate_float(&"abc".into()).is_err());
        assert!(validate_float(&AttrValue::Bool(true)).is_err());
        assert!(validate_float(&AttrValue::Float(f64::NAN)).is_err());
    }

    #[test]
    fn test_int() {
        assert_eq!(to_int(&AttrValue::Int(3)).unwrap(), 3);
        assert_eq!(to_int(&" 15 ".into()).unwrap(), 15);
        assert_eq!(to_int(&AttrValue::Float(4.0)).unwrap(), 4);
        let err = validate_int(&"df".into()).unwrap_err();
        assert_eq!(err.code, "invalid_int");
        assert!(validate_int(&AttrValue::Float(2.5)).is_err());
    }

    #[test]
    fn test_date() {
        let day = NaiveDate::from_ymd_opt(2011, 1, 23).unwrap();
        assert!(validate_date(&day.into()).is_ok());
        assert!(validate_date(&day.and_hms_opt(10, 5, 0).unwrap().into()).is_ok());
        assert!(validate_date(&"12".into()).is_err());
        assert!(validate_date(&AttrValue::Int(15)).is_err());
    }

    #[test]
    fn test_bool_is_strict() {
        assert!(validate_bool(&true.into()).is_ok());
        assert!(validate_bool(&AttrValue::Int(1)).is_err());
        assert!(validate_bool(&"true".into()).is_err());
    }

    #[test]
    fn test_object_needs_pk() {
        let saved = ObjectRef {
            content_type_id: 3,
            pk: Some(1),
        };
        let unsaved = ObjectRef {
            content_type_id: 3,
            pk: None,
        };
        assert!(validate_object(&saved.into()).is_ok());
        assert_eq!(validate_object(&unsaved.into()).unwrap_err().code, "unsaved_object");
        assert!(validate_object(&AttrValue::Int(1)).is_err());
    }

    #[test]
    fn test_enum_needs_saved_value() {
        let saved = EnumValue {
            id: Some(1),
            value: "yes".into(),
        };
        assert!(validate_enum(&saved.into()).is_ok());
        assert!(validate_enum(&EnumValue::new("no").into()).is_err());
        assert!(validate_enum(&"yes".into()).is_err());
    }

    #[test]
    fn test_json() {
        assert!(validate_json(&json!({"a": 1}).into()).is_ok());
        assert!(validate_json(&r#"{"chills": "yes"}"#.into()).is_ok());
        assert!(validate_json(&json!([1, 2]).into()).is_err());
        assert!(validate_json(&"{not json".into()).is_err());
        assert!(validate_json(&AttrValue::Int(2)).is_err());
    }

    #[test]
    fn test_csv() {
        assert_eq!(to_csv(&"flu; cold".into(), ";").unwrap(), vec!["flu", "cold"]);
        assert_eq!(to_csv(&"a,b".into(), ",").unwrap(), vec!["a", "b"]);
        assert!(to_csv(&"".into(), ";").unwrap().is_empty());
        let err = to_csv(&AttrValue::Csv(vec!["a;b".into(), "c".into()]), ";").unwrap_err();
        assert_eq!(err.code, "invalid_csv");
        assert!(to_csv(&AttrValue::Csv(vec!["a;b".into()]), ",").is_ok());
        assert!(validate_csv(&vec!["x", "y"].into()).is_ok());
        assert!(validate_csv(&AttrValue::Float(1.0)).is_err());
    }

    #[test]
    fn test_validators_for_each_datatype() {
        for datatype in Datatype::ALL {
            assert_eq!(validators_for(datatype).len(), 1);
        }
        let text = validators_for(Datatype::Text)[0];
        assert!(text(&"x".into()).is_ok());
    }
}
