//! Model trait and metadata.
//!
//! The [`Model`] trait is the core abstraction that all persisted types
//! implement. It provides access to metadata, field values, and construction
//! from database rows. [`ModelMeta`] carries table name, ordering, fields, and
//! constraints.
//!
//! Models can expose [`Slots`], a per-instance map of named extension values.
//! Libraries layered on top of the ORM use slots to attach state (such as an
//! attribute buffer) to instances of types they do not own.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use eav_rs_core::{EavError, EavResult};

use crate::constraints::BoxedConstraint;
use crate::fields::{FieldDef, FieldType};
use crate::query::compiler::OrderBy;
use crate::row::Row;
use crate::value::Value;

/// Identifies a model type by application label and lowercase model name.
///
/// # Examples
///
/// ```
/// use eav_rs_db::model::ModelKey;
///
/// let key = ModelKey::new("test_project", "patient");
/// assert_eq!(key.to_string(), "test_project.patient");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelKey {
    /// The application label (e.g. "eav").
    pub app_label: &'static str,
    /// The model name in lowercase (e.g. "attribute").
    pub model: &'static str,
}

impl ModelKey {
    /// Creates a new key.
    pub const fn new(app_label: &'static str, model: &'static str) -> Self {
        Self { app_label, model }
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.app_label, self.model)
    }
}

/// Metadata about a model.
pub struct ModelMeta {
    /// The application label (e.g., "eav", "test_project").
    pub app_label: &'static str,
    /// The model name in lowercase (e.g., "patient").
    pub model_name: &'static str,
    /// The database table name.
    pub db_table: String,
    /// Human-readable singular name.
    pub verbose_name: String,
    /// Default ordering for queries.
    pub ordering: Vec<OrderBy>,
    /// Field definitions for this model.
    pub fields: Vec<FieldDef>,
    /// Table constraints (CHECK, UNIQUE).
    pub constraints: Vec<BoxedConstraint>,
}

impl ModelMeta {
    /// Returns the key identifying this model.
    pub const fn key(&self) -> ModelKey {
        ModelKey::new(self.app_label, self.model_name)
    }

    /// Returns the primary key field.
    pub fn pk_field(&self) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.primary_key)
    }

    /// Returns the primary key column, defaulting to `id`.
    pub fn pk_column(&self) -> &str {
        self.pk_field().map_or("id", |f| f.column.as_str())
    }

    /// Returns `true` if the primary key is a UUID.
    pub fn has_uuid_pk(&self) -> bool {
        self.pk_field()
            .is_some_and(|f| f.field_type == FieldType::UuidField)
    }

    /// Finds a field by attribute name or column name.
    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .or_else(|| self.fields.iter().find(|f| f.column == name))
    }

    /// Returns the attribute names of all fields.
    pub fn field_names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|f| f.name).collect()
    }
}

impl fmt::Debug for ModelMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelMeta")
            .field("key", &self.key())
            .field("db_table", &self.db_table)
            .field("fields", &self.field_names())
            .finish_non_exhaustive()
    }
}

/// The core trait for all models.
///
/// Field values are exchanged keyed by column name. [`Model::from_row`] has a
/// default implementation that feeds each column of the row through
/// [`Model::set_field`].
pub trait Model: Default + Send + Sync + 'static {
    /// Returns the static metadata for this model type.
    fn meta() -> &'static ModelMeta;

    /// Returns the primary key value, or `None` if unsaved.
    fn pk(&self) -> Option<Value>;

    /// Sets the primary key value on this instance (used after INSERT).
    fn set_pk(&mut self, value: Value);

    /// Returns all `(column, value)` pairs for this instance.
    fn field_values(&self) -> Vec<(&'static str, Value)>;

    /// Assigns a value read from the given column.
    fn set_field(&mut self, column: &str, value: &Value) -> EavResult<()>;

    /// Returns the key identifying this model.
    fn key() -> ModelKey {
        Self::meta().key()
    }

    /// Returns `(column, value)` pairs excluding the primary key.
    fn non_pk_field_values(&self) -> Vec<(&'static str, Value)> {
        let pk_column = Self::meta().pk_column();
        self.field_values()
            .into_iter()
            .filter(|(column, _)| *column != pk_column)
            .collect()
    }

    /// Constructs a model instance from a database row.
    fn from_row(row: &Row) -> EavResult<Self> {
        let mut instance = Self::default();
        for field in &Self::meta().fields {
            if let Some(value) = row.get_value(&field.column) {
                instance.set_field(&field.column, value)?;
            }
        }
        Ok(instance)
    }

    /// Returns the extension slots of this instance, if the model has any.
    fn slots(&self) -> Option<&Slots> {
        None
    }

    /// Returns the extension slots of this instance mutably.
    fn slots_mut(&mut self) -> Option<&mut Slots> {
        None
    }
}

/// Assigns `(field name, value)` pairs to an instance.
///
/// # Errors
///
/// Returns [`EavError::FieldDoesNotExist`] for names the model does not have.
pub fn assign_fields<M: Model>(instance: &mut M, values: &[(String, Value)]) -> EavResult<()> {
    let meta = M::meta();
    for (name, value) in values {
        let field = meta.get_field(name).ok_or_else(|| {
            EavError::FieldDoesNotExist(format!("{} has no field named '{name}'", meta.key()))
        })?;
        instance.set_field(&field.column, value)?;
    }
    Ok(())
}

/// Named, type-erased per-instance extension values.
///
/// Cloning produces an empty map and all slot maps compare equal, so slots
/// never affect a model's value semantics.
#[derive(Default)]
pub struct Slots {
    inner: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl Slots {
    /// Creates an empty slot map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value stored under `name` if it has type `T`.
    pub fn get<T: Any>(&self, name: &str) -> Option<&T> {
        self.inner.get(name).and_then(|b| (**b).downcast_ref::<T>())
    }

    /// Returns the value stored under `name` mutably if it has type `T`.
    pub fn get_mut<T: Any>(&mut self, name: &str) -> Option<&mut T> {
        self.inner
            .get_mut(name)
            .and_then(|b| (**b).downcast_mut::<T>())
    }

    /// Stores a value, replacing any previous one.
    pub fn insert<T: Any + Send + Sync>(&mut self, name: impl Into<String>, value: T) {
        self.inner.insert(name.into(), Box::new(value));
    }

    /// Removes the value stored under `name`.
    pub fn remove(&mut self, name: &str) -> bool {
        self.inner.remove(name).is_some()
    }

    /// Returns `true` if something is stored under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    /// Returns the occupied slot names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.inner.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Clone for Slots {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl PartialEq for Slots {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl fmt::Debug for Slots {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

/// Object-safe view of a model instance, used by signal receivers.
pub trait ModelInstance: Send + Sync {
    /// Returns the key of the instance's model.
    fn model_key(&self) -> ModelKey;
    /// Returns the instance's model metadata.
    fn model_meta(&self) -> &'static ModelMeta;
    /// Returns the primary key, or `None` if unsaved.
    fn pk_value(&self) -> Option<Value>;
    /// Returns the instance's extension slots.
    fn instance_slots(&self) -> Option<&Slots>;
    /// Returns the instance's extension slots mutably.
    fn instance_slots_mut(&mut self) -> Option<&mut Slots>;
    /// Upcasts for downcasting to the concrete model.
    fn as_any(&self) -> &dyn Any;
    /// Upcasts mutably for downcasting to the concrete model.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<M: Model> ModelInstance for M {
    fn model_key(&self) -> ModelKey {
        M::key()
    }

    fn model_meta(&self) -> &'static ModelMeta {
        M::meta()
    }

    fn pk_value(&self) -> Option<Value> {
        self.pk()
    }

    fn instance_slots(&self) -> Option<&Slots> {
        self.slots()
    }

    fn instance_slots_mut(&mut self) -> Option<&mut Slots> {
        self.slots_mut()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Note {
        id: Option<i64>,
        body: String,
        slots: Slots,
    }

    impl Model for Note {
        fn meta() -> &'static ModelMeta {
            static META: Lazy<ModelMeta> = Lazy::new(|| ModelMeta {
                app_label: "notes",
                model_name: "note",
                db_table: "notes_note".to_string(),
                verbose_name: "note".to_string(),
                ordering: vec![],
                fields: vec![
                    FieldDef::new("id", FieldType::AutoField).primary_key(),
                    FieldDef::new("body", FieldType::TextField),
                ],
                constraints: vec![],
            });
            &META
        }

        fn pk(&self) -> Option<Value> {
            self.id.map(Value::Int)
        }

        fn set_pk(&mut self, value: Value) {
            self.id = value.as_int();
        }

        fn field_values(&self) -> Vec<(&'static str, Value)> {
            vec![("id", Value::from(self.id)), ("body", Value::from(self.body.clone()))]
        }

        fn set_field(&mut self, column: &str, value: &Value) -> EavResult<()> {
            match column {
                "id" => self.id = crate::row::FromValue::from_value(value)?,
                "body" => self.body = crate::row::FromValue::from_value(value)?,
                _ => {}
            }
            Ok(())
        }

        fn slots(&self) -> Option<&Slots> {
            Some(&self.slots)
        }

        fn slots_mut(&mut self) -> Option<&mut Slots> {
            Some(&mut self.slots)
        }
    }

    #[test]
    fn test_meta_lookup() {
        let meta = Note::meta();
        assert_eq!(meta.key(), ModelKey::new("notes", "note"));
        assert_eq!(meta.pk_column(), "id");
        assert!(meta.get_field("body").is_some());
        assert!(meta.get_field("missing").is_none());
        assert!(!meta.has_uuid_pk());
    }

    #[test]
    fn test_from_row_uses_set_field() {
        let row = Row::new(
            vec!["id".into(), "body".into()],
            vec![Value::Int(3), Value::String("hi".into())],
        );
        let note = Note::from_row(&row).unwrap();
        assert_eq!(note.id, Some(3));
        assert_eq!(note.body, "hi");
    }

    #[test]
    fn test_non_pk_field_values() {
        let note = Note::default();
        let cols: Vec<&str> = note.non_pk_field_values().iter().map(|(c, _)| *c).collect();
        assert_eq!(cols, vec!["body"]);
    }

    #[test]
    fn test_assign_fields_unknown_name() {
        let mut note = Note::default();
        assign_fields(&mut note, &[("body".into(), Value::from("x"))]).unwrap();
        assert_eq!(note.body, "x");
        let err = assign_fields(&mut note, &[("title".into(), Value::from("x"))]).unwrap_err();
        assert!(matches!(err, EavError::FieldDoesNotExist(_)));
    }

    #[test]
    fn test_slots_typed_access() {
        let mut slots = Slots::new();
        slots.insert("counter", 5_u32);
        assert_eq!(slots.get::<u32>("counter"), Some(&5));
        assert!(slots.get::<String>("counter").is_none());
        *slots.get_mut::<u32>("counter").unwrap() += 1;
        assert_eq!(slots.get::<u32>("counter"), Some(&6));
        assert!(slots.remove("counter"));
        assert!(!slots.contains("counter"));
    }

    #[test]
    fn test_slots_do_not_affect_equality_or_clone() {
        let mut a = Note::default();
        a.slots.insert("x", 1_i32);
        let b = a.clone();
        assert!(b.slots.names().is_empty());
        assert_eq!(a, b);
    }

    #[test]
    fn test_model_instance_downcast() {
        let mut note = Note::default();
        let instance: &mut dyn ModelInstance = &mut note;
        assert_eq!(instance.model_key().to_string(), "notes.note");
        instance
            .instance_slots_mut()
            .unwrap()
            .insert("tag", "a".to_string());
        let back = instance.as_any().downcast_ref::<Note>().unwrap();
        assert_eq!(back.slots.get::<String>("tag").map(String::as_str), Some("a"));
    }
}
