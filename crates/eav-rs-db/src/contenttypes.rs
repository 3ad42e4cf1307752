//! Content types: a persisted id for every model.
//!
//! Generic relations point at rows of any model through a
//! (content type id, object id) pair. [`ContentType::get_for_model`] returns
//! the row for a model, creating it on first use, and caches the answer on
//! the [`Database`].

use std::collections::HashMap;
use std::sync::Mutex;

use eav_rs_core::{EavError, EavResult};
use once_cell::sync::Lazy;

use crate::connection::Database;
use crate::fields::{FieldDef, FieldType};
use crate::model::{Model, ModelKey, ModelMeta};
use crate::row::FromValue;
use crate::value::Value;

/// A persisted model identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentType {
    /// Row id; `None` until saved.
    pub id: Option<i64>,
    /// The model's application label.
    pub app_label: String,
    /// The model's lowercase name.
    pub model: String,
}

impl Model for ContentType {
    fn meta() -> &'static ModelMeta {
        static META: Lazy<ModelMeta> = Lazy::new(|| ModelMeta {
            app_label: "contenttypes",
            model_name: "contenttype",
            db_table: "contenttypes_contenttype".to_string(),
            verbose_name: "content type".to_string(),
            ordering: vec![],
            fields: vec![
                FieldDef::new("id", FieldType::AutoField).primary_key(),
                FieldDef::new("app_label", FieldType::CharField).max_length(100),
                FieldDef::new("model", FieldType::CharField).max_length(100),
            ],
            constraints: vec![Box::new(crate::constraints::UniqueConstraint::new(
                "contenttype_app_label_model_uniq",
                &["app_label", "model"],
            ))],
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
        vec![
            ("id", Value::from(self.id)),
            ("app_label", Value::from(self.app_label.as_str())),
            ("model", Value::from(self.model.as_str())),
        ]
    }

    fn set_field(&mut self, column: &str, value: &Value) -> EavResult<()> {
        match column {
            "id" => self.id = FromValue::from_value(value)?,
            "app_label" => self.app_label = FromValue::from_value(value)?,
            "model" => self.model = FromValue::from_value(value)?,
            _ => {}
        }
        Ok(())
    }
}

/// Per-database content type cache.
#[derive(Default)]
pub(crate) struct ContentTypeCache {
    by_key: Mutex<HashMap<(String, String), ContentType>>,
    by_id: Mutex<HashMap<i64, ContentType>>,
}

impl ContentTypeCache {
    fn get(&self, app_label: &str, model: &str) -> Option<ContentType> {
        self.by_key
            .lock()
            .expect("content type cache lock poisoned")
            .get(&(app_label.to_string(), model.to_string()))
            .cloned()
    }

    fn get_id(&self, id: i64) -> Option<ContentType> {
        self.by_id
            .lock()
            .expect("content type cache lock poisoned")
            .get(&id)
            .cloned()
    }

    fn put(&self, ct: &ContentType) {
        if let Some(id) = ct.id {
            self.by_key
                .lock()
                .expect("content type cache lock poisoned")
                .insert((ct.app_label.clone(), ct.model.clone()), ct.clone());
            self.by_id
                .lock()
                .expect("content type cache lock poisoned")
                .insert(id, ct.clone());
        }
    }

    fn clear(&self) {
        self.by_key
            .lock()
            .expect("content type cache lock poisoned")
            .clear();
        self.by_id
            .lock()
            .expect("content type cache lock poisoned")
            .clear();
    }
}

impl ContentType {
    /// Returns the content type of model `M`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub fn get_for_model<M: Model>(db: &Database) -> EavResult<Self> {
        Self::get_for_key(db, M::key())
    }

    /// Returns the content type for a model key, creating it if needed.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub fn get_for_key(db: &Database, key: ModelKey) -> EavResult<Self> {
        let cache = db.content_type_cache();
        if let Some(ct) = cache.get(key.app_label, key.model) {
            return Ok(ct);
        }

        let table = &Self::meta().db_table;
        let rows = db.query(
            &format!("SELECT * FROM \"{table}\" WHERE \"app_label\" = ? AND \"model\" = ?"),
            &[Value::from(key.app_label), Value::from(key.model)],
        )?;
        let ct = match rows.first() {
            Some(row) => Self::from_row(row)?,
            None => {
                let id = db.insert_returning_id(
                    &format!("INSERT INTO \"{table}\" (\"app_label\", \"model\") VALUES (?, ?)"),
                    &[Value::from(key.app_label), Value::from(key.model)],
                )?;
                tracing::debug!(model = %key, id, "content type created");
                Self {
                    id: Some(id),
                    app_label: key.app_label.to_string(),
                    model: key.model.to_string(),
                }
            }
        };
        cache.put(&ct);
        Ok(ct)
    }

    /// Returns the content type with the given id.
    ///
    /// # Errors
    ///
    /// Returns [`EavError::DoesNotExist`] for unknown ids.
    pub fn get_for_id(db: &Database, id: i64) -> EavResult<Self> {
        let cache = db.content_type_cache();
        if let Some(ct) = cache.get_id(id) {
            return Ok(ct);
        }
        let table = &Self::meta().db_table;
        let rows = db.query(
            &format!("SELECT * FROM \"{table}\" WHERE \"id\" = ?"),
            &[Value::Int(id)],
        )?;
        let row = rows
            .first()
            .ok_or_else(|| EavError::DoesNotExist(format!("ContentType with id {id}")))?;
        let ct = Self::from_row(row)?;
        cache.put(&ct);
        Ok(ct)
    }

    /// Empties the content type cache of `db`.
    pub fn clear_cache(db: &Database) {
        db.content_type_cache().clear();
    }

    /// Returns the row id, or 0 for an unsaved content type.
    pub fn id_or_zero(&self) -> i64 {
        self.id.unwrap_or(0)
    }

    /// Returns the registered model this content type names, if any.
    pub fn model_key(&self, db: &Database) -> Option<ModelKey> {
        db.apps()
            .models()
            .into_iter()
            .find(|k| k.app_label == self.app_label && k.model == self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_db, Author, Book};

    #[test]
    fn test_get_for_model_creates_once() {
        let db = test_db();
        let a = ContentType::get_for_model::<Author>(&db).unwrap();
        let b = ContentType::get_for_model::<Author>(&db).unwrap();
        assert_eq!(a, b);
        assert!(a.id.is_some());
        assert_ne!(a.id, ContentType::get_for_model::<Book>(&db).unwrap().id);
    }

    #[test]
    fn test_cache_hit_runs_no_query() {
        let db = test_db();
        ContentType::get_for_model::<Author>(&db).unwrap();
        let before = db.query_count();
        ContentType::get_for_model::<Author>(&db).unwrap();
        assert_eq!(db.query_count(), before);
    }

    #[test]
    fn test_clear_cache_reads_existing_row() {
        let db = test_db();
        let first = ContentType::get_for_model::<Author>(&db).unwrap();
        ContentType::clear_cache(&db);
        let again = ContentType::get_for_model::<Author>(&db).unwrap();
        assert_eq!(first.id, again.id);
    }

    #[test]
    fn test_get_for_id() {
        let db = test_db();
        let ct = ContentType::get_for_model::<Book>(&db).unwrap();
        ContentType::clear_cache(&db);
        let found = ContentType::get_for_id(&db, ct.id_or_zero()).unwrap();
        assert_eq!(found.model, "book");
        assert_eq!(found.model_key(&db), Some(Book::key()));
        assert!(matches!(
            ContentType::get_for_id(&db, 999).unwrap_err(),
            EavError::DoesNotExist(_)
        ));
    }
}
