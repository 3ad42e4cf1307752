//! The per-instance entity proxy.
//!
//! Registration attaches an [`Entity`] to every instance of a model, in the
//! instance's slots under the configured name (`eav`). Assignments made
//! through [`Entity::set`] are buffered; the pre-save hook validates them and
//! the post-save hook writes them to the value table, both inside the
//! instance's save transaction.
//!
//! ```no_run
//! # use eav_rs::EntityAccess;
//! # use eav_rs_db::{save_model, Model};
//! # fn demo<M: Model>(db: &eav_rs_db::Database, mut patient: M) -> eav_rs_core::EavResult<()> {
//! patient.eav_mut()?.set("age", 3);
//! save_model(db, &mut patient)?;
//! assert_eq!(patient.eav()?.get(db, "age")?.as_int(), Some(3));
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use eav_rs_core::logging::entity_span;
use eav_rs_core::{EavError, EavResult, ValidationError};
use eav_rs_db::{atomic, Database, Model, Q};

use crate::attr_value::AttrValue;
use crate::config::{EavConfig, EntityContext, DEFAULT_EAV_ATTR};
use crate::models::value::{require_entity, EntityRef};
use crate::models::{Attribute, EntityKey, Value};

/// The attribute facade of one host instance.
pub struct Entity {
    context: EntityContext,
    config: Arc<dyn EavConfig>,
    buffer: BTreeMap<String, AttrValue>,
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("model", &self.context.model)
            .field("key", &self.context.key)
            .field("buffer", &self.buffer)
            .finish_non_exhaustive()
    }
}

impl Entity {
    /// Creates a proxy with an empty buffer.
    pub fn new(context: EntityContext, config: Arc<dyn EavConfig>) -> Self {
        Self {
            context,
            config,
            buffer: BTreeMap::new(),
        }
    }

    /// Returns the entity this proxy stands for.
    pub const fn context(&self) -> &EntityContext {
        &self.context
    }

    /// Updates the entity key, e.g. after the host row was inserted.
    pub fn bind(&mut self, key: Option<EntityKey>) {
        self.context.key = key;
    }

    fn entity_ref(&self) -> Option<EntityRef> {
        self.context.key.map(|key| EntityRef {
            content_type_id: self.context.content_type_id,
            key,
        })
    }

    fn model_label(&self) -> String {
        self.context.model.to_string()
    }

    // ── Buffer ──────────────────────────────────────────────────────────

    /// Buffers an assignment. Nothing is written until [`Entity::save`].
    pub fn set(&mut self, slug: impl Into<String>, value: impl Into<AttrValue>) -> &mut Self {
        self.buffer.insert(slug.into(), value.into());
        self
    }

    /// Returns the buffered assignments, by slug.
    pub const fn buffered(&self) -> &BTreeMap<String, AttrValue> {
        &self.buffer
    }

    // ── Attributes ──────────────────────────────────────────────────────

    /// Returns the attributes this entity exposes.
    ///
    /// # Errors
    ///
    /// Propagates query errors.
    pub fn get_all_attributes(&self, db: &Database) -> EavResult<Vec<Attribute>> {
        self.config
            .get_attributes(Some(&self.context))
            .execute_query(db)
    }

    /// Returns the slugs of the attributes this entity exposes.
    ///
    /// # Errors
    ///
    /// Propagates query errors.
    pub fn get_all_attribute_slugs(&self, db: &Database) -> EavResult<Vec<String>> {
        Ok(self
            .get_all_attributes(db)?
            .into_iter()
            .map(|attribute| attribute.slug)
            .collect())
    }

    /// Returns the exposed attribute with this slug.
    ///
    /// # Errors
    ///
    /// Returns [`EavError::AttributeNotFound`] if the slug is not exposed.
    pub fn get_attribute_by_slug(&self, db: &Database, slug: &str) -> EavResult<Attribute> {
        match self
            .config
            .get_attributes(Some(&self.context))
            .filter(Q::exact("slug", slug))
            .get_exec(db)
        {
            Err(EavError::DoesNotExist(_)) => Err(EavError::AttributeNotFound {
                model: self.model_label(),
                slug: slug.to_string(),
            }),
            other => other,
        }
    }

    /// Returns the stored row of an attribute, if there is one.
    ///
    /// # Errors
    ///
    /// Propagates query errors.
    pub fn get_value_by_attribute(
        &self,
        db: &Database,
        attribute: &Attribute,
    ) -> EavResult<Option<Value>> {
        let Some(entity) = self.entity_ref() else {
            return Ok(None);
        };
        Value::for_entity(&entity)
            .filter(Q::exact("attribute", attribute.id))
            .first_exec(db)
    }

    // ── Reads ───────────────────────────────────────────────────────────

    /// Reads an attribute: the buffered assignment if there is one, the
    /// stored value otherwise, and [`AttrValue::Null`] when neither exists.
    ///
    /// # Errors
    ///
    /// Returns [`EavError::AttributeNotFound`] for slugs the entity does
    /// not expose.
    pub fn get(&self, db: &Database, slug: &str) -> EavResult<AttrValue> {
        let attribute = self.get_attribute_by_slug(db, slug)?;
        if let Some(value) = self.buffer.get(slug) {
            return Ok(value.clone());
        }
        match self.get_value_by_attribute(db, &attribute)? {
            Some(row) => row
                .columns
                .to_attr(db, attribute.datatype, &db.settings().csv_separator),
            None => Ok(AttrValue::Null),
        }
    }

    /// Returns every stored row of this entity.
    ///
    /// # Errors
    ///
    /// Propagates query errors.
    pub fn get_values(&self, db: &Database) -> EavResult<Vec<Value>> {
        match self.entity_ref() {
            Some(entity) => Value::for_entity(&entity).execute_query(db),
            None => Ok(Vec::new()),
        }
    }

    /// Returns the stored values of this entity keyed by slug.
    ///
    /// # Errors
    ///
    /// Propagates query errors.
    pub fn get_values_dict(&self, db: &Database) -> EavResult<BTreeMap<String, AttrValue>> {
        let mut attributes: HashMap<i64, Attribute> = HashMap::new();
        let mut values = BTreeMap::new();
        for row in self.get_values(db)? {
            if !attributes.contains_key(&row.attribute_id) {
                attributes.insert(row.attribute_id, row.attribute(db)?);
            }
            if let Some(attribute) = attributes.get(&row.attribute_id) {
                let value = row.columns.to_attr(
                    db,
                    attribute.datatype,
                    &db.settings().csv_separator,
                )?;
                values.insert(attribute.slug.clone(), value);
            }
        }
        Ok(values)
    }

    // ── Validation and persistence ──────────────────────────────────────

    /// Validates the effective value of every exposed attribute.
    ///
    /// Buffered values are converted in place to their stored form (enum
    /// labels become [`EnumValue`](crate::models::EnumValue)s). The buffered
    /// value, or else the stored one, is then checked against the attribute
    /// unless empty. A required
    /// attribute without a value fails, as does any buffered slug the
    /// entity does not expose.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] keyed by slug, or
    /// [`EavError::IllegalAssignment`] naming the unexposed slugs.
    pub fn validate(&mut self, db: &Database) -> EavResult<()> {
        let span = entity_span(&self.model_label(), &self.key_label());
        let _guard = span.enter();

        let attributes = self.get_all_attributes(db)?;
        for attribute in &attributes {
            let value = match self.buffer.get(&attribute.slug) {
                Some(buffered) => {
                    let resolved = attribute.resolve_value(db, buffered)?;
                    self.buffer.insert(attribute.slug.clone(), resolved.clone());
                    resolved
                }
                None => match self.get_value_by_attribute(db, attribute)? {
                    Some(row) => row.columns.to_attr(
                        db,
                        attribute.datatype,
                        &db.settings().csv_separator,
                    )?,
                    None => AttrValue::Null,
                },
            };
            if !value.is_empty() {
                attribute.validate_value(db, &value)?;
            }
            if attribute.required && value.is_empty() {
                return Err(ValidationError::field(
                    attribute.slug.clone(),
                    ValidationError::new(
                        format!("{} EAV field cannot be blank", attribute.slug),
                        "required",
                    ),
                )
                .into());
            }
        }

        let mut illegal: Vec<String> = self
            .buffer
            .keys()
            .filter(|slug| !attributes.iter().any(|a| &a.slug == *slug))
            .cloned()
            .collect();
        if !illegal.is_empty() {
            illegal.sort();
            return Err(EavError::IllegalAssignment {
                model: self.model_label(),
                slugs: illegal,
            });
        }
        tracing::trace!("attributes valid");
        Ok(())
    }

    /// Writes every buffered assignment of an exposed attribute to the
    /// value table. Unbuffered attributes are left untouched. The buffer is
    /// kept, so later reads keep returning what was assigned.
    ///
    /// # Errors
    ///
    /// Returns an error for unsaved entities, unconvertible values, and
    /// database failures; nothing is written then.
    pub fn save(&mut self, db: &Database) -> EavResult<()> {
        let entity = require_entity(self.entity_ref(), &self.model_label())?;
        let span = entity_span(&self.model_label(), &entity.key.to_string());
        let _guard = span.enter();

        atomic(db, |db| {
            for attribute in self.get_all_attributes(db)? {
                if let Some(value) = self.buffer.get(&attribute.slug) {
                    attribute.save_value(db, &entity, value)?;
                }
            }
            Ok(())
        })
    }

    fn key_label(&self) -> String {
        self.context
            .key
            .map_or_else(|| "unsaved".to_string(), |key| key.to_string())
    }
}

/// Access to the entity proxy attached to a model instance.
pub trait EntityAccess {
    /// Returns the proxy attached under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`EavError::ImproperlyConfigured`] if no proxy is attached,
    /// i.e. the model is not registered or the instance was never
    /// initialized.
    fn entity(&self, name: &str) -> EavResult<&Entity>;

    /// Returns the proxy attached under `name` mutably.
    ///
    /// # Errors
    ///
    /// See [`EntityAccess::entity`].
    fn entity_mut(&mut self, name: &str) -> EavResult<&mut Entity>;

    /// Returns the proxy attached under the default name, `eav`.
    ///
    /// # Errors
    ///
    /// See [`EntityAccess::entity`].
    fn eav(&self) -> EavResult<&Entity> {
        self.entity(DEFAULT_EAV_ATTR)
    }

    /// Returns the proxy attached under the default name mutably.
    ///
    /// # Errors
    ///
    /// See [`EntityAccess::entity`].
    fn eav_mut(&mut self) -> EavResult<&mut Entity> {
        self.entity_mut(DEFAULT_EAV_ATTR)
    }
}

fn missing_proxy<M: Model>(name: &str) -> EavError {
    EavError::ImproperlyConfigured(format!(
        "{} instance has no entity proxy named '{name}'; register the model and initialize the instance",
        M::key()
    ))
}

impl<M: Model> EntityAccess for M {
    fn entity(&self, name: &str) -> EavResult<&Entity> {
        self.slots()
            .and_then(|slots| slots.get::<Entity>(name))
            .ok_or_else(|| missing_proxy::<M>(name))
    }

    fn entity_mut(&mut self, name: &str) -> EavResult<&mut Entity> {
        self.slots_mut()
            .and_then(|slots| slots.get_mut::<Entity>(name))
            .ok_or_else(|| missing_proxy::<M>(name))
    }
}

#[cfg(test)]
mod tests {
    use eav_rs_db::{ContentType, Model};
    use eav_rs_test::Patient;

    use super::*;
    use crate::config::Config;
    use crate::datatype::Datatype;
    use crate::models::{EnumGroup, EnumValue};
    use crate::testing::eav_db;

    fn entity(db: &Database, id: Option<i64>, config: Config) -> Entity {
        let content_type = ContentType::get_for_model::<Patient>(db).unwrap();
        Entity::new(
            EntityContext {
                model: Patient::key(),
                content_type_id: content_type.id_or_zero(),
                key: id.map(EntityKey::Int),
            },
            Arc::new(config),
        )
    }

    #[test]
    fn test_unset_reads_as_null() {
        let db = eav_db();
        Attribute::new("Age", Datatype::Int).create(&db).unwrap();
        let proxy = entity(&db, Some(1), Config::default());
        assert_eq!(proxy.get(&db, "age").unwrap(), AttrValue::Null);
    }

    #[test]
    fn test_unknown_slug_is_a_lookup_error() {
        let db = eav_db();
        let proxy = entity(&db, Some(1), Config::default());
        let err = proxy.get(&db, "height").unwrap_err();
        assert!(matches!(err, EavError::AttributeNotFound { ref slug, .. } if slug == "height"));
    }

    #[test]
    fn test_set_save_get() {
        let db = eav_db();
        Attribute::new("Age", Datatype::Int).create(&db).unwrap();
        Attribute::new("City", Datatype::Text).create(&db).unwrap();
        let mut proxy = entity(&db, Some(1), Config::default());
        proxy.set("age", 3).set("city", "Paris");
        assert_eq!(proxy.get(&db, "age").unwrap(), AttrValue::Int(3));
        assert!(proxy.get_values(&db).unwrap().is_empty());

        proxy.validate(&db).unwrap();
        proxy.save(&db).unwrap();
        assert_eq!(proxy.get_values(&db).unwrap().len(), 2);

        let fresh = entity(&db, Some(1), Config::default());
        assert_eq!(fresh.get(&db, "city").unwrap(), AttrValue::from("Paris"));
        let dict = fresh.get_values_dict(&db).unwrap();
        assert_eq!(dict.keys().collect::<Vec<_>>(), vec!["age", "city"]);
    }

    #[test]
    fn test_required_attribute() {
        let db = eav_db();
        Attribute::new("Age", Datatype::Int)
            .required(true)
            .create(&db)
            .unwrap();
        let mut proxy = entity(&db, None, Config::default());
        let err = proxy.validate(&db).unwrap_err();
        assert_eq!(err.to_string(), "Validation error: age: age EAV field cannot be blank");
        proxy.set("age", 4);
        proxy.validate(&db).unwrap();
    }

    #[test]
    fn test_illegal_assignment_names_the_slugs() {
        let db = eav_db();
        Attribute::new("Age", Datatype::Int).create(&db).unwrap();
        Attribute::new("City", Datatype::Text).create(&db).unwrap();
        let mut proxy = entity(&db, Some(1), Config::default().only_attributes(&["age"]));
        proxy.set("city", "Paris").set("nope", 1);
        match proxy.validate(&db).unwrap_err() {
            EavError::IllegalAssignment { slugs, .. } => assert_eq!(slugs, vec!["city", "nope"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_enum_labels_are_normalized() {
        let db = eav_db();
        let yes = EnumValue::create(&db, "yes").unwrap();
        let group = EnumGroup::create(&db, "Yes / No").unwrap();
        group.add_value(&db, &yes).unwrap();
        Attribute::new("Fever", Datatype::Enum)
            .enum_group(&group)
            .create(&db)
            .unwrap();
        let mut proxy = entity(&db, Some(1), Config::default());
        proxy.set("fever", "yes");
        proxy.validate(&db).unwrap();
        assert_eq!(proxy.get(&db, "fever").unwrap(), AttrValue::Enum(yes.clone()));
        proxy.save(&db).unwrap();
        let fresh = entity(&db, Some(1), Config::default());
        assert_eq!(fresh.get(&db, "fever").unwrap(), AttrValue::Enum(yes));
    }

    #[test]
    fn test_save_needs_a_key() {
        let db = eav_db();
        let mut proxy = entity(&db, None, Config::default());
        assert!(proxy.save(&db).is_err());
    }

    #[test]
    fn test_entity_access_without_proxy() {
        let patient = Patient::named("Anne");
        assert!(matches!(
            patient.eav().unwrap_err(),
            EavError::ImproperlyConfigured(_)
        ));
    }
}
