//! Binding host models to EAV.
//!
//! [`Registry::register`] installs, per model: the [`EntityManager`] under
//! the configured manager name (keeping the manager it displaced), the
//! `post_init` / `pre_save` / `post_save` receivers driving the entity
//! proxy, and a generic relation from the model to its value rows.
//! [`Registry::unregister`] takes all of it back out.
//!
//! A registry is a cheap handle; clones share their state. Use one registry
//! per [`Database`].

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use eav_rs_core::{EavError, EavResult};
use eav_rs_db::{
    ContentType, Database, GenericRelation, ManagerSlot, Model, ModelKey, SignalContext,
    SignalReceiver,
};

use crate::config::{EavConfig, EavModel, EntityContext};
use crate::entity::Entity;
use crate::manager::EntityManager;
use crate::models::value::entity_column;
use crate::models::{self, EntityKey, Value};

struct Registration {
    config: Arc<dyn EavConfig>,
    content_type_id: i64,
    previous_manager: Option<ManagerSlot>,
}

/// The set of models registered with EAV.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<RwLock<HashMap<ModelKey, Registration>>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.registered_models()).finish()
    }
}

fn receiver_id(key: ModelKey) -> String {
    format!("eav:{key}")
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the model is registered.
    pub fn is_registered(&self, key: ModelKey) -> bool {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .contains_key(&key)
    }

    /// Returns the configuration of a registered model.
    pub fn config(&self, key: ModelKey) -> Option<Arc<dyn EavConfig>> {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .get(&key)
            .map(|registration| Arc::clone(&registration.config))
    }

    /// Returns the registered models, sorted.
    pub fn registered_models(&self) -> Vec<ModelKey> {
        let mut keys: Vec<ModelKey> = self
            .inner
            .read()
            .expect("registry lock poisoned")
            .keys()
            .copied()
            .collect();
        keys.sort_by_key(ToString::to_string);
        keys
    }

    /// Registers a model with its declared configuration.
    ///
    /// # Errors
    ///
    /// See [`Registry::register`].
    pub fn register_model<M: EavModel>(&self, db: &Database) -> EavResult<bool> {
        self.register::<M>(db, M::eav_config())
    }

    /// Registers a model. Returns `false`, changing nothing, if it is
    /// already registered; the first configuration stays in effect.
    ///
    /// # Errors
    ///
    /// Returns [`EavError::ImproperlyConfigured`] if the EAV tables are not
    /// installed, the model is unknown to the database, or the model has no
    /// slots to carry the entity proxy.
    pub fn register<M: Model>(&self, db: &Database, config: Arc<dyn EavConfig>) -> EavResult<bool> {
        let key = M::key();
        if self.is_registered(key) {
            tracing::debug!(model = %key, "already registered with eav");
            return Ok(false);
        }
        if !models::is_installed(db) {
            return Err(EavError::ImproperlyConfigured(
                "the EAV tables are not installed; call eav_rs::install first".to_string(),
            ));
        }
        if !db.apps().is_registered(key) {
            return Err(EavError::ImproperlyConfigured(format!(
                "cannot register {key} with eav: the model is not installed"
            )));
        }
        if !config.manager_only() && M::default().slots().is_none() {
            return Err(EavError::ImproperlyConfigured(format!(
                "cannot register {key} with eav: the model has no slots for the entity proxy"
            )));
        }

        let content_type_id = ContentType::get_for_model::<M>(db)?.id_or_zero();
        let manager = EntityManager::<M>::new(self.clone(), Arc::clone(&config));
        let previous_manager = db
            .apps()
            .set_manager::<M>(config.manager_attr_name(), Arc::new(manager))?;

        if !config.manager_only() {
            Self::attach_receivers(db, key, &config, content_type_id);
            let related_name = config
                .generic_relation_related_name()
                .unwrap_or(M::meta().model_name);
            db.apps().add_generic_relation(
                key,
                GenericRelation {
                    name: config.generic_relation_attr_name().to_string(),
                    related: Value::key(),
                    content_type_column: "entity_ct_id".to_string(),
                    object_id_column: entity_column(M::meta()).to_string(),
                    content_type_id,
                    related_query_name: Some(related_name.to_string()),
                },
            )?;
        }

        self.inner.write().expect("registry lock poisoned").insert(
            key,
            Registration {
                config,
                content_type_id,
                previous_manager,
            },
        );
        tracing::info!(model = %key, "registered with eav");
        Ok(true)
    }

    /// Unregisters a model, restoring the manager it displaced. Returns
    /// `false` if it was not registered.
    ///
    /// # Errors
    ///
    /// Returns [`EavError::ImproperlyConfigured`] if the model has vanished
    /// from the database's registry.
    pub fn unregister<M: Model>(&self, db: &Database) -> EavResult<bool> {
        let key = M::key();
        let Some(registration) = self
            .inner
            .write()
            .expect("registry lock poisoned")
            .remove(&key)
        else {
            return Ok(false);
        };

        let config = registration.config;
        db.apps().set_manager_slot(
            key,
            config.manager_attr_name(),
            registration.previous_manager,
        )?;
        if !config.manager_only() {
            db.signals().disconnect_all(&receiver_id(key));
            db.apps()
                .remove_generic_relation(key, config.generic_relation_attr_name());
        }
        tracing::info!(model = %key, content_type = registration.content_type_id, "unregistered from eav");
        Ok(true)
    }

    fn attach_receivers(
        db: &Database,
        key: ModelKey,
        config: &Arc<dyn EavConfig>,
        content_type_id: i64,
    ) {
        let id = receiver_id(key);
        let signals = db.signals();

        let attach: SignalReceiver = {
            let config = Arc::clone(config);
            Arc::new(move |ctx: &mut SignalContext<'_>| {
                let entity = Entity::new(context(ctx, content_type_id), Arc::clone(&config));
                if let Some(slots) = ctx.instance.instance_slots_mut() {
                    slots.insert(config.eav_attr_name(), entity);
                }
                Ok(())
            })
        };
        let validate: SignalReceiver = {
            let config = Arc::clone(config);
            Arc::new(move |ctx: &mut SignalContext<'_>| {
                let db = ctx.db;
                with_entity(ctx, &config, content_type_id, |entity| entity.validate(db))
            })
        };
        let save: SignalReceiver = {
            let config = Arc::clone(config);
            Arc::new(move |ctx: &mut SignalContext<'_>| {
                let db = ctx.db;
                with_entity(ctx, &config, content_type_id, |entity| entity.save(db))
            })
        };

        signals.post_init.connect(id.clone(), Some(key), attach);
        signals.pre_save.connect(id.clone(), Some(key), validate);
        signals.post_save.connect(id, Some(key), save);
    }
}

fn context(ctx: &SignalContext<'_>, content_type_id: i64) -> EntityContext {
    EntityContext {
        model: ctx.sender,
        content_type_id,
        key: ctx.instance.pk_value().as_ref().and_then(EntityKey::from_pk),
    }
}

/// Runs `f` on the instance's proxy, attaching a fresh one first if the
/// instance never went through `post_init`.
fn with_entity(
    ctx: &mut SignalContext<'_>,
    config: &Arc<dyn EavConfig>,
    content_type_id: i64,
    f: impl FnOnce(&mut Entity) -> EavResult<()>,
) -> EavResult<()> {
    let fresh = context(ctx, content_type_id);
    let name = config.eav_attr_name();
    let Some(slots) = ctx.instance.instance_slots_mut() else {
        return Ok(());
    };
    if !slots.contains(name) {
        slots.insert(name, Entity::new(fresh, Arc::clone(config)));
    }
    let entity = slots.get_mut::<Entity>(name).ok_or_else(|| {
        EavError::ImproperlyConfigured(format!(
            "slot '{name}' of {} holds something other than an entity proxy",
            fresh.model
        ))
    })?;
    entity.bind(fresh.key);
    f(entity)
}

#[cfg(test)]
mod tests {
    use eav_rs_db::{init_instance, save_model};
    use eav_rs_test::{Patient, RegisterTestModel};

    use super::*;
    use crate::config::Config;
    use crate::datatype::Datatype;
    use crate::entity::EntityAccess;
    use crate::models::Attribute;
    use crate::testing::eav_db;

    impl EavModel for RegisterTestModel {
        fn eav_config() -> Arc<dyn EavConfig> {
            Config::default().eav_attr("props").into_arc()
        }
    }

    #[test]
    fn test_register_model_uses_declared_config() {
        let db = eav_db();
        let registry = Registry::new();
        assert!(registry.register_model::<RegisterTestModel>(&db).unwrap());
        let config = registry.config(RegisterTestModel::key()).unwrap();
        assert_eq!(config.eav_attr_name(), "props");

        let mut instance = RegisterTestModel::default();
        init_instance(&db, &mut instance).unwrap();
        assert!(instance.entity("props").is_ok());
        assert!(instance.eav().is_err());
    }

    #[test]
    fn test_register_is_idempotent() {
        let db = eav_db();
        let registry = Registry::new();
        assert!(registry
            .register::<RegisterTestModel>(&db, Config::default().eav_attr("first").into_arc())
            .unwrap());
        assert!(!registry
            .register::<RegisterTestModel>(&db, Config::default().eav_attr("second").into_arc())
            .unwrap());
        let config = registry.config(RegisterTestModel::key()).unwrap();
        assert_eq!(config.eav_attr_name(), "first");
        assert_eq!(db.signals().post_save.receiver_count(), 1);
    }

    #[test]
    fn test_unregister_reverses_everything() {
        let db = eav_db();
        let registry = Registry::new();
        let key = RegisterTestModel::key();
        registry
            .register::<RegisterTestModel>(&db, Config::default().into_arc())
            .unwrap();
        assert_eq!(db.apps().generic_relations(key).len(), 1);

        assert!(registry.unregister::<RegisterTestModel>(&db).unwrap());
        assert!(!registry.unregister::<RegisterTestModel>(&db).unwrap());
        assert!(!registry.is_registered(key));
        assert!(db.apps().generic_relations(key).is_empty());
        assert_eq!(db.signals().pre_save.receiver_count(), 0);
        assert_eq!(db.signals().post_init.receiver_count(), 0);
    }

    #[test]
    fn test_manager_only_installs_just_the_manager() {
        let db = eav_db();
        let registry = Registry::new();
        registry
            .register::<RegisterTestModel>(&db, Config::default().manager_only(true).into_arc())
            .unwrap();
        assert!(db.apps().generic_relations(RegisterTestModel::key()).is_empty());
        assert_eq!(db.signals().post_save.receiver_count(), 0);
    }

    #[test]
    fn test_register_requires_installed_models() {
        let db = eav_rs_db::Database::memory().unwrap();
        let registry = Registry::new();
        let err = registry
            .register::<Patient>(&db, Config::default().into_arc())
            .unwrap_err();
        assert!(matches!(err, EavError::ImproperlyConfigured(_)));
    }

    #[test]
    fn test_hooks_drive_the_proxy() {
        let db = eav_db();
        let registry = Registry::new();
        registry
            .register::<Patient>(&db, Config::default().into_arc())
            .unwrap();
        Attribute::new("Age", Datatype::Int).create(&db).unwrap();

        let mut patient = Patient::named("Anne");
        init_instance(&db, &mut patient).unwrap();
        patient.eav_mut().unwrap().set("age", 3);
        save_model(&db, &mut patient).unwrap();

        let mut loaded = eav_rs_db::QuerySet::<Patient>::new()
            .execute_query(&db)
            .unwrap();
        assert_eq!(loaded.len(), 1);
        let loaded = loaded.remove(0);
        assert_eq!(loaded.eav().unwrap().get(&db, "age").unwrap().as_int(), Some(3));
    }

    #[test]
    fn test_invalid_value_aborts_the_host_save() {
        let db = eav_db();
        let registry = Registry::new();
        registry
            .register::<Patient>(&db, Config::default().into_arc())
            .unwrap();
        Attribute::new("Age", Datatype::Int).create(&db).unwrap();

        let mut patient = Patient::named("Bob");
        init_instance(&db, &mut patient).unwrap();
        patient.eav_mut().unwrap().set("age", "old");
        assert!(save_model(&db, &mut patient).unwrap_err().is_validation());
        assert_eq!(
            eav_rs_db::QuerySet::<Patient>::new().count_exec(&db).unwrap(),
            0
        );
    }
}
