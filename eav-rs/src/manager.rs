//! The entity manager installed on registered models.
//!
//! Query sets it hands out carry an [`EavQueryExpander`], so `eav__<slug>`
//! filters and orderings work like native ones. Creation accepts
//! `eav__<slug>` keys next to the model's own fields.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use eav_rs_core::EavResult;
use eav_rs_db::{
    assign_fields, atomic, create_instance, init_instance, save_model, Database, Model,
    ModelManager, QuerySet, Value as DbValue,
};

use crate::attr_value::AttrValue;
use crate::config::EavConfig;
use crate::entity::EntityAccess;
use crate::queryset::EavQueryExpander;
use crate::registry::Registry;

/// The manager of a registered model.
pub struct EntityManager<M: Model> {
    registry: Registry,
    config: Arc<dyn EavConfig>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> EntityManager<M> {
    /// Creates the manager of `M` under `config`.
    pub fn new(registry: Registry, config: Arc<dyn EavConfig>) -> Self {
        Self {
            registry,
            config,
            _model: PhantomData,
        }
    }

    fn expander(&self) -> EavQueryExpander {
        EavQueryExpander::new(Arc::clone(&self.config), self.registry.clone())
    }
}

impl<M: Model> fmt::Debug for EntityManager<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityManager")
            .field("model", &M::key())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<M: Model> ModelManager<M> for EntityManager<M> {
    fn get_queryset(&self) -> QuerySet<M> {
        QuerySet::with_expander(Arc::new(self.expander()))
    }

    /// Creates an instance, splitting `eav__<slug>` keys off into attribute
    /// assignments that are saved with it.
    fn create(&self, db: &Database, values: &[(String, DbValue)]) -> EavResult<M> {
        if self.config.manager_only() {
            return create_instance(db, values);
        }
        let prefix = format!("{}__", self.config.eav_attr_name());
        let (attributes, fields): (Vec<_>, Vec<_>) = values
            .iter()
            .cloned()
            .partition(|(key, _)| key.starts_with(&prefix));

        atomic(db, |db| {
            let mut instance = M::default();
            assign_fields(&mut instance, &fields)?;
            init_instance(db, &mut instance)?;
            let entity = instance.entity_mut(self.config.eav_attr_name())?;
            for (key, value) in &attributes {
                entity.set(&key[prefix.len()..], AttrValue::from_db(value));
            }
            save_model(db, &mut instance)?;
            Ok(instance)
        })
    }
}
