//! The model registry of a [`Database`](crate::Database).
//!
//! [`Apps`] knows every registered model's metadata, the managers attached
//! to each model under an attribute name, and the generic relations that
//! have been added at runtime. The query compiler resolves `__` paths
//! through it.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use eav_rs_core::{EavError, EavResult};

use crate::fields::FieldDef;
use crate::model::{Model, ModelKey, ModelMeta};
use crate::query::manager::ModelManager;

/// A type-erased manager. Holds an `Arc<dyn ModelManager<M>>`.
pub type ManagerSlot = Arc<dyn Any + Send + Sync>;

/// A one-to-many relation from a host model to rows of another model that
/// point back through a (content type, object id) column pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericRelation {
    /// The attribute name on the host (e.g. `eav_values`).
    pub name: String,
    /// The model holding the pointing rows.
    pub related: ModelKey,
    /// The content type column on the related model.
    pub content_type_column: String,
    /// The object id column on the related model.
    pub object_id_column: String,
    /// The host model's content type id.
    pub content_type_id: i64,
    /// The name used to reach the host from the related model, if any.
    pub related_query_name: Option<String>,
}

/// One resolved segment of a `__` lookup path.
#[derive(Debug, Clone)]
pub enum PathStep {
    /// A concrete (non-relational) field.
    Field(&'static FieldDef),
    /// A forward foreign key.
    ForeignKey {
        /// The foreign key field on the current model.
        field: &'static FieldDef,
        /// The target model.
        target: &'static ModelMeta,
    },
    /// A reverse foreign key from another model pointing at this one.
    Reverse {
        /// The model that declares the foreign key.
        source: &'static ModelMeta,
        /// The foreign key field on `source`.
        field: &'static FieldDef,
    },
    /// A generic relation from this model to rows of another model.
    Generic {
        /// The relation.
        relation: GenericRelation,
        /// The related model.
        target: &'static ModelMeta,
    },
    /// A generic relation traversed backwards, from the related rows to the host.
    GenericReverse {
        /// The host model.
        host: &'static ModelMeta,
        /// The relation.
        relation: GenericRelation,
    },
}

impl PathStep {
    /// Returns the model reached by following this step, if it is a relation.
    pub fn related_model(&self) -> Option<ModelKey> {
        match self {
            Self::Field(_) => None,
            Self::ForeignKey { target, .. } => Some(target.key()),
            Self::Reverse { source, .. } => Some(source.key()),
            Self::Generic { target, .. } => Some(target.key()),
            Self::GenericReverse { host, .. } => Some(host.key()),
        }
    }

    /// Returns `true` for relations that can match several rows.
    pub const fn is_multi_valued(&self) -> bool {
        matches!(self, Self::Reverse { .. } | Self::Generic { .. })
    }
}

struct ModelEntry {
    meta: &'static ModelMeta,
    managers: HashMap<String, ManagerSlot>,
    relations: Vec<GenericRelation>,
}

/// Registry of models, managers, and runtime relations.
#[derive(Default)]
pub struct Apps {
    entries: RwLock<HashMap<ModelKey, ModelEntry>>,
}

impl Apps {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a model. Registering twice is a no-op.
    pub fn register<M: Model>(&self) {
        self.register_meta(M::meta());
    }

    /// Registers model metadata. Registering twice is a no-op.
    pub fn register_meta(&self, meta: &'static ModelMeta) {
        let mut entries = self.entries.write().expect("apps lock poisoned");
        entries.entry(meta.key()).or_insert_with(|| ModelEntry {
            meta,
            managers: HashMap::new(),
            relations: Vec::new(),
        });
    }

    /// Returns `true` if the model is registered.
    pub fn is_registered(&self, key: ModelKey) -> bool {
        self.entries
            .read()
            .expect("apps lock poisoned")
            .contains_key(&key)
    }

    /// Returns the keys of all registered models, sorted.
    pub fn models(&self) -> Vec<ModelKey> {
        let entries = self.entries.read().expect("apps lock poisoned");
        let mut keys: Vec<ModelKey> = entries.keys().copied().collect();
        keys.sort();
        keys
    }

    /// Returns a registered model's metadata.
    ///
    /// # Errors
    ///
    /// Returns [`EavError::ImproperlyConfigured`] for unregistered models.
    pub fn meta(&self, key: ModelKey) -> EavResult<&'static ModelMeta> {
        self.entries
            .read()
            .expect("apps lock poisoned")
            .get(&key)
            .map(|entry| entry.meta)
            .ok_or_else(|| not_installed(key))
    }

    // ── Managers ────────────────────────────────────────────────────────

    /// Installs a manager under `name`, returning the slot it replaced.
    ///
    /// # Errors
    ///
    /// Returns [`EavError::ImproperlyConfigured`] for unregistered models.
    pub fn set_manager<M: Model>(
        &self,
        name: &str,
        manager: Arc<dyn ModelManager<M>>,
    ) -> EavResult<Option<ManagerSlot>> {
        let slot: ManagerSlot = Arc::new(manager);
        self.set_manager_slot(M::key(), name, Some(slot))
    }

    /// Puts a previously taken slot back (or clears the name for `None`),
    /// returning the slot it replaced.
    ///
    /// # Errors
    ///
    /// Returns [`EavError::ImproperlyConfigured`] for unregistered models.
    pub fn set_manager_slot(
        &self,
        key: ModelKey,
        name: &str,
        slot: Option<ManagerSlot>,
    ) -> EavResult<Option<ManagerSlot>> {
        let mut entries = self.entries.write().expect("apps lock poisoned");
        let entry = entries.get_mut(&key).ok_or_else(|| not_installed(key))?;
        Ok(match slot {
            Some(slot) => entry.managers.insert(name.to_string(), slot),
            None => entry.managers.remove(name),
        })
    }

    /// Returns the manager installed under `name`.
    pub fn manager<M: Model>(&self, name: &str) -> Option<Arc<dyn ModelManager<M>>> {
        let entries = self.entries.read().expect("apps lock poisoned");
        let slot = entries.get(&M::key())?.managers.get(name)?;
        (**slot)
            .downcast_ref::<Arc<dyn ModelManager<M>>>()
            .cloned()
    }

    /// Returns the names of the managers installed on a model, sorted.
    pub fn manager_names(&self, key: ModelKey) -> Vec<String> {
        let entries = self.entries.read().expect("apps lock poisoned");
        let mut names: Vec<String> = entries
            .get(&key)
            .map(|entry| entry.managers.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    // ── Generic relations ──────────────────────────────────────────────

    /// Adds (or replaces, by name) a generic relation on a host model.
    ///
    /// # Errors
    ///
    /// Returns [`EavError::ImproperlyConfigured`] for unregistered models.
    pub fn add_generic_relation(&self, host: ModelKey, relation: GenericRelation) -> EavResult<()> {
        let mut entries = self.entries.write().expect("apps lock poisoned");
        let entry = entries.get_mut(&host).ok_or_else(|| not_installed(host))?;
        entry.relations.retain(|r| r.name != relation.name);
        entry.relations.push(relation);
        Ok(())
    }

    /// Removes a generic relation by name. Returns `true` if one was removed.
    pub fn remove_generic_relation(&self, host: ModelKey, name: &str) -> bool {
        let mut entries = self.entries.write().expect("apps lock poisoned");
        entries.get_mut(&host).is_some_and(|entry| {
            let before = entry.relations.len();
            entry.relations.retain(|r| r.name != name);
            entry.relations.len() != before
        })
    }

    /// Returns the generic relations declared on a host model.
    pub fn generic_relations(&self, host: ModelKey) -> Vec<GenericRelation> {
        self.entries
            .read()
            .expect("apps lock poisoned")
            .get(&host)
            .map(|entry| entry.relations.clone())
            .unwrap_or_default()
    }

    // ── Path resolution ────────────────────────────────────────────────

    /// Resolves one `__` segment on a model.
    ///
    /// Tries, in order: `pk`, concrete fields (by name or column), generic
    /// relations, reverse foreign keys, and reverse generic relations.
    ///
    /// # Errors
    ///
    /// Returns [`EavError::FieldDoesNotExist`] when nothing matches.
    pub fn resolve(&self, model: ModelKey, name: &str) -> EavResult<PathStep> {
        let entries = self.entries.read().expect("apps lock poisoned");
        let entry = entries.get(&model).ok_or_else(|| not_installed(model))?;
        let meta = entry.meta;

        let field = if name == "pk" {
            meta.pk_field()
        } else {
            meta.get_field(name)
        };
        if let Some(field) = field {
            return match field.related_model() {
                Some(to) => {
                    let target = entries.get(&to).ok_or_else(|| not_installed(to))?;
                    Ok(PathStep::ForeignKey {
                        field,
                        target: target.meta,
                    })
                }
                None => Ok(PathStep::Field(field)),
            };
        }

        if let Some(relation) = entry.relations.iter().find(|r| r.name == name) {
            let target = entries
                .get(&relation.related)
                .ok_or_else(|| not_installed(relation.related))?;
            return Ok(PathStep::Generic {
                relation: relation.clone(),
                target: target.meta,
            });
        }

        let mut sources: Vec<&ModelEntry> = entries.values().collect();
        sources.sort_by_key(|e| e.meta.key());

        for source in &sources {
            for field in &source.meta.fields {
                if reverse_name(source.meta, field, model).as_deref() == Some(name) {
                    return Ok(PathStep::Reverse {
                        source: source.meta,
                        field,
                    });
                }
            }
        }

        for host in &sources {
            if let Some(relation) = host.relations.iter().find(|r| {
                r.related == model && r.related_query_name.as_deref() == Some(name)
            }) {
                return Ok(PathStep::GenericReverse {
                    host: host.meta,
                    relation: relation.clone(),
                });
            }
        }

        let mut choices: Vec<String> = meta.fields.iter().map(|f| f.name.to_string()).collect();
        choices.extend(entry.relations.iter().map(|r| r.name.clone()));
        for source in &sources {
            for field in &source.meta.fields {
                if let Some(reverse) = reverse_name(source.meta, field, model) {
                    choices.push(reverse);
                }
            }
        }
        choices.sort();
        Err(EavError::FieldDoesNotExist(format!(
            "Cannot resolve keyword '{name}' into field on {model}. Choices are: {}",
            choices.join(", ")
        )))
    }

    /// Returns the model reached through relation `name`, if it is one.
    pub fn related_model(&self, model: ModelKey, name: &str) -> Option<ModelKey> {
        self.resolve(model, name)
            .ok()
            .and_then(|step| step.related_model())
    }
}

fn reverse_name(source: &ModelMeta, field: &FieldDef, target: ModelKey) -> Option<String> {
    match field.field_type {
        crate::fields::FieldType::ForeignKey {
            to, related_name, ..
        } if to == target => Some(related_name.unwrap_or(source.model_name).to_string()),
        _ => None,
    }
}

fn not_installed(key: ModelKey) -> EavError {
    EavError::ImproperlyConfigured(format!("Model {key} is not registered"))
}
