//! Per-model EAV configuration.
//!
//! A registered model carries one [`EavConfig`]. It names the manager, the
//! entity proxy slot, and the generic relation to values, and decides which
//! attributes an entity exposes.
//!
//! ```
//! use eav_rs::config::{Config, EavConfig};
//!
//! let config = Config::default().eav_attr("extra").manager_attr("entities");
//! assert_eq!(config.eav_attr_name(), "extra");
//! assert_eq!(config.generic_relation_attr_name(), "eav_values");
//! ```

use std::fmt;
use std::sync::Arc;

use eav_rs_db::{Lookup, Model, ModelKey, QuerySet, Q, Value as DbValue};

use crate::models::{Attribute, EntityKey};

/// The manager name used unless configured otherwise.
pub const DEFAULT_MANAGER_ATTR: &str = "objects";
/// The entity proxy slot name used unless configured otherwise.
pub const DEFAULT_EAV_ATTR: &str = "eav";
/// The generic relation name used unless configured otherwise.
pub const DEFAULT_GENERIC_RELATION_ATTR: &str = "eav_values";

/// Identifies the entity an attribute set is requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityContext {
    /// The host model.
    pub model: ModelKey,
    /// The host model's content type.
    pub content_type_id: i64,
    /// The entity's key, `None` while it is unsaved.
    pub key: Option<EntityKey>,
}

/// The configuration policy of a registered model.
pub trait EavConfig: Send + Sync + fmt::Debug {
    /// The name the entity manager is installed under.
    fn manager_attr_name(&self) -> &str {
        DEFAULT_MANAGER_ATTR
    }

    /// Install only the manager; no proxy, hooks, or relation.
    fn manager_only(&self) -> bool {
        false
    }

    /// The slot the entity proxy is attached under, and the prefix of
    /// attribute filters (`eav__age`).
    fn eav_attr_name(&self) -> &str {
        DEFAULT_EAV_ATTR
    }

    /// The name of the generic relation from the model to its values.
    fn generic_relation_attr_name(&self) -> &str {
        DEFAULT_GENERIC_RELATION_ATTR
    }

    /// The name values use to reach their entity in filters. The model
    /// name when `None`.
    fn generic_relation_related_name(&self) -> Option<&str> {
        None
    }

    /// The attributes an entity exposes. All attributes by default.
    fn get_attributes(&self, entity: Option<&EntityContext>) -> QuerySet<Attribute> {
        let _ = entity;
        Attribute::objects()
    }
}

/// A model that declares its own configuration, for
/// [`Registry::register_model`](crate::Registry::register_model).
pub trait EavModel: Model {
    /// Returns the model's configuration.
    fn eav_config() -> Arc<dyn EavConfig> {
        Arc::new(Config::default())
    }
}

/// A plain, field-backed [`EavConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    manager_attr: String,
    manager_only: bool,
    eav_attr: String,
    generic_relation_attr: String,
    generic_relation_related_name: Option<String>,
    attribute_slugs: Option<Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            manager_attr: DEFAULT_MANAGER_ATTR.to_string(),
            manager_only: false,
            eav_attr: DEFAULT_EAV_ATTR.to_string(),
            generic_relation_attr: DEFAULT_GENERIC_RELATION_ATTR.to_string(),
            generic_relation_related_name: None,
            attribute_slugs: None,
        }
    }
}

impl Config {
    /// Sets the name the manager is attached under.
    #[must_use]
    pub fn manager_attr(mut self, name: impl Into<String>) -> Self {
        self.manager_attr = name.into();
        self
    }

    /// Attaches only the manager, without the entity proxy.
    #[must_use]
    pub const fn manager_only(mut self, manager_only: bool) -> Self {
        self.manager_only = manager_only;
        self
    }

    /// Sets the name the entity proxy is attached under.
    #[must_use]
    pub fn eav_attr(mut self, name: impl Into<String>) -> Self {
        self.eav_attr = name.into();
        self
    }

    /// Sets the name of the relation from the model to its values.
    #[must_use]
    pub fn generic_relation_attr(mut self, name: impl Into<String>) -> Self {
        self.generic_relation_attr = name.into();
        self
    }

    /// Sets the name values use to reach their entity in filters.
    #[must_use]
    pub fn generic_relation_related_name(mut self, name: impl Into<String>) -> Self {
        self.generic_relation_related_name = Some(name.into());
        self
    }

    /// Restricts the exposed attributes to the given slugs.
    #[must_use]
    pub fn only_attributes(mut self, slugs: &[&str]) -> Self {
        self.attribute_slugs = Some(slugs.iter().map(ToString::to_string).collect());
        self
    }

    /// Wraps the configuration for registration.
    pub fn into_arc(self) -> Arc<dyn EavConfig> {
        Arc::new(self)
    }
}

impl EavConfig for Config {
    fn manager_attr_name(&self) -> &str {
        &self.manager_attr
    }

    fn manager_only(&self) -> bool {
        self.manager_only
    }

    fn eav_attr_name(&self) -> &str {
        &self.eav_attr
    }

    fn generic_relation_attr_name(&self) -> &str {
        &self.generic_relation_attr
    }

    fn generic_relation_related_name(&self) -> Option<&str> {
        self.generic_relation_related_name.as_deref()
    }

    fn get_attributes(&self, _entity: Option<&EntityContext>) -> QuerySet<Attribute> {
        match &self.attribute_slugs {
            Some(slugs) => Attribute::objects().filter(Q::filter(
                "slug",
                Lookup::In(slugs.iter().map(|s| DbValue::from(s.as_str())).collect()),
            )),
            None => Attribute::objects(),
        }
    }
}
