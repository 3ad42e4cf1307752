//! Model managers.
//!
//! A manager is the entry point for model-level operations, installed on a
//! model under an attribute name (`objects` by default) in the
//! [`Apps`](crate::apps::Apps) registry. [`ModelManager`] is object safe so
//! that libraries can swap a model's manager at runtime; [`Manager`] is the
//! plain implementation.

use std::fmt;
use std::marker::PhantomData;

use eav_rs_core::{EavError, EavResult};

use super::lookups::{has_lookup_suffix, Kwargs, Q};
use super::queryset::QuerySet;
use crate::connection::Database;
use crate::executor;
use crate::model::{assign_fields, Model};
use crate::transactions::atomic;
use crate::value::Value;

/// Model-level query and creation operations.
pub trait ModelManager<M: Model>: Send + Sync {
    /// Returns a fresh query set over all rows.
    fn get_queryset(&self) -> QuerySet<M>;

    /// Alias of [`ModelManager::get_queryset`].
    fn all(&self) -> QuerySet<M> {
        self.get_queryset()
    }

    /// Returns a query set with the given filter applied.
    fn filter(&self, q: Q) -> QuerySet<M> {
        self.get_queryset().filter(q)
    }

    /// Returns a query set with the given exclusion applied.
    fn exclude(&self, q: Q) -> QuerySet<M> {
        self.get_queryset().exclude(q)
    }

    /// Returns a query set with keyword filters applied.
    fn filter_kwargs(&self, kwargs: Kwargs) -> QuerySet<M> {
        self.get_queryset().filter_kwargs(kwargs)
    }

    /// Returns the single instance matching `kwargs`.
    ///
    /// # Errors
    ///
    /// Returns `DoesNotExist` or `MultipleObjectsReturned` on a wrong match count.
    fn get(&self, db: &Database, kwargs: Kwargs) -> EavResult<M> {
        self.filter_kwargs(kwargs).get_exec(db)
    }

    /// Creates and saves an instance from `(field, value)` pairs.
    ///
    /// # Errors
    ///
    /// Returns field, validation, and database errors.
    fn create(&self, db: &Database, values: &[(String, Value)]) -> EavResult<M> {
        create_instance(db, values)
    }

    /// Looks an instance up by `lookup`, creating it from `lookup` and
    /// `defaults` when nothing matches. Returns the instance and whether it
    /// was created.
    ///
    /// Keys carrying an explicit lookup (`name__startswith`) only take part
    /// in the lookup, not in creation. Runs atomically.
    ///
    /// # Errors
    ///
    /// Returns `MultipleObjectsReturned` if the lookup is ambiguous, and
    /// creation errors otherwise.
    fn get_or_create(
        &self,
        db: &Database,
        lookup: &[(String, Value)],
        defaults: &[(String, Value)],
    ) -> EavResult<(M, bool)> {
        atomic(db, |db| match self.filter_kwargs(lookup.to_vec()).get_exec(db) {
            Ok(instance) => Ok((instance, false)),
            Err(EavError::DoesNotExist(_)) => {
                let mut values: Kwargs = lookup
                    .iter()
                    .filter(|(key, _)| !has_lookup_suffix(key))
                    .cloned()
                    .collect();
                for (key, value) in defaults {
                    match values.iter_mut().find(|(k, _)| k == key) {
                        Some(slot) => slot.1 = value.clone(),
                        None => values.push((key.clone(), value.clone())),
                    }
                }
                Ok((self.create(db, &values)?, true))
            }
            Err(other) => Err(other),
        })
    }
}

/// Builds, initializes, and saves an instance from `(field, value)` pairs.
///
/// # Errors
///
/// Returns field, signal receiver, and database errors.
pub fn create_instance<M: Model>(db: &Database, values: &[(String, Value)]) -> EavResult<M> {
    let mut instance = M::default();
    assign_fields(&mut instance, values)?;
    executor::init_instance(db, &mut instance)?;
    executor::save_model(db, &mut instance)?;
    Ok(instance)
}

/// The default manager.
pub struct Manager<M: Model> {
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> Manager<M> {
    /// Creates a new manager.
    pub const fn new() -> Self {
        Self {
            _model: PhantomData,
        }
    }
}

impl<M: Model> Default for Manager<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Model> fmt::Debug for Manager<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Manager<{}>", M::key())
    }
}

impl<M: Model> ModelManager<M> for Manager<M> {
    fn get_queryset(&self) -> QuerySet<M> {
        QuerySet::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kwargs;
    use crate::testing::{test_db, Author, Book};

    #[test]
    fn test_create_assigns_and_saves() {
        let db = test_db();
        let author: Author = Manager::new()
            .create(&db, &kwargs! { "name" => "Ann", "age" => 30 })
            .unwrap();
        assert!(author.id.is_some());
        assert_eq!(Manager::<Author>::new().all().count_exec(&db).unwrap(), 1);
    }

    #[test]
    fn test_create_rejects_unknown_field() {
        let db = test_db();
        let err = Manager::<Author>::new()
            .create(&db, &kwargs! { "nickname" => "x" })
            .unwrap_err();
        assert!(matches!(err, EavError::FieldDoesNotExist(_)));
    }

    #[test]
    fn test_get_or_create() {
        let db = test_db();
        let manager = Manager::<Author>::new();
        let (first, created) = manager
            .get_or_create(&db, &kwargs! { "name" => "Ann" }, &kwargs! { "age" => 7 })
            .unwrap();
        assert!(created);
        assert_eq!(first.age, Some(7));

        let (again, created) = manager
            .get_or_create(&db, &kwargs! { "name" => "Ann" }, &kwargs! { "age" => 9 })
            .unwrap();
        assert!(!created);
        assert_eq!(again.id, first.id);
        assert_eq!(again.age, Some(7));
    }

    #[test]
    fn test_get_or_create_drops_lookup_suffixes() {
        let db = test_db();
        let (author, created) = Manager::<Author>::new()
            .get_or_create(
                &db,
                &kwargs! { "name" => "Bob", "age__gte" => 50 },
                &kwargs! {},
            )
            .unwrap();
        assert!(created);
        assert_eq!(author.name, "Bob");
        assert_eq!(author.age, None);
    }

    #[test]
    fn test_get_or_create_multiple() {
        let db = test_db();
        let manager = Manager::<Book>::new();
        manager.create(&db, &kwargs! { "title" => "A" }).unwrap();
        manager.create(&db, &kwargs! { "title" => "A" }).unwrap();
        let err = manager
            .get_or_create(&db, &kwargs! { "title" => "A" }, &kwargs! {})
            .unwrap_err();
        assert!(matches!(err, EavError::MultipleObjectsReturned(_)));
    }

    #[test]
    fn test_manager_via_database() {
        let db = test_db();
        let manager = db.manager::<Author>().unwrap();
        manager.create(&db, &kwargs! { "name" => "Cid" }).unwrap();
        assert_eq!(manager.get(&db, kwargs! { "name" => "Cid" }).unwrap().name, "Cid");
    }
}
