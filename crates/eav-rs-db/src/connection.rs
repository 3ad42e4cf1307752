//! The [`Database`] handle.
//!
//! A `Database` bundles a SQLite connection with everything that is scoped
//! to it: the model registry ([`Apps`]), lifecycle signals, the content type
//! cache, and a statement counter used by query-count assertions. It is a
//! cheap, clonable handle.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use eav_rs_core::{EavError, EavResult, EavSettings};

use crate::apps::Apps;
use crate::backends::SqliteBackend;
use crate::contenttypes::{ContentType, ContentTypeCache};
use crate::fields::FieldType;
use crate::model::{Model, ModelMeta};
use crate::query::compiler::{Query, SqlCompiler};
use crate::query::manager::{Manager, ModelManager};
use crate::row::Row;
use crate::signals::ModelSignals;
use crate::value::Value;

/// The attribute name of the manager installed by [`Database::create_table`].
pub const DEFAULT_MANAGER: &str = "objects";

struct DatabaseInner {
    backend: SqliteBackend,
    settings: EavSettings,
    apps: Apps,
    signals: ModelSignals,
    content_types: ContentTypeCache,
    query_count: AtomicUsize,
    atomic_depth: AtomicUsize,
}

/// A SQLite database together with its models, signals, and caches.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.inner.backend.path())
            .field("models", &self.inner.apps.models())
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Opens a database with default settings at `path` (or `:memory:`).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open(path: &str) -> EavResult<Self> {
        Self::open_with_settings(&EavSettings {
            database: path.to_string(),
            ..EavSettings::default()
        })
    }

    /// Opens a fresh in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn memory() -> EavResult<Self> {
        Self::open(":memory:")
    }

    /// Opens the database named by `settings.database`.
    ///
    /// The content type table is created on open.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open_with_settings(settings: &EavSettings) -> EavResult<Self> {
        let backend = SqliteBackend::open(&settings.database, settings.sqlite_foreign_keys)?;
        let db = Self {
            inner: Arc::new(DatabaseInner {
                backend,
                settings: settings.clone(),
                apps: Apps::new(),
                signals: ModelSignals::new(),
                content_types: ContentTypeCache::default(),
                query_count: AtomicUsize::new(0),
                atomic_depth: AtomicUsize::new(0),
            }),
        };
        db.create_table::<ContentType>()?;
        tracing::debug!(database = %settings.database, "database opened");
        Ok(db)
    }

    /// Returns the settings this database was opened with.
    pub fn settings(&self) -> &EavSettings {
        &self.inner.settings
    }

    /// Returns the model registry.
    pub fn apps(&self) -> &Apps {
        &self.inner.apps
    }

    /// Returns the lifecycle signals.
    pub fn signals(&self) -> &ModelSignals {
        &self.inner.signals
    }

    pub(crate) fn content_type_cache(&self) -> &ContentTypeCache {
        &self.inner.content_types
    }

    /// Returns `true` if both handles point at the same database.
    pub fn same_database(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ── Statements ──────────────────────────────────────────────────────

    /// Executes a statement and returns the number of affected rows.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn execute(&self, sql: &str, params: &[Value]) -> EavResult<usize> {
        self.record(sql, params);
        self.inner.backend.execute(sql, params)
    }

    /// Runs a query and returns all rows.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn query(&self, sql: &str, params: &[Value]) -> EavResult<Vec<Row>> {
        self.record(sql, params);
        self.inner.backend.query(sql, params)
    }

    /// Runs a query that must return exactly one row.
    ///
    /// # Errors
    ///
    /// Returns `DoesNotExist` or `MultipleObjectsReturned` on a wrong row count.
    pub fn query_one(&self, sql: &str, params: &[Value]) -> EavResult<Row> {
        let mut rows = self.query(sql, params)?;
        match rows.len() {
            0 => Err(EavError::DoesNotExist("No rows returned".to_string())),
            1 => Ok(rows.remove(0)),
            n => Err(EavError::MultipleObjectsReturned(format!(
                "Expected 1 row, got {n}"
            ))),
        }
    }

    /// Executes an INSERT and returns the new row id.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn insert_returning_id(&self, sql: &str, params: &[Value]) -> EavResult<i64> {
        self.record(sql, params);
        self.inner.backend.insert_returning_id(sql, params)
    }

    /// Executes parameterless statements. Not counted as queries.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn execute_batch(&self, sql: &str) -> EavResult<()> {
        tracing::trace!(target: "eav_rs_db::sql", sql, "batch");
        self.inner.backend.execute_batch(sql)
    }

    /// Compiles and runs a [`Query`].
    ///
    /// # Errors
    ///
    /// Propagates compilation and backend errors.
    pub fn select(&self, query: &Query) -> EavResult<Vec<Row>> {
        let (sql, params) = SqlCompiler::new(self.apps()).compile_select(query)?;
        self.query(&sql, &params)
    }

    fn record(&self, sql: &str, params: &[Value]) {
        self.inner.query_count.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(target: "eav_rs_db::sql", sql, params = ?params, "query");
    }

    /// Returns the number of statements executed so far.
    pub fn query_count(&self) -> usize {
        self.inner.query_count.load(Ordering::SeqCst)
    }

    // ── Atomic depth ────────────────────────────────────────────────────

    pub(crate) fn enter_atomic(&self) {
        self.inner.atomic_depth.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn exit_atomic(&self) {
        self.inner.atomic_depth.fetch_sub(1, Ordering::SeqCst);
    }

    /// Returns `true` while inside [`atomic`](crate::transactions::atomic).
    pub fn in_atomic_block(&self) -> bool {
        self.inner.atomic_depth.load(Ordering::SeqCst) > 0
    }

    // ── Models ──────────────────────────────────────────────────────────

    /// Registers a model without creating its table.
    pub fn register_model<M: Model>(&self) {
        self.apps().register::<M>();
    }

    /// Registers a model, installs its default manager, and creates its table.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn create_table<M: Model>(&self) -> EavResult<()> {
        let apps = self.apps();
        let fresh = !apps.is_registered(M::key());
        apps.register::<M>();
        if fresh || apps.manager::<M>(DEFAULT_MANAGER).is_none() {
            let manager: Arc<dyn ModelManager<M>> = Arc::new(Manager::<M>::new());
            apps.set_manager::<M>(DEFAULT_MANAGER, manager)?;
        }
        let sql = create_table_sql(M::meta(), apps);
        self.execute_batch(&sql)?;
        tracing::debug!(model = %M::key(), table = %M::meta().db_table, "table ready");
        Ok(())
    }

    /// Returns the default manager of a model.
    ///
    /// # Errors
    ///
    /// Returns [`EavError::ImproperlyConfigured`] if no manager is installed.
    pub fn manager<M: Model>(&self) -> EavResult<Arc<dyn ModelManager<M>>> {
        self.manager_named::<M>(DEFAULT_MANAGER)
    }

    /// Returns the manager installed under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`EavError::ImproperlyConfigured`] if no manager is installed.
    pub fn manager_named<M: Model>(&self, name: &str) -> EavResult<Arc<dyn ModelManager<M>>> {
        self.apps().manager::<M>(name).ok_or_else(|| {
            EavError::ImproperlyConfigured(format!(
                "{} has no manager named '{name}'",
                M::key()
            ))
        })
    }
}

/// Returns the `CREATE TABLE IF NOT EXISTS` statement for a model.
///
/// Foreign keys to models not yet registered in `apps` reference the
/// conventional `<app_label>_<model>` table name.
pub fn create_table_sql(meta: &ModelMeta, apps: &Apps) -> String {
    let mut parts: Vec<String> = meta.fields.iter().map(|f| f.column_sql()).collect();
    for field in &meta.fields {
        if let FieldType::ForeignKey { to, on_delete, .. } = &field.field_type {
            let target_table = apps.meta(*to).map_or_else(
                |_| format!("{}_{}", to.app_label, to.model),
                |target| target.db_table.clone(),
            );
            parts.push(format!(
                "FOREIGN KEY (\"{}\") REFERENCES \"{target_table}\" ON DELETE {}",
                field.column,
                on_delete.sql_action()
            ));
        }
    }
    parts.extend(meta.constraints.iter().map(|c| c.to_sql()));
    format!(
        "CREATE TABLE IF NOT EXISTS \"{}\" ({})",
        meta.db_table,
        parts.join(", ")
    )
}
