//! Lazy, re-iterable query sets.
//!
//! A [`QuerySet`] records filters, exclusions and ordering without touching
//! the database. Nothing is resolved until a terminal `*_exec` method is
//! called with a [`Database`]; at that point any [`QueryExpander`] attached
//! by the model's manager rewrites the recorded conditions, the [`Query`] AST
//! is built, compiled, and run. The same query set can be evaluated any
//! number of times.
//!
//! # Examples
//!
//! ```
//! use eav_rs_db::kwargs;
//! use eav_rs_db::query::lookups::{Lookup, Q};
//! use eav_rs_db::query::queryset::QuerySet;
//! use eav_rs_db::ContentType;
//!
//! // Building a query set does not run anything.
//! let qs = QuerySet::<ContentType>::new()
//!     .filter(Q::filter("app_label", Lookup::StartsWith("ea".into())))
//!     .exclude_kwargs(kwargs! { "model" => "value" })
//!     .order_by(&["-model"]);
//! assert_eq!(qs.clone().limit(1).filter_count(), 2);
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use eav_rs_core::{EavError, EavResult};

use super::compiler::{OrderBy, Query, SqlCompiler, SubQuery};
use super::lookups::{Kwargs, Q};
use crate::connection::Database;
use crate::executor;
use crate::model::{Model, ModelKey};
use crate::row::Row;
use crate::transactions::atomic;
use crate::value::Value;

/// Rewrites recorded conditions and ordering right before a query runs.
///
/// Managers attach an expander to the query sets they hand out; the plain
/// [`Manager`](super::manager::Manager) attaches none.
pub trait QueryExpander: Send + Sync {
    /// Rewrites a boolean filter tree.
    ///
    /// # Errors
    ///
    /// Returns lookup errors for names that cannot be expanded.
    fn expand_q(&self, db: &Database, model: ModelKey, q: &Q) -> EavResult<Q>;

    /// Rewrites keyword filters into a filter tree.
    ///
    /// # Errors
    ///
    /// Returns lookup errors for names that cannot be expanded.
    fn expand_kwargs(&self, db: &Database, model: ModelKey, kwargs: &[(String, Value)])
        -> EavResult<Q>;

    /// Rejects ordering terms of an unsupported shape. Runs before any
    /// other expansion, so nothing is queried for a query set that cannot
    /// be ordered.
    ///
    /// # Errors
    ///
    /// Returns [`EavError::NotSupported`] for unsupported terms.
    fn check_ordering(&self, terms: &[OrderBy]) -> EavResult<()> {
        let _ = terms;
        Ok(())
    }

    /// Applies ordering terms to a query whose filters are already set.
    ///
    /// # Errors
    ///
    /// Returns an error for ordering terms the expander cannot handle.
    fn expand_ordering(&self, db: &Database, query: &mut Query, terms: &[OrderBy])
        -> EavResult<()>;
}

#[derive(Debug, Clone)]
enum PendingFilter {
    Q { q: Q, negated: bool },
    Kwargs { kwargs: Kwargs, negated: bool },
}

/// A lazy database query over model `M`.
pub struct QuerySet<M: Model> {
    model: ModelKey,
    filters: Vec<PendingFilter>,
    order_by: Option<Vec<OrderBy>>,
    distinct: bool,
    limit: Option<usize>,
    offset: Option<usize>,
    expander: Option<Arc<dyn QueryExpander>>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> Clone for QuerySet<M> {
    fn clone(&self) -> Self {
        Self {
            model: self.model,
            filters: self.filters.clone(),
            order_by: self.order_by.clone(),
            distinct: self.distinct,
            limit: self.limit,
            offset: self.offset,
            expander: self.expander.clone(),
            _model: PhantomData,
        }
    }
}

impl<M: Model> fmt::Debug for QuerySet<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySet")
            .field("model", &self.model)
            .field("filters", &self.filters)
            .field("order_by", &self.order_by)
            .field("expanded", &self.expander.is_some())
            .finish_non_exhaustive()
    }
}

impl<M: Model> Default for QuerySet<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Model> QuerySet<M> {
    /// Creates a query set over every row of `M`.
    pub fn new() -> Self {
        Self {
            model: M::key(),
            filters: Vec::new(),
            order_by: None,
            distinct: false,
            limit: None,
            offset: None,
            expander: None,
            _model: PhantomData,
        }
    }

    /// Creates a query set whose conditions are rewritten by `expander`.
    pub fn with_expander(expander: Arc<dyn QueryExpander>) -> Self {
        Self {
            expander: Some(expander),
            ..Self::new()
        }
    }

    /// Returns `true` if an expander is attached.
    pub fn is_expanded(&self) -> bool {
        self.expander.is_some()
    }

    // ── Building ────────────────────────────────────────────────────────

    /// Adds a filter condition.
    #[must_use]
    pub fn filter(mut self, q: Q) -> Self {
        self.filters.push(PendingFilter::Q { q, negated: false });
        self
    }

    /// Adds an exclusion condition.
    #[must_use]
    pub fn exclude(mut self, q: Q) -> Self {
        self.filters.push(PendingFilter::Q { q, negated: true });
        self
    }

    /// Adds keyword filters (`"name" => "Bob"`, `"eav__age__gte" => 3`).
    #[must_use]
    pub fn filter_kwargs(mut self, kwargs: Kwargs) -> Self {
        self.filters.push(PendingFilter::Kwargs {
            kwargs,
            negated: false,
        });
        self
    }

    /// Adds keyword exclusions.
    #[must_use]
    pub fn exclude_kwargs(mut self, kwargs: Kwargs) -> Self {
        self.filters.push(PendingFilter::Kwargs {
            kwargs,
            negated: true,
        });
        self
    }

    /// Replaces the ordering with `terms` (`"name"`, `"-eav__age"`).
    #[must_use]
    pub fn order_by(self, terms: &[&str]) -> Self {
        self.order_by_fields(terms.iter().map(|t| OrderBy::parse(t)).collect())
    }

    /// Replaces the ordering.
    #[must_use]
    pub fn order_by_fields(mut self, terms: Vec<OrderBy>) -> Self {
        self.order_by = Some(terms);
        self
    }

    /// Removes duplicate rows.
    #[must_use]
    pub const fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Limits the number of rows returned.
    #[must_use]
    pub const fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Skips the first `n` rows.
    #[must_use]
    pub const fn offset(mut self, n: usize) -> Self {
        self.offset = Some(n);
        self
    }

    /// Returns the number of recorded filter and exclude calls.
    pub fn filter_count(&self) -> usize {
        self.filters.len()
    }

    // ── Compilation ─────────────────────────────────────────────────────

    /// Builds the query AST, running the expander if one is attached.
    ///
    /// # Errors
    ///
    /// Returns expansion errors (unknown attributes, unsupported ordering).
    pub fn build_query(&self, db: &Database) -> EavResult<Query> {
        self.build(db, true)
    }

    fn build(&self, db: &Database, ordered: bool) -> EavResult<Query> {
        let mut query = Query::new(self.model);
        query.distinct = self.distinct;
        query.limit = self.limit;
        query.offset = self.offset;

        if ordered {
            if let (Some(terms), Some(expander)) = (&self.order_by, &self.expander) {
                expander.check_ordering(terms)?;
            }
        }

        for pending in &self.filters {
            let (q, negated) = match pending {
                PendingFilter::Q { q, negated } => match &self.expander {
                    Some(expander) => (expander.expand_q(db, self.model, q)?, *negated),
                    None => (q.clone(), *negated),
                },
                PendingFilter::Kwargs { kwargs, negated } => match &self.expander {
                    Some(expander) => (expander.expand_kwargs(db, self.model, kwargs)?, *negated),
                    None => (Q::from_kwargs(kwargs)?, *negated),
                },
            };
            if negated {
                query.add_exclude(q);
            } else {
                query.add_filter(q);
            }
        }

        if ordered {
            if let Some(terms) = &self.order_by {
                match &self.expander {
                    Some(expander) => expander.expand_ordering(db, &mut query, terms)?,
                    None => query.order_by.clone_from(terms),
                }
            }
        }
        Ok(query)
    }

    /// Returns the SQL and parameters this query set would run.
    ///
    /// # Errors
    ///
    /// Returns expansion and compilation errors.
    pub fn to_sql(&self, db: &Database) -> EavResult<(String, Vec<Value>)> {
        let query = self.build_query(db)?;
        SqlCompiler::new(db.apps()).compile_select(&query)
    }

    /// Returns a single-column sub-query over `column` of the matching rows.
    ///
    /// # Errors
    ///
    /// Returns expansion errors.
    pub fn as_subquery(&self, db: &Database, column: &str) -> EavResult<SubQuery> {
        let mut query = self.build(db, false)?;
        query.select = vec![column.to_string()];
        Ok(SubQuery::select(query))
    }

    // ── Execution ───────────────────────────────────────────────────────

    /// Executes the query and returns all matching model instances.
    ///
    /// Every instance goes through `post_init`.
    ///
    /// # Errors
    ///
    /// Returns expansion, compilation, and database errors.
    pub fn execute_query(&self, db: &Database) -> EavResult<Vec<M>> {
        let query = self.build_query(db)?;
        instances(db, &db.select(&query)?)
    }

    /// Returns the number of matching rows.
    ///
    /// # Errors
    ///
    /// Returns expansion, compilation, and database errors.
    pub fn count_exec(&self, db: &Database) -> EavResult<usize> {
        let query = self.build(db, false)?;
        let (sql, params) = SqlCompiler::new(db.apps()).compile_count(&query)?;
        let row = db.query_one(&sql, &params)?;
        let count: i64 = row.get_by_index(0)?;
        usize::try_from(count).map_err(|e| EavError::DatabaseError(e.to_string()))
    }

    /// Returns whether any row matches.
    ///
    /// # Errors
    ///
    /// Returns expansion, compilation, and database errors.
    pub fn exists_exec(&self, db: &Database) -> EavResult<bool> {
        let mut query = self.build(db, false)?;
        query.select = vec!["pk".to_string()];
        query.limit = Some(1);
        Ok(!db.select(&query)?.is_empty())
    }

    /// Returns the first matching instance, or `None`.
    ///
    /// Unordered query sets are ordered by primary key.
    ///
    /// # Errors
    ///
    /// Returns expansion, compilation, and database errors.
    pub fn first_exec(&self, db: &Database) -> EavResult<Option<M>> {
        let mut query = self.build_query(db)?;
        if query.order_by.is_empty() && M::meta().ordering.is_empty() {
            query.order_by = vec![OrderBy::asc("pk")];
        }
        query.limit = Some(1);
        Ok(instances(db, &db.select(&query)?)?.into_iter().next())
    }

    /// Returns the single matching instance.
    ///
    /// # Errors
    ///
    /// Returns [`EavError::DoesNotExist`] if nothing matches and
    /// [`EavError::MultipleObjectsReturned`] if several rows do.
    pub fn get_exec(&self, db: &Database) -> EavResult<M> {
        let query = self.build(db, false)?;
        let rows = db.select(&query)?;
        match rows.len() {
            0 => Err(EavError::DoesNotExist(format!(
                "{} matching query does not exist.",
                M::key()
            ))),
            1 => instances(db, &rows)?
                .pop()
                .ok_or_else(|| EavError::DoesNotExist(M::key().to_string())),
            n => Err(EavError::MultipleObjectsReturned(format!(
                "get() returned more than one {} -- it returned {n}!",
                M::key()
            ))),
        }
    }

    /// Returns the selected field paths of every matching row.
    ///
    /// # Errors
    ///
    /// Returns expansion, compilation, and database errors.
    pub fn values_list_exec(&self, db: &Database, fields: &[&str]) -> EavResult<Vec<Row>> {
        let mut query = self.build_query(db)?;
        query.select = fields.iter().map(ToString::to_string).collect();
        db.select(&query)
    }

    /// Returns one field path of every matching row.
    ///
    /// # Errors
    ///
    /// Returns expansion, compilation, and database errors.
    pub fn values_list_flat(&self, db: &Database, field: &str) -> EavResult<Vec<Value>> {
        self.values_list_exec(db, &[field])?
            .into_iter()
            .map(|row| row.get_by_index::<Value>(0))
            .collect()
    }

    /// Returns the primary keys of the matching rows.
    ///
    /// # Errors
    ///
    /// Returns expansion, compilation, and database errors.
    pub fn pks_exec(&self, db: &Database) -> EavResult<Vec<Value>> {
        self.values_list_flat(db, "pk")
    }

    /// Deletes every matching instance through
    /// [`delete_model`](crate::executor::delete_model), so that delete
    /// signals and generic relation cleanup run. Returns the number deleted.
    ///
    /// # Errors
    ///
    /// Returns the first error; the whole deletion is rolled back.
    pub fn delete_exec(&self, db: &Database) -> EavResult<usize> {
        atomic(db, |db| {
            let mut instances = self.execute_query(db)?;
            for instance in &mut instances {
                executor::delete_model(db, instance)?;
            }
            Ok(instances.len())
        })
    }
}

fn instances<M: Model>(db: &Database, rows: &[Row]) -> EavResult<Vec<M>> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let mut instance = M::from_row(row)?;
        executor::init_instance(db, &mut instance)?;
        out.push(instance);
    }
    Ok(out)
}
