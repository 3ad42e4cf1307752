//! SQL query AST and compiler.
//!
//! This module defines the [`Query`] AST that represents a SELECT against one
//! model, and the [`SqlCompiler`] that translates it into parameterized
//! SQLite. Field paths use `__` notation and are resolved through the
//! [`Apps`] registry:
//!
//! - concrete fields compile to `"alias"."column"`;
//! - remaining segments after a JSON field become a `json_extract` key path;
//! - a forward foreign key followed by more segments becomes
//!   `fk IN (SELECT pk FROM target WHERE ...)`;
//! - reverse foreign keys and generic relations can match several rows, so
//!   every lookup across them compiles to an independent semijoin
//!   `pk IN (SELECT ... WHERE ...)` and never to a row-multiplying join.
//!
//! Inside `exclude()` clauses and under `Not`, nullable operands are guarded
//! with `IS NOT NULL` so that negation returns exactly the complement of the
//! positive filter.

use std::cell::Cell;

use eav_rs_core::{EavError, EavResult};

use super::expressions::Expression;
use super::lookups::{Lookup, Q};
use crate::apps::{Apps, PathStep};
use crate::fields::{FieldDef, FieldType};
use crate::model::{ModelKey, ModelMeta};
use crate::value::Value;

/// A column ordering direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// The field path or annotation alias to order by.
    pub column: String,
    /// Whether to sort in descending order.
    pub descending: bool,
}

impl OrderBy {
    /// Creates an ascending order.
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: false,
        }
    }

    /// Creates a descending order.
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
        }
    }

    /// Parses `"name"` or `"-name"`.
    ///
    /// ```
    /// use eav_rs_db::query::compiler::OrderBy;
    ///
    /// assert_eq!(OrderBy::parse("-eav__age"), OrderBy::desc("eav__age"));
    /// ```
    pub fn parse(term: &str) -> Self {
        term.strip_prefix('-')
            .map_or_else(|| Self::asc(term), Self::desc)
    }
}

/// One `filter()` or `exclude()` call.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    /// The condition.
    pub q: Q,
    /// `true` for `exclude()`.
    pub negated: bool,
}

impl Clause {
    /// Creates a clause.
    pub const fn new(q: Q, negated: bool) -> Self {
        Self { q, negated }
    }
}

/// The complete query AST representing a SELECT statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// The model being queried.
    pub model: ModelKey,
    /// Filter and exclude clauses, ANDed together.
    pub clauses: Vec<Clause>,
    /// Field paths to select. Empty selects every column of the model.
    pub select: Vec<String>,
    /// Named computed columns, in selection order.
    pub annotations: Vec<(String, Expression)>,
    /// ORDER BY terms. Empty falls back to the model's default ordering.
    pub order_by: Vec<OrderBy>,
    /// DISTINCT flag.
    pub distinct: bool,
    /// LIMIT.
    pub limit: Option<usize>,
    /// OFFSET.
    pub offset: Option<usize>,
}

impl Query {
    /// Creates a query returning every row of `model`.
    pub const fn new(model: ModelKey) -> Self {
        Self {
            model,
            clauses: Vec::new(),
            select: Vec::new(),
            annotations: Vec::new(),
            order_by: Vec::new(),
            distinct: false,
            limit: None,
            offset: None,
        }
    }

    /// Adds a `filter()` clause.
    pub fn add_filter(&mut self, q: Q) {
        self.clauses.push(Clause::new(q, false));
    }

    /// Adds an `exclude()` clause.
    pub fn add_exclude(&mut self, q: Q) {
        self.clauses.push(Clause::new(q, true));
    }

    /// Adds a named computed column.
    pub fn add_annotation(&mut self, alias: impl Into<String>, expression: Expression) {
        self.annotations.push((alias.into(), expression));
    }

    /// Returns `true` if an annotation with this alias exists.
    pub fn has_annotation(&self, alias: &str) -> bool {
        self.annotations.iter().any(|(a, _)| a == alias)
    }
}

/// A single-column row set used on the right-hand side of `IN`.
#[derive(Debug, Clone, PartialEq)]
pub enum SubQuery {
    /// A plain SELECT (its `select` should name exactly one column).
    Select(Box<Query>),
    /// Rows present in every member.
    Intersect(Vec<SubQuery>),
    /// Rows present in any member.
    Union(Vec<SubQuery>),
}

impl SubQuery {
    /// Wraps a query.
    pub fn select(query: Query) -> Self {
        Self::Select(Box::new(query))
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Position {
    Top,
    Nested,
}

/// Translates [`Query`] trees into SQLite with `?` placeholders.
///
/// Table aliases (`t0`, `t1`, ...) are unique across one compiled statement.
pub struct SqlCompiler<'a> {
    apps: &'a Apps,
    next_alias: Cell<usize>,
}

impl<'a> SqlCompiler<'a> {
    /// Creates a compiler resolving paths through `apps`.
    pub const fn new(apps: &'a Apps) -> Self {
        Self {
            apps,
            next_alias: Cell::new(0),
        }
    }

    fn alias(&self) -> String {
        let n = self.next_alias.get();
        self.next_alias.set(n + 1);
        format!("t{n}")
    }

    /// Compiles a SELECT query into SQL and parameters.
    ///
    /// # Errors
    ///
    /// Returns [`EavError::FieldDoesNotExist`] for unresolvable paths and
    /// [`EavError::NotSupported`] for lookups a field cannot take.
    pub fn compile_select(&self, query: &Query) -> EavResult<(String, Vec<Value>)> {
        let mut params = Vec::new();
        let sql = self.compile_query(query, Position::Top, &mut params)?;
        Ok((sql, params))
    }

    /// Compiles `SELECT COUNT(*)` over the rows `query` would return.
    ///
    /// # Errors
    ///
    /// Same as [`SqlCompiler::compile_select`].
    pub fn compile_count(&self, query: &Query) -> EavResult<(String, Vec<Value>)> {
        let mut params = Vec::new();
        let inner = self.compile_query(query, Position::Nested, &mut params)?;
        Ok((format!("SELECT COUNT(*) AS \"count\" FROM ({inner})"), params))
    }

    /// Compiles a sub-query into a single-column SELECT.
    ///
    /// # Errors
    ///
    /// Same as [`SqlCompiler::compile_select`].
    pub fn compile_subquery(&self, subquery: &SubQuery) -> EavResult<(String, Vec<Value>)> {
        let mut params = Vec::new();
        let sql = self.subquery_sql(subquery, &mut params)?;
        Ok((sql, params))
    }

    /// Compiles an INSERT statement.
    pub fn compile_insert(table: &str, fields: &[(&str, Value)]) -> (String, Vec<Value>) {
        if fields.is_empty() {
            return (format!("INSERT INTO \"{table}\" DEFAULT VALUES"), Vec::new());
        }
        let columns: Vec<String> = fields.iter().map(|(name, _)| quote(name)).collect();
        let placeholders = vec!["?"; fields.len()].join(", ");
        let sql = format!(
            "INSERT INTO \"{table}\" ({}) VALUES ({placeholders})",
            columns.join(", ")
        );
        (sql, fields.iter().map(|(_, v)| v.clone()).collect())
    }

    /// Compiles an UPDATE of one row by primary key.
    pub fn compile_update(
        table: &str,
        fields: &[(&str, Value)],
        pk_column: &str,
        pk: &Value,
    ) -> (String, Vec<Value>) {
        let set_parts: Vec<String> = fields
            .iter()
            .map(|(name, _)| format!("{} = ?", quote(name)))
            .collect();
        let mut params: Vec<Value> = fields.iter().map(|(_, v)| v.clone()).collect();
        params.push(pk.clone());
        let sql = format!(
            "UPDATE \"{table}\" SET {} WHERE {} = ?",
            set_parts.join(", "),
            quote(pk_column)
        );
        (sql, params)
    }

    /// Compiles a DELETE of one row by primary key.
    pub fn compile_delete(table: &str, pk_column: &str, pk: &Value) -> (String, Vec<Value>) {
        (
            format!("DELETE FROM \"{table}\" WHERE {} = ?", quote(pk_column)),
            vec![pk.clone()],
        )
    }

    // ── SELECT ──────────────────────────────────────────────────────────

    fn compile_query(
        &self,
        query: &Query,
        position: Position,
        params: &mut Vec<Value>,
    ) -> EavResult<String> {
        let meta = self.apps.meta(query.model)?;
        let alias = self.alias();
        let mut sql = String::from("SELECT ");
        if query.distinct {
            sql.push_str("DISTINCT ");
        }

        let mut columns = Vec::new();
        if query.select.is_empty() {
            columns.push(format!("\"{alias}\".*"));
        } else {
            for name in &query.select {
                let expr = self.scalar_path(meta, &alias, name, params)?;
                columns.push(format!("{expr} AS {}", quote(name)));
            }
        }
        for (name, expression) in &query.annotations {
            let expr = self.compile_expression(expression, meta, &alias, params)?;
            columns.push(format!("{expr} AS {}", quote(name)));
        }
        sql.push_str(&columns.join(", "));
        sql.push_str(&format!(" FROM \"{}\" AS \"{alias}\"", meta.db_table));

        if !query.clauses.is_empty() {
            let mut conditions = Vec::with_capacity(query.clauses.len());
            for clause in &query.clauses {
                let condition = self.compile_q(&clause.q, meta, &alias, clause.negated, params)?;
                conditions.push(if clause.negated {
                    format!("NOT ({condition})")
                } else {
                    condition
                });
            }
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        let paged = query.limit.is_some() || query.offset.is_some();
        let ordering: &[OrderBy] = match position {
            Position::Top if query.order_by.is_empty() => &meta.ordering,
            Position::Top => &query.order_by,
            Position::Nested if paged => &query.order_by,
            Position::Nested => &[],
        };
        if !ordering.is_empty() {
            let mut terms = Vec::with_capacity(ordering.len() + 1);
            for order in ordering {
                let expr = if query.has_annotation(&order.column) {
                    quote(&order.column)
                } else {
                    self.scalar_path(meta, &alias, &order.column, params)?
                };
                let dir = if order.descending { "DESC" } else { "ASC" };
                terms.push(format!("{expr} {dir}"));
            }
            let pk_name = meta.pk_field().map_or("id", |f| f.name);
            if !ordering
                .iter()
                .any(|o| o.column == "pk" || o.column == pk_name)
            {
                terms.push(format!("\"{alias}\".{} ASC", quote(meta.pk_column())));
            }
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }

        match (query.limit, query.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }
        Ok(sql)
    }

    fn subquery_sql(&self, subquery: &SubQuery, params: &mut Vec<Value>) -> EavResult<String> {
        match subquery {
            SubQuery::Select(query) => self.compile_query(query, Position::Nested, params),
            SubQuery::Intersect(members) => self.compound(members, "INTERSECT", params),
            SubQuery::Union(members) => self.compound(members, "UNION", params),
        }
    }

    fn compound(
        &self,
        members: &[SubQuery],
        operator: &str,
        params: &mut Vec<Value>,
    ) -> EavResult<String> {
        match members {
            [] => Ok("SELECT NULL WHERE 1 = 0".to_string()),
            [single] => self.subquery_sql(single, params),
            _ => {
                let mut parts = Vec::with_capacity(members.len());
                for member in members {
                    parts.push(format!("SELECT * FROM ({})", self.subquery_sql(member, params)?));
                }
                Ok(parts.join(&format!(" {operator} ")))
            }
        }
    }

    // ── WHERE ───────────────────────────────────────────────────────────

    fn compile_q(
        &self,
        q: &Q,
        meta: &'static ModelMeta,
        alias: &str,
        negated: bool,
        params: &mut Vec<Value>,
    ) -> EavResult<String> {
        match q {
            Q::Filter { field, lookup } => {
                let parts: Vec<&str> = field.split("__").collect();
                self.compile_path(meta, alias, &parts, lookup, negated, params)
            }
            Q::And(children) => self.connect(children, " AND ", "1 = 1", meta, alias, negated, params),
            Q::Or(children) => self.connect(children, " OR ", "1 = 0", meta, alias, negated, params),
            Q::Not(inner) => Ok(format!(
                "NOT ({})",
                self.compile_q(inner, meta, alias, true, params)?
            )),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn connect(
        &self,
        children: &[Q],
        connector: &str,
        empty: &str,
        meta: &'static ModelMeta,
        alias: &str,
        negated: bool,
        params: &mut Vec<Value>,
    ) -> EavResult<String> {
        match children {
            [] => Ok(empty.to_string()),
            [single] => self.compile_q(single, meta, alias, negated, params),
            _ => {
                let mut parts = Vec::with_capacity(children.len());
                for child in children {
                    parts.push(self.compile_q(child, meta, alias, negated, params)?);
                }
                Ok(format!("({})", parts.join(connector)))
            }
        }
    }

    fn compile_path(
        &self,
        meta: &'static ModelMeta,
        alias: &str,
        parts: &[&str],
        lookup: &Lookup,
        negated: bool,
        params: &mut Vec<Value>,
    ) -> EavResult<String> {
        let (first, rest) = parts
            .split_first()
            .ok_or_else(|| EavError::FieldDoesNotExist("Empty field path".to_string()))?;
        let step = self.apps.resolve(meta.key(), first)?;

        match step {
            PathStep::Field(field) => {
                let column = column_ref(alias, &field.column);
                if field.field_type == FieldType::JsonField {
                    return self.compile_json_lookup(&column, rest, lookup, negated, field.null, params);
                }
                if !rest.is_empty() {
                    return Err(unsupported_path(field, rest));
                }
                self.compile_lookup(&column, lookup, negated && field.null, params)
            }
            PathStep::ForeignKey { field, target } => {
                let column = column_ref(alias, &field.column);
                let target_pk = target.pk_field().map_or("id", |f| f.name);
                if rest.is_empty() || *rest == ["pk"] || *rest == [target_pk] {
                    return self.compile_lookup(&column, lookup, negated && field.null, params);
                }
                let sub = self.alias();
                let inner = self.compile_path(target, &sub, rest, lookup, false, params)?;
                let sql = format!(
                    "{column} IN (SELECT {} FROM \"{}\" AS \"{sub}\" WHERE {inner})",
                    column_ref(&sub, target.pk_column()),
                    target.db_table
                );
                Ok(if negated && field.null {
                    format!("({column} IS NOT NULL AND {sql})")
                } else {
                    sql
                })
            }
            PathStep::Reverse { source, field } => {
                let sub = self.alias();
                let inner = self.related_condition(source, &sub, rest, lookup, params)?;
                let fk = column_ref(&sub, &field.column);
                Ok(format!(
                    "{} IN (SELECT {fk} FROM \"{}\" AS \"{sub}\" WHERE {fk} IS NOT NULL AND {inner})",
                    column_ref(alias, meta.pk_column()),
                    source.db_table
                ))
            }
            PathStep::Generic { relation, target } => {
                let sub = self.alias();
                let inner = self.related_condition(target, &sub, rest, lookup, params)?;
                let object = column_ref(&sub, &relation.object_id_column);
                Ok(format!(
                    "{} IN (SELECT {object} FROM \"{}\" AS \"{sub}\" WHERE {} = {} AND {object} IS NOT NULL AND {inner})",
                    column_ref(alias, meta.pk_column()),
                    target.db_table,
                    column_ref(&sub, &relation.content_type_column),
                    relation.content_type_id
                ))
            }
            PathStep::GenericReverse { host, relation } => {
                let sub = self.alias();
                let inner = self.related_condition(host, &sub, rest, lookup, params)?;
                let object = column_ref(alias, &relation.object_id_column);
                Ok(format!(
                    "({} = {} AND {object} IS NOT NULL AND {object} IN (SELECT {} FROM \"{}\" AS \"{sub}\" WHERE {inner}))",
                    column_ref(alias, &relation.content_type_column),
                    relation.content_type_id,
                    column_ref(&sub, host.pk_column()),
                    host.db_table
                ))
            }
        }
    }

    /// The condition inside a relation's semijoin; an empty remainder
    /// compares the related row's primary key.
    fn related_condition(
        &self,
        related: &'static ModelMeta,
        alias: &str,
        rest: &[&str],
        lookup: &Lookup,
        params: &mut Vec<Value>,
    ) -> EavResult<String> {
        if rest.is_empty() {
            self.compile_lookup(&column_ref(alias, related.pk_column()), lookup, false, params)
        } else {
            self.compile_path(related, alias, rest, lookup, false, params)
        }
    }

    // ── Scalars ─────────────────────────────────────────────────────────

    /// Resolves a path that yields at most one value per row.
    fn scalar_path(
        &self,
        meta: &'static ModelMeta,
        alias: &str,
        path: &str,
        params: &mut Vec<Value>,
    ) -> EavResult<String> {
        let parts: Vec<&str> = path.split("__").collect();
        self.scalar_parts(meta, alias, &parts, params)
    }

    fn scalar_parts(
        &self,
        meta: &'static ModelMeta,
        alias: &str,
        parts: &[&str],
        params: &mut Vec<Value>,
    ) -> EavResult<String> {
        let (first, rest) = parts
            .split_first()
            .ok_or_else(|| EavError::FieldDoesNotExist("Empty field path".to_string()))?;
        match self.apps.resolve(meta.key(), first)? {
            PathStep::Field(field) => {
                let column = column_ref(alias, &field.column);
                if rest.is_empty() {
                    Ok(column)
                } else if field.field_type == FieldType::JsonField {
                    Ok(format!("json_extract({column}, {})", json_path_literal(rest)))
                } else {
                    Err(unsupported_path(field, rest))
                }
            }
            PathStep::ForeignKey { field, target } => {
                let column = column_ref(alias, &field.column);
                let target_pk = target.pk_field().map_or("id", |f| f.name);
                if rest.is_empty() || *rest == ["pk"] || *rest == [target_pk] {
                    return Ok(column);
                }
                let sub = self.alias();
                let inner = self.scalar_parts(target, &sub, rest, params)?;
                Ok(format!(
                    "(SELECT {inner} FROM \"{}\" AS \"{sub}\" WHERE {} = {column})",
                    target.db_table,
                    column_ref(&sub, target.pk_column())
                ))
            }
            _ => Err(EavError::NotSupported(format!(
                "'{}' spans a multi-valued relation and has no single value per {}",
                parts.join("__"),
                meta.key()
            ))),
        }
    }

    fn compile_expression(
        &self,
        expression: &Expression,
        meta: &'static ModelMeta,
        alias: &str,
        params: &mut Vec<Value>,
    ) -> EavResult<String> {
        match expression {
            Expression::Col(path) => self.scalar_path(meta, alias, path, params),
            Expression::Value(value) => {
                params.push(value.clone());
                Ok("?".to_string())
            }
            Expression::Case { whens, default } => {
                let mut sql = "CASE".to_string();
                for when in whens {
                    let condition = self.compile_q(&when.condition, meta, alias, false, params)?;
                    let then = self.compile_expression(&when.then, meta, alias, params)?;
                    sql.push_str(&format!(" WHEN {condition} THEN {then}"));
                }
                if let Some(default) = default {
                    let value = self.compile_expression(default, meta, alias, params)?;
                    sql.push_str(&format!(" ELSE {value}"));
                }
                sql.push_str(" END");
                Ok(sql)
            }
        }
    }
}

// ── Lookups ─────────────────────────────────────────────────────────────

fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn column_ref(alias: &str, column: &str) -> String {
    format!("\"{alias}\".{}", quote(column))
}

fn unsupported_path(field: &FieldDef, rest: &[&str]) -> EavError {
    EavError::FieldDoesNotExist(format!(
        "Unsupported lookup '{}' for {} field '{}'",
        rest.join("__"),
        field.field_type.sql_type(),
        field.name
    ))
}

/// Renders a JSON key path as a quoted SQL string literal.
fn json_path_literal(keys: &[&str]) -> String {
    let mut path = String::from("$");
    for key in keys {
        if !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit()) {
            path.push_str(&format!("[{key}]"));
        } else {
            path.push_str(&format!(".\"{}\"", key.replace('"', "\\\"")));
        }
    }
    format!("'{}'", path.replace('\'', "''"))
}

fn like_escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Converts a JSON scalar to the SQL value `json_extract` would return.
fn json_scalar(value: &Value) -> Option<Value> {
    match value {
        Value::Json(serde_json::Value::String(s)) => Some(Value::String(s.clone())),
        Value::Json(serde_json::Value::Bool(b)) => Some(Value::Int(i64::from(*b))),
        Value::Json(serde_json::Value::Number(n)) => Some(
            n.as_i64()
                .map_or_else(|| Value::Float(n.as_f64().unwrap_or_default()), Value::Int),
        ),
        Value::Json(serde_json::Value::Null) => Some(Value::Null),
        _ => None,
    }
}

fn bind(params: &mut Vec<Value>, value: Value) -> &'static str {
    params.push(value);
    "?"
}

fn guarded(cond: String, expr: &str, guard: bool) -> String {
    if guard {
        format!("({cond} AND {expr} IS NOT NULL)")
    } else {
        cond
    }
}

impl SqlCompiler<'_> {
    fn compile_json_lookup(
        &self,
        column: &str,
        keys: &[&str],
        lookup: &Lookup,
        negated: bool,
        nullable: bool,
        params: &mut Vec<Value>,
    ) -> EavResult<String> {
        if let Lookup::HasKey(key) = lookup {
            let mut path: Vec<&str> = keys.to_vec();
            path.push(key);
            return Ok(format!(
                "json_type({column}, {}) IS NOT NULL",
                json_path_literal(&path)
            ));
        }
        let expr = if keys.is_empty() {
            column.to_string()
        } else {
            format!("json_extract({column}, {})", json_path_literal(keys))
        };
        let guard = negated && (nullable || !keys.is_empty());
        match lookup {
            Lookup::Exact(value @ Value::Json(_)) => match json_scalar(value) {
                Some(scalar) => self.compile_lookup(&expr, &Lookup::Exact(scalar), guard, params),
                None => {
                    let cond = format!("json({expr}) = json({})", bind(params, value.clone()));
                    Ok(guarded(cond, &expr, guard))
                }
            },
            other => self.compile_lookup(&expr, other, guard, params),
        }
    }

    /// Compiles a single lookup against a scalar SQL expression.
    ///
    /// With `guard` set, the condition is false (rather than NULL) when the
    /// operand is NULL, so that wrapping it in `NOT` keeps NULL rows.
    fn compile_lookup(
        &self,
        expr: &str,
        lookup: &Lookup,
        guard: bool,
        params: &mut Vec<Value>,
    ) -> EavResult<String> {
        let cond = match lookup {
            Lookup::Exact(Value::Null) | Lookup::IsNull(true) => {
                return Ok(format!("{expr} IS NULL"));
            }
            Lookup::IsNull(false) => return Ok(format!("{expr} IS NOT NULL")),
            Lookup::HasKey(key) => {
                return Err(EavError::NotSupported(format!(
                    "has_key='{key}' needs a JSON field"
                )));
            }
            Lookup::Exact(value) => format!("{expr} = {}", bind(params, value.clone())),
            Lookup::IExact(value) => {
                format!("LOWER({expr}) = LOWER({})", bind(params, value.clone()))
            }
            Lookup::Contains(s) => format!("instr({expr}, {}) > 0", bind(params, Value::from(s.as_str()))),
            Lookup::StartsWith(s) => {
                format!("instr({expr}, {}) = 1", bind(params, Value::from(s.as_str())))
            }
            Lookup::EndsWith(s) if s.is_empty() => format!("{expr} IS NOT NULL"),
            Lookup::EndsWith(s) => {
                let len = bind(params, Value::from(s.as_str()));
                let value = bind(params, Value::from(s.as_str()));
                format!("substr({expr}, -length({len})) = {value}")
            }
            Lookup::IContains(s) => like(expr, params, format!("%{}%", like_escape(s))),
            Lookup::IStartsWith(s) => like(expr, params, format!("{}%", like_escape(s))),
            Lookup::IEndsWith(s) => like(expr, params, format!("%{}", like_escape(s))),
            Lookup::In(values) => {
                let marks: Vec<&str> = values
                    .iter()
                    .filter(|v| !v.is_null())
                    .map(|v| bind(params, v.clone()))
                    .collect();
                if marks.is_empty() {
                    "0 = 1".to_string()
                } else {
                    format!("{expr} IN ({})", marks.join(", "))
                }
            }
            Lookup::InQuery(subquery) => {
                format!("{expr} IN ({})", self.subquery_sql(subquery, params)?)
            }
            Lookup::Gt(value) => format!("{expr} > {}", bind(params, value.clone())),
            Lookup::Gte(value) => format!("{expr} >= {}", bind(params, value.clone())),
            Lookup::Lt(value) => format!("{expr} < {}", bind(params, value.clone())),
            Lookup::Lte(value) => format!("{expr} <= {}", bind(params, value.clone())),
            Lookup::Range(low, high) => {
                let low = bind(params, low.clone());
                let high = bind(params, high.clone());
                format!("{expr} BETWEEN {low} AND {high}")
            }
        };
        Ok(guarded(cond, expr, guard))
    }
}

fn like(expr: &str, params: &mut Vec<Value>, pattern: String) -> String {
    format!(
        "LOWER({expr}) LIKE LOWER({}) ESCAPE '\\'",
        bind(params, Value::String(pattern))
    )
}
