//! Query expansion for registered models.
//!
//! Filters name attributes as if they were fields: `eav__age__gte`,
//! `eav__fever`, or across a relation to another registered model,
//! `patient__eav__age`. [`EavQueryExpander`] rewrites every such leaf into a
//! semijoin over the generic relation to the value table,
//!
//! ```text
//! eav__age__gte = 3
//!   => eav_values IN (SELECT id FROM eav_value
//!                     WHERE value_int >= 3 AND attribute_id = <age>)
//! ```
//!
//! and then merges sibling semijoins of one `AND` / `OR` node into a single
//! `pk IN (... INTERSECT ...)` / `pk IN (... UNION ...)` condition.
//! Everything else passes through untouched.

use std::sync::Arc;

use chrono::NaiveTime;
use eav_rs_core::{EavError, EavResult};
use eav_rs_db::query::lookups::parse_kwarg;
use eav_rs_db::{
    ContentType, Database, Lookup, ModelKey, OrderBy, Query, QueryExpander, QuerySet,
    SubQuery, Value as DbValue, Q,
};

use crate::config::EavConfig;
use crate::datatype::Datatype;
use crate::models::value::entity_column;
use crate::models::{Attribute, Value};
use crate::ordering;
use crate::registry::Registry;

/// The outcome of expanding one filter leaf.
#[derive(Debug)]
enum Expanded {
    /// A plain field lookup.
    Native(Q),
    /// A lookup on attribute values: the host matches if one of `values` is
    /// reachable through `relation`.
    Eav {
        relation: String,
        host: ModelKey,
        values: QuerySet<Value>,
    },
}

impl Expanded {
    fn into_q(self, db: &Database) -> EavResult<Q> {
        match self {
            Self::Native(q) => Ok(q),
            Self::Eav {
                relation, values, ..
            } => Ok(Q::filter(
                relation,
                Lookup::InQuery(Box::new(values.as_subquery(db, "id")?)),
            )),
        }
    }
}

/// Rewrites attribute filters and orderings of one registered model.
#[derive(Debug, Clone)]
pub struct EavQueryExpander {
    config: Arc<dyn EavConfig>,
    registry: Registry,
}

impl EavQueryExpander {
    /// Creates an expander for a model registered with `config`; `registry`
    /// resolves filters that cross into other registered models.
    pub fn new(config: Arc<dyn EavConfig>, registry: Registry) -> Self {
        Self { config, registry }
    }

    /// Expands one filter leaf of `model`, configured by `config`.
    fn expand_eav_filter(
        &self,
        db: &Database,
        model: ModelKey,
        config: &dyn EavConfig,
        field: &str,
        lookup: &Lookup,
    ) -> EavResult<Expanded> {
        let parts: Vec<&str> = field.split("__").collect();
        match parts.as_slice() {
            [prefix, slug, rest @ ..] if *prefix == config.eav_attr_name() => {
                let attribute = Attribute::get_by_slug(db, slug).map_err(|err| match err {
                    EavError::DoesNotExist(_) => EavError::AttributeNotFound {
                        model: model.to_string(),
                        slug: (*slug).to_string(),
                    },
                    other => other,
                })?;
                let (path, lookup) = value_lookup(attribute.datatype, rest, lookup);
                let values = Value::objects()
                    .filter(Q::filter(path, lookup) & Q::exact("attribute", attribute.saved_id()?));
                tracing::trace!(model = %model, attribute = %attribute.slug, "expanded attribute filter");
                Ok(Expanded::Eav {
                    relation: config.generic_relation_attr_name().to_string(),
                    host: model,
                    values,
                })
            }
            [relation, nested @ ..] if !nested.is_empty() => {
                let related = db.apps().related_model(model, relation);
                let related_config = related.and_then(|key| self.registry.config(key).map(|c| (key, c)));
                match related_config {
                    Some((related, related_config))
                        if nested[0] == related_config.eav_attr_name() =>
                    {
                        let inner = self.expand_eav_filter(
                            db,
                            related,
                            related_config.as_ref(),
                            &nested.join("__"),
                            lookup,
                        )?;
                        Ok(match inner {
                            Expanded::Eav {
                                relation: inner_relation,
                                host,
                                values,
                            } => Expanded::Eav {
                                relation: format!("{relation}__{inner_relation}"),
                                host,
                                values,
                            },
                            Expanded::Native(q) => Expanded::Native(q),
                        })
                    }
                    _ => Ok(Expanded::Native(Q::filter(field, lookup.clone()))),
                }
            }
            _ => Ok(Expanded::Native(Q::filter(field, lookup.clone()))),
        }
    }

    /// Expands every leaf of a filter tree.
    fn expand_q_filters(&self, db: &Database, model: ModelKey, q: &Q) -> EavResult<Q> {
        Ok(match q {
            Q::Filter { field, lookup } => self
                .expand_eav_filter(db, model, self.config.as_ref(), field, lookup)?
                .into_q(db)?,
            Q::And(children) => Q::And(
                children
                    .iter()
                    .map(|child| self.expand_q_filters(db, model, child))
                    .collect::<EavResult<_>>()?,
            ),
            Q::Or(children) => Q::Or(
                children
                    .iter()
                    .map(|child| self.expand_q_filters(db, model, child))
                    .collect::<EavResult<_>>()?,
            ),
            Q::Not(inner) => Q::Not(Box::new(self.expand_q_filters(db, model, inner)?)),
        })
    }

    /// Returns `true` for a value semijoin of the host, alone or as the
    /// only child of an `AND`.
    fn is_semijoin(&self, q: &Q) -> bool {
        match q {
            Q::Filter {
                field,
                lookup: Lookup::InQuery(_),
            } => field == self.config.generic_relation_attr_name() || field == "pk",
            Q::And(children) => matches!(children.as_slice(), [only] if self.is_semijoin(only)),
            _ => false,
        }
    }

    /// Merges sibling semijoins bottom-up. Negated subtrees are rewritten
    /// inside but never merged with their siblings.
    fn rewrite_q_expr(&self, model: ModelKey, q: Q) -> Q {
        match q {
            Q::And(children) => self.merge(model, children, false),
            Q::Or(children) => self.merge(model, children, true),
            Q::Not(inner) => Q::Not(Box::new(self.rewrite_q_expr(model, *inner))),
            leaf @ Q::Filter { .. } => leaf,
        }
    }

    fn merge(&self, model: ModelKey, children: Vec<Q>, union: bool) -> Q {
        let mut rest: Vec<Q> = children
            .into_iter()
            .map(|child| self.rewrite_q_expr(model, child))
            .collect();
        if rest.iter().filter(|child| self.is_semijoin(child)).count() >= 2 {
            let (semijoins, others): (Vec<Q>, Vec<Q>) =
                rest.into_iter().partition(|child| self.is_semijoin(child));
            rest = others;
            tracing::trace!(model = %model, count = semijoins.len(), union, "merging value semijoins");
            let members: Vec<SubQuery> = semijoins
                .into_iter()
                .map(|child| {
                    let mut query = Query::new(model);
                    query.add_filter(child);
                    query.select = vec!["pk".to_string()];
                    SubQuery::select(query)
                })
                .collect();
            let combined = if union {
                SubQuery::Union(members)
            } else {
                SubQuery::Intersect(members)
            };
            rest.push(Q::filter("pk", Lookup::InQuery(Box::new(combined))));
        }

        match (rest.len(), union) {
            (1, _) => rest.remove(0),
            (_, true) => Q::Or(rest),
            (_, false) => Q::And(rest),
        }
    }
}

impl QueryExpander for EavQueryExpander {
    fn expand_q(&self, db: &Database, model: ModelKey, q: &Q) -> EavResult<Q> {
        let expanded = self.expand_q_filters(db, model, q)?;
        Ok(self.rewrite_q_expr(model, expanded))
    }

    /// Expands keyword filters. Filters through the same relation are
    /// chained, so that one entity has to satisfy all of them.
    fn expand_kwargs(
        &self,
        db: &Database,
        model: ModelKey,
        kwargs: &[(String, DbValue)],
    ) -> EavResult<Q> {
        let mut natives = Vec::new();
        let mut chains: Vec<(String, ModelKey, QuerySet<Value>)> = Vec::new();

        for (index, (key, value)) in kwargs.iter().enumerate() {
            if kwargs[..index].iter().any(|(k, v)| k == key && v == value) {
                continue;
            }
            let (field, lookup) = parse_kwarg(key, value.clone())?;
            match self.expand_eav_filter(db, model, self.config.as_ref(), &field, &lookup)? {
                Expanded::Native(q) => natives.push(q),
                Expanded::Eav {
                    relation,
                    host,
                    values,
                } => match chains.iter_mut().find(|(r, _, _)| *r == relation) {
                    Some((_, previous_host, previous)) => {
                        let column = entity_column(db.apps().meta(*previous_host)?);
                        let content_type = ContentType::get_for_key(db, *previous_host)?.id_or_zero();
                        let entities = previous
                            .clone()
                            .filter(Q::exact("entity_ct", content_type))
                            .as_subquery(db, column)?;
                        *previous = values.filter(Q::filter(column, Lookup::InQuery(Box::new(entities))));
                        *previous_host = host;
                    }
                    None => chains.push((relation, host, values)),
                },
            }
        }

        for (relation, host, values) in chains {
            natives.push(
                Expanded::Eav {
                    relation,
                    host,
                    values,
                }
                .into_q(db)?,
            );
        }
        Ok(match natives.len() {
            1 => natives.remove(0),
            _ => Q::And(natives),
        })
    }

    fn check_ordering(&self, terms: &[OrderBy]) -> EavResult<()> {
        let prefix = self.config.eav_attr_name();
        for term in terms {
            let parts: Vec<&str> = term.column.split("__").collect();
            if parts.len() > 2 && parts[0] == prefix {
                return Err(EavError::NotSupported(
                    "EAV does not support ordering through foreign-key chains".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn expand_ordering(&self, db: &Database, query: &mut Query, terms: &[OrderBy]) -> EavResult<()> {
        ordering::apply(db, query, terms, self.config.as_ref())
    }
}

/// Returns the value-table path and lookup for a lookup on an attribute of
/// `datatype`, with `rest` the path segments after the slug.
fn value_lookup(datatype: Datatype, rest: &[&str], lookup: &Lookup) -> (String, Lookup) {
    let mut path = match datatype {
        Datatype::Enum if rest.is_empty() && names_label(lookup) => "value_enum__value".to_string(),
        other => other.value_field().to_string(),
    };
    for segment in rest {
        path.push_str("__");
        path.push_str(segment);
    }
    let lookup = match datatype {
        Datatype::Date => map_values(lookup, |value| match value {
            DbValue::Date(date) => DbValue::DateTime(date.and_time(NaiveTime::MIN)),
            other => other.clone(),
        }),
        _ => lookup.clone(),
    };
    (path, lookup)
}

/// Returns `true` if an enum lookup compares choice labels rather than ids.
fn names_label(lookup: &Lookup) -> bool {
    match lookup {
        Lookup::In(values) => values.iter().any(|v| matches!(v, DbValue::String(_))),
        Lookup::Contains(_)
        | Lookup::IContains(_)
        | Lookup::StartsWith(_)
        | Lookup::IStartsWith(_)
        | Lookup::EndsWith(_)
        | Lookup::IEndsWith(_) => true,
        other => other.value().is_some_and(|v| matches!(v, DbValue::String(_))),
    }
}

fn map_values(lookup: &Lookup, f: impl Fn(&DbValue) -> DbValue) -> Lookup {
    match lookup {
        Lookup::Exact(v) => Lookup::Exact(f(v)),
        Lookup::Gt(v) => Lookup::Gt(f(v)),
        Lookup::Gte(v) => Lookup::Gte(f(v)),
        Lookup::Lt(v) => Lookup::Lt(f(v)),
        Lookup::Lte(v) => Lookup::Lte(f(v)),
        Lookup::In(values) => Lookup::In(values.iter().map(&f).collect()),
        Lookup::Range(low, high) => Lookup::Range(f(low), f(high)),
        other => other.clone(),
    }
}
