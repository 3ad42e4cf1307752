//! Ordering by attribute values.
//!
//! SQL cannot sort host rows by a value that lives in another table without
//! joining it, and the host query may be filtered arbitrarily. So each
//! `eav__<slug>` term is resolved up front: the values of the matching
//! entities are fetched in sorted order, ranked, and the host query orders
//! by a `CASE pk WHEN ... THEN rank END` annotation. Entities without a
//! value rank `NULL`, which sorts first ascending.

use std::collections::BTreeMap;

use eav_rs_core::{EavError, EavResult};
use eav_rs_db::{
    ContentType, Database, Expression, Lookup, Model, OrderBy, Query, SubQuery, Value as DbValue,
    When, Q,
};

use crate::config::EavConfig;
use crate::models::value::entity_column;
use crate::models::{Attribute, Value};

/// Applies `terms` to `query`, whose filters are already set.
pub(crate) fn apply(
    db: &Database,
    query: &mut Query,
    terms: &[OrderBy],
    config: &dyn EavConfig,
) -> EavResult<()> {
    let prefix = config.eav_attr_name();
    let mut order_by = Vec::with_capacity(terms.len());
    for (index, term) in terms.iter().enumerate() {
        match term.column.split_once("__") {
            Some((head, slug)) if head == prefix => {
                let alias = format!("__eav_rank_{index}");
                let rank = rank_expression(db, query, slug)?;
                query.add_annotation(alias.clone(), rank);
                order_by.push(OrderBy {
                    column: alias,
                    descending: term.descending,
                });
            }
            _ => order_by.push(term.clone()),
        }
    }
    query.order_by = order_by;
    Ok(())
}

fn rank_expression(db: &Database, query: &Query, slug: &str) -> EavResult<Expression> {
    let attribute = Attribute::get_by_slug(db, slug).map_err(|err| match err {
        EavError::DoesNotExist(_) => EavError::AttributeNotFound {
            model: query.model.to_string(),
            slug: slug.to_string(),
        },
        other => other,
    })?;
    let column = entity_column(db.apps().meta(query.model)?);
    let content_type = ContentType::get_for_key(db, query.model)?.id_or_zero();
    let value_column = attribute.datatype.value_field();

    let mut hosts = query.clone();
    hosts.select = vec!["pk".to_string()];
    hosts.annotations.clear();
    hosts.order_by.clear();
    hosts.limit = None;
    hosts.offset = None;

    let mut values = Query::new(Value::key());
    values.add_filter(
        Q::exact("attribute", attribute.saved_id()?)
            & Q::exact("entity_ct", content_type)
            & Q::filter(column, Lookup::InQuery(Box::new(SubQuery::select(hosts)))),
    );
    values.select = vec![column.to_string(), value_column.to_string()];
    values.order_by = vec![OrderBy::asc(value_column)];
    let rows = db.select(&values)?;

    // Dense ranks: equal values share a rank.
    let mut ranks: BTreeMap<i64, Vec<DbValue>> = BTreeMap::new();
    let mut previous: Option<DbValue> = None;
    let mut rank = 0_i64;
    for row in &rows {
        let key = row.get_by_index::<DbValue>(0)?;
        let value = row.get_by_index::<DbValue>(1)?;
        if previous.as_ref() != Some(&value) {
            rank += 1;
            previous = Some(value);
        }
        ranks.entry(rank).or_default().push(key);
    }
    tracing::debug!(
        model = %query.model,
        attribute = %attribute.slug,
        ranked = rows.len(),
        "ranked attribute values for ordering"
    );

    if ranks.is_empty() {
        return Ok(Expression::value(DbValue::Null));
    }
    let whens = ranks
        .into_iter()
        .map(|(rank, keys)| When::new(Q::filter("pk", Lookup::In(keys)), Expression::value(rank)))
        .collect();
    Ok(Expression::case(whens, None))
}
