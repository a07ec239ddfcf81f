//! The in-memory query pipeline.
//!
//! Sources expand to a cartesian product, joins run in declaration order,
//! then filter, grouping, having, ordering, projection, distinct, and the
//! offset/limit window. Subqueries re-enter [`run_query`] with the same
//! table snapshot and parameters.

use std::cmp::Ordering;

use relq_model::{Direction, NullPlacement, Value};

use super::eval::{compare_values, eval, values_equal, EvalContext, JoinedRow, Scope};
use super::{ExecutorError, Row};
use crate::translate::{OrderKey, ScalarOp, TranslatedJoinKind, TranslatedQuery};

pub(crate) fn run_query(
    ctx: &EvalContext<'_>,
    query: &TranslatedQuery,
) -> Result<Vec<Row>, ExecutorError> {
    let mut working: Vec<JoinedRow> = vec![JoinedRow::new()];
    for source in &query.sources {
        let table = ctx.table(&source.entity);
        let mut next = Vec::new();
        for row in &working {
            for stored in table {
                let mut combined = row.clone();
                combined.insert(source.alias.clone(), Some(stored.clone()));
                next.push(combined);
            }
        }
        working = next;
    }

    for join in &query.joins {
        let table = ctx.table(&join.target.entity);
        let mut next = Vec::new();
        for row in &working {
            let mut matched = false;
            for stored in table {
                let mut combined = row.clone();
                combined.insert(join.target.alias.clone(), Some(stored.clone()));
                if truthy(eval(ctx, Scope::Row(&combined), &join.on)?) {
                    next.push(combined);
                    matched = true;
                }
            }
            if !matched && join.kind == TranslatedJoinKind::LeftOuter {
                let mut combined = row.clone();
                combined.insert(join.target.alias.clone(), None);
                next.push(combined);
            }
        }
        working = next;
    }

    if let Some(filter) = &query.filter {
        let mut kept = Vec::new();
        for row in working {
            if truthy(eval(ctx, Scope::Row(&row), filter)?) {
                kept.push(row);
            }
        }
        working = kept;
    }

    let grouped = !query.group_by.is_empty() || query.projection.iter().any(has_aggregate);

    // Each entry is a projected row plus its ordering key values.
    let mut computed: Vec<(Row, Vec<Value>)> = Vec::new();
    if grouped {
        for members in partition(ctx, &working, &query.group_by)? {
            if let Some(having) = &query.having {
                if !truthy(eval(ctx, Scope::Group(&members), having)?) {
                    continue;
                }
            }
            let scope = Scope::Group(&members);
            computed.push((
                project(ctx, scope, &query.projection)?,
                order_values(ctx, scope, &query.order_by)?,
            ));
        }
    } else {
        for row in &working {
            let scope = Scope::Row(row);
            computed.push((
                project(ctx, scope, &query.projection)?,
                order_values(ctx, scope, &query.order_by)?,
            ));
        }
    }

    if !query.order_by.is_empty() {
        // sort_by is stable, so ties keep their pre-sort order.
        computed.sort_by(|a, b| compare_order_values(&a.1, &b.1, &query.order_by));
    }

    let mut rows: Vec<Row> = computed.into_iter().map(|(row, _)| row).collect();

    if query.distinct {
        let mut seen: Vec<Row> = Vec::new();
        rows.retain(|row| {
            if seen.iter().any(|kept| rows_equal(kept, row)) {
                false
            } else {
                seen.push(row.clone());
                true
            }
        });
    }

    if let Some(offset) = query.offset {
        let skip = (offset as usize).min(rows.len());
        rows = rows.split_off(skip);
    }
    if let Some(limit) = query.limit {
        rows.truncate(limit as usize);
    }

    Ok(rows)
}

/// Split rows into groups by key values. No keys means one global group,
/// present even when the input is empty so global aggregates still yield a
/// row.
fn partition(
    ctx: &EvalContext<'_>,
    rows: &[JoinedRow],
    keys: &[ScalarOp],
) -> Result<Vec<Vec<JoinedRow>>, ExecutorError> {
    if keys.is_empty() {
        return Ok(vec![rows.to_vec()]);
    }
    let mut groups: Vec<(Vec<Value>, Vec<JoinedRow>)> = Vec::new();
    for row in rows {
        let key = keys
            .iter()
            .map(|k| eval(ctx, Scope::Row(row), k))
            .collect::<Result<Vec<_>, _>>()?;
        match groups.iter_mut().find(|(k, _)| keys_equal(k, &key)) {
            Some((_, members)) => members.push(row.clone()),
            None => groups.push((key, vec![row.clone()])),
        }
    }
    Ok(groups.into_iter().map(|(_, members)| members).collect())
}

fn project(
    ctx: &EvalContext<'_>,
    scope: Scope<'_>,
    projection: &[ScalarOp],
) -> Result<Row, ExecutorError> {
    projection.iter().map(|op| eval(ctx, scope, op)).collect()
}

fn order_values(
    ctx: &EvalContext<'_>,
    scope: Scope<'_>,
    keys: &[OrderKey],
) -> Result<Vec<Value>, ExecutorError> {
    keys.iter().map(|key| eval(ctx, scope, &key.expr)).collect()
}

fn compare_order_values(a: &[Value], b: &[Value], keys: &[OrderKey]) -> Ordering {
    for (index, key) in keys.iter().enumerate() {
        let left = a.get(index).unwrap_or(&Value::Null);
        let right = b.get(index).unwrap_or(&Value::Null);
        let ordering = match (left.is_null(), right.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => null_ordering(key, true),
            (false, true) => null_ordering(key, false),
            (false, false) => {
                let ordering = compare_values(left, right).unwrap_or(Ordering::Equal);
                match key.direction {
                    Direction::Asc => ordering,
                    Direction::Desc => ordering.reverse(),
                }
            }
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Where a null sorts relative to a non-null value. An explicit placement
/// holds regardless of direction; the default treats null as the largest
/// value, so it lands last ascending and first descending.
fn null_ordering(key: &OrderKey, left_is_null: bool) -> Ordering {
    let nulls_first = match key.nulls {
        NullPlacement::NullsFirst => true,
        NullPlacement::NullsLast => false,
        NullPlacement::Default => key.direction == Direction::Desc,
    };
    if left_is_null == nulls_first {
        Ordering::Less
    } else {
        Ordering::Greater
    }
}

/// Key equality for grouping and distinct, where nulls collapse into one
/// bucket.
fn keys_equal(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b)
            .all(|(x, y)| match (x.is_null(), y.is_null()) {
                (true, true) => true,
                (false, false) => values_equal(x, y),
                _ => false,
            })
}

fn rows_equal(a: &[Value], b: &[Value]) -> bool {
    keys_equal(a, b)
}

fn truthy(value: Value) -> bool {
    value.as_bool().unwrap_or(false)
}

fn has_aggregate(op: &ScalarOp) -> bool {
    match op {
        ScalarOp::Aggregate { .. } => true,
        ScalarOp::Binary { lhs, rhs, .. } => has_aggregate(lhs) || has_aggregate(rhs),
        ScalarOp::Unary { expr, .. } => has_aggregate(expr),
        ScalarOp::List(items) => items.iter().any(has_aggregate),
        ScalarOp::Column { .. } | ScalarOp::Param(_) | ScalarOp::Subquery(_) => false,
    }
}
