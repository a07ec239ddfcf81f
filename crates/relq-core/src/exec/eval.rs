//! Scalar evaluation over working rows.
//!
//! Operations evaluate in one of two scopes: [`Scope::Row`] for a single
//! joined row, [`Scope::Group`] for a set of rows collapsed by grouping.
//! Aggregates fold in group scope and are an error in row scope; every
//! other node evaluates the same way in both.

use std::cmp::Ordering;
use std::collections::HashMap;

use relq_model::{AggregateFunc, BinaryOp, UnaryOp, Value};

use super::query::run_query;
use super::ExecutorError;
use crate::translate::{BoundParams, ScalarOp, TranslatedQuery};

/// One stored row: field name to value.
pub(crate) type StoredRow = HashMap<String, Value>;

/// One working row during execution: alias to that alias's stored row.
/// `None` marks an alias null-padded by an outer join.
pub(crate) type JoinedRow = HashMap<String, Option<StoredRow>>;

/// Shared state for one execution: the table snapshot and the bound
/// parameters, both also visible to nested subqueries.
pub(crate) struct EvalContext<'a> {
    pub tables: &'a HashMap<String, Vec<StoredRow>>,
    pub params: &'a BoundParams,
}

impl EvalContext<'_> {
    /// Rows stored for an entity. An entity nobody inserted into is an
    /// empty table, not an error.
    pub(crate) fn table(&self, entity: &str) -> &[StoredRow] {
        self.tables.get(entity).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// What an operation evaluates against.
#[derive(Clone, Copy)]
pub(crate) enum Scope<'a> {
    Row(&'a JoinedRow),
    Group(&'a [JoinedRow]),
}

/// Evaluate one operation to a value.
pub(crate) fn eval(
    ctx: &EvalContext<'_>,
    scope: Scope<'_>,
    op: &ScalarOp,
) -> Result<Value, ExecutorError> {
    match op {
        ScalarOp::Column { alias, field } => Ok(read_column(scope, alias, field)),
        ScalarOp::Param(index) => Ok(ctx.params.get(*index).cloned().unwrap_or(Value::Null)),
        ScalarOp::Binary { op, lhs, rhs } => eval_binary(ctx, scope, *op, lhs, rhs),
        ScalarOp::Unary { op, expr } => {
            let value = eval(ctx, scope, expr)?;
            Ok(match op {
                UnaryOp::Not => match value.as_bool() {
                    Some(b) => Value::Bool(!b),
                    None => Value::Null,
                },
                UnaryOp::IsNull => Value::Bool(value.is_null()),
                UnaryOp::IsNotNull => Value::Bool(!value.is_null()),
            })
        }
        ScalarOp::List(_) => Err(ExecutorError::Evaluation(
            "value list outside an in comparison".to_string(),
        )),
        ScalarOp::Aggregate {
            func,
            arg,
            distinct,
        } => match scope {
            Scope::Row(_) => Err(ExecutorError::Evaluation(
                "aggregate evaluated outside grouping".to_string(),
            )),
            Scope::Group(rows) => fold_aggregate(ctx, rows, *func, arg.as_deref(), *distinct),
        },
        ScalarOp::Subquery(query) => {
            let mut values = subquery_column(ctx, query)?;
            match values.len() {
                0 => Ok(Value::Null),
                1 => Ok(values.pop().unwrap_or(Value::Null)),
                n => Err(ExecutorError::Evaluation(format!(
                    "scalar subquery returned {n} rows"
                ))),
            }
        }
    }
}

fn read_column(scope: Scope<'_>, alias: &str, field: &str) -> Value {
    let row = match scope {
        Scope::Row(row) => Some(row),
        // Group keys are constant within a group, so any member works.
        Scope::Group(rows) => rows.first(),
    };
    row.and_then(|r| r.get(alias))
        .and_then(|stored| stored.as_ref())
        .and_then(|stored| stored.get(field))
        .cloned()
        .unwrap_or(Value::Null)
}

fn eval_binary(
    ctx: &EvalContext<'_>,
    scope: Scope<'_>,
    op: BinaryOp,
    lhs: &ScalarOp,
    rhs: &ScalarOp,
) -> Result<Value, ExecutorError> {
    match op {
        BinaryOp::And => {
            let l = eval(ctx, scope, lhs)?.as_bool();
            let r = eval(ctx, scope, rhs)?.as_bool();
            Ok(match (l, r) {
                (Some(false), _) | (_, Some(false)) => Value::Bool(false),
                (Some(true), Some(true)) => Value::Bool(true),
                _ => Value::Null,
            })
        }
        BinaryOp::Or => {
            let l = eval(ctx, scope, lhs)?.as_bool();
            let r = eval(ctx, scope, rhs)?.as_bool();
            Ok(match (l, r) {
                (Some(true), _) | (_, Some(true)) => Value::Bool(true),
                (Some(false), Some(false)) => Value::Bool(false),
                _ => Value::Null,
            })
        }
        BinaryOp::In => {
            let needle = eval(ctx, scope, lhs)?;
            if needle.is_null() {
                return Ok(Value::Null);
            }
            let haystack: Vec<Value> = match rhs {
                ScalarOp::List(items) => items
                    .iter()
                    .map(|item| eval(ctx, scope, item))
                    .collect::<Result<_, _>>()?,
                ScalarOp::Subquery(query) => subquery_column(ctx, query)?,
                other => vec![eval(ctx, scope, other)?],
            };
            Ok(Value::Bool(
                haystack.iter().any(|v| values_equal(&needle, v)),
            ))
        }
        BinaryOp::Like => {
            let text = eval(ctx, scope, lhs)?;
            let pattern = eval(ctx, scope, rhs)?;
            match (text.as_str(), pattern.as_str()) {
                (Some(text), Some(pattern)) => Ok(Value::Bool(like_match(text, pattern))),
                _ => Ok(Value::Null),
            }
        }
        BinaryOp::Eq
        | BinaryOp::Ne
        | BinaryOp::Gt
        | BinaryOp::Goe
        | BinaryOp::Lt
        | BinaryOp::Loe => {
            let l = eval(ctx, scope, lhs)?;
            let r = eval(ctx, scope, rhs)?;
            if l.is_null() || r.is_null() {
                return Ok(Value::Null);
            }
            let ordering = compare_values(&l, &r).ok_or_else(|| {
                ExecutorError::Evaluation(format!("cannot compare {l:?} with {r:?}"))
            })?;
            Ok(Value::Bool(match op {
                BinaryOp::Eq => ordering == Ordering::Equal,
                BinaryOp::Ne => ordering != Ordering::Equal,
                BinaryOp::Gt => ordering == Ordering::Greater,
                BinaryOp::Goe => ordering != Ordering::Less,
                BinaryOp::Lt => ordering == Ordering::Less,
                _ => ordering != Ordering::Greater,
            }))
        }
    }
}

/// First column of every row a subquery yields.
fn subquery_column(
    ctx: &EvalContext<'_>,
    query: &TranslatedQuery,
) -> Result<Vec<Value>, ExecutorError> {
    let rows = run_query(ctx, query)?;
    Ok(rows
        .into_iter()
        .map(|mut row| {
            if row.is_empty() {
                Value::Null
            } else {
                row.swap_remove(0)
            }
        })
        .collect())
}

fn fold_aggregate(
    ctx: &EvalContext<'_>,
    rows: &[JoinedRow],
    func: AggregateFunc,
    arg: Option<&ScalarOp>,
    distinct: bool,
) -> Result<Value, ExecutorError> {
    let arg = match arg {
        Some(arg) => arg,
        // count(*) counts rows, not values.
        None => return Ok(Value::Int64(rows.len() as i64)),
    };
    let mut values = Vec::new();
    for row in rows {
        let value = eval(ctx, Scope::Row(row), arg)?;
        if !value.is_null() {
            values.push(value);
        }
    }
    if distinct {
        let mut seen: Vec<Value> = Vec::new();
        values.retain(|v| {
            if seen.iter().any(|s| values_equal(s, v)) {
                false
            } else {
                seen.push(v.clone());
                true
            }
        });
    }
    match func {
        AggregateFunc::Count => Ok(Value::Int64(values.len() as i64)),
        AggregateFunc::Sum => sum_values(&values),
        AggregateFunc::Avg => {
            if values.is_empty() {
                return Ok(Value::Null);
            }
            let mut total = 0.0;
            for value in &values {
                total += numeric(value)?;
            }
            Ok(Value::Float64(total / values.len() as f64))
        }
        AggregateFunc::Max => Ok(extremum(&values, Ordering::Greater)),
        AggregateFunc::Min => Ok(extremum(&values, Ordering::Less)),
    }
}

fn sum_values(values: &[Value]) -> Result<Value, ExecutorError> {
    if values.is_empty() {
        return Ok(Value::Null);
    }
    let all_integral = values
        .iter()
        .all(|v| matches!(v, Value::Int32(_) | Value::Int64(_)));
    if all_integral {
        let mut total = 0i64;
        for value in values {
            total += value.as_i64().unwrap_or(0);
        }
        Ok(Value::Int64(total))
    } else {
        let mut total = 0.0;
        for value in values {
            total += numeric(value)?;
        }
        Ok(Value::Float64(total))
    }
}

fn numeric(value: &Value) -> Result<f64, ExecutorError> {
    value.as_f64().ok_or_else(|| {
        ExecutorError::Evaluation(format!("aggregate over non-numeric value {value:?}"))
    })
}

fn extremum(values: &[Value], keep: Ordering) -> Value {
    let mut best: Option<&Value> = None;
    for value in values {
        match best {
            None => best = Some(value),
            Some(current) => {
                if compare_values(value, current) == Some(keep) {
                    best = Some(value);
                }
            }
        }
    }
    best.cloned().unwrap_or(Value::Null)
}

/// Order two non-null values. Integer pairs compare exactly; any mix
/// involving a float widens to f64. `None` means the pair is incomparable.
pub(crate) fn compare_values(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::Bool(l), Value::Bool(r)) => Some(l.cmp(r)),
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        (Value::Int32(_) | Value::Int64(_), Value::Int32(_) | Value::Int64(_)) => {
            match (lhs.as_i64(), rhs.as_i64()) {
                (Some(l), Some(r)) => Some(l.cmp(&r)),
                _ => None,
            }
        }
        _ => match (lhs.as_f64(), rhs.as_f64()) {
            (Some(l), Some(r)) => l.partial_cmp(&r),
            _ => None,
        },
    }
}

/// Equality for in-lists, distinct, and aggregate dedup. Null never equals
/// anything here; grouping uses its own key comparison.
pub(crate) fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    compare_values(lhs, rhs) == Some(Ordering::Equal)
}

/// Match `text` against a pattern where `%` spans any run of characters
/// and `_` exactly one.
pub(crate) fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    let mut t = 0;
    let mut p = 0;
    let mut resume: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            resume = Some((p + 1, t));
            p += 1;
        } else if let Some((rp, rt)) = resume {
            p = rp;
            t = rt + 1;
            resume = Some((rp, rt + 1));
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == '%' {
        p += 1;
    }
    p == pattern.len()
}
