//! An executor backed by in-memory tables.

use std::collections::HashMap;

use parking_lot::RwLock;

use relq_model::Value;

use super::eval::{EvalContext, StoredRow};
use super::query::run_query;
use super::{ExecOptions, ExecutorError, RelationalExecutor, Row};
use crate::translate::{BoundParams, TranslatedQuery};

/// A [`RelationalExecutor`] over per-entity tables held in memory.
///
/// Rows are field-name maps appended in insertion order. The executor
/// interprets translated queries directly, so tests and examples get full
/// engine semantics without a database behind them.
#[derive(Debug, Default)]
pub struct MemoryExecutor {
    tables: RwLock<HashMap<String, Vec<StoredRow>>>,
}

impl MemoryExecutor {
    /// An executor with no tables.
    pub fn new() -> Self {
        MemoryExecutor::default()
    }

    /// Append one row to an entity's table, creating the table on first use.
    pub fn insert(&self, entity: &str, fields: &[(&str, Value)]) {
        let row: StoredRow = fields
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        self.tables
            .write()
            .entry(entity.to_string())
            .or_default()
            .push(row);
    }

    /// Number of rows stored for an entity.
    pub fn row_count(&self, entity: &str) -> usize {
        self.tables.read().get(entity).map(Vec::len).unwrap_or(0)
    }

    /// Drop all rows of every table.
    pub fn clear(&self) {
        self.tables.write().clear();
    }
}

impl RelationalExecutor for MemoryExecutor {
    fn execute(
        &self,
        query: &TranslatedQuery,
        params: &BoundParams,
        options: &ExecOptions,
    ) -> Result<Vec<Row>, ExecutorError> {
        if let Some(timeout) = options.timeout {
            // Nothing here runs long enough to race a clock; only an
            // already exhausted budget can fail.
            if timeout.is_zero() {
                return Err(ExecutorError::Timeout(timeout));
            }
        }
        let tables = self.tables.read();
        let ctx = EvalContext {
            tables: &tables,
            params,
        };
        run_query(&ctx, query)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use relq_model::BinaryOp;

    use super::*;
    use crate::translate::{ScalarOp, SourceRef, TranslatedJoin, TranslatedJoinKind};

    fn column(alias: &str, field: &str) -> ScalarOp {
        ScalarOp::Column {
            alias: alias.to_string(),
            field: field.to_string(),
        }
    }

    fn seeded() -> MemoryExecutor {
        let store = MemoryExecutor::new();
        store.insert(
            "Member",
            &[
                ("id", Value::Int64(1)),
                ("age", Value::Int64(10)),
                ("team_id", Value::Int64(1)),
            ],
        );
        store.insert(
            "Member",
            &[
                ("id", Value::Int64(2)),
                ("age", Value::Int64(20)),
                ("team_id", Value::Null),
            ],
        );
        store.insert("Team", &[("id", Value::Int64(1)), ("name", Value::from("teamA"))]);
        store
    }

    fn bare_query() -> TranslatedQuery {
        TranslatedQuery {
            sources: vec![SourceRef {
                entity: "Member".to_string(),
                alias: "m".to_string(),
            }],
            joins: Vec::new(),
            projection: vec![column("m", "id")],
            distinct: false,
            filter: None,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            offset: None,
            limit: None,
        }
    }

    #[test]
    fn test_insert_and_count() {
        let store = seeded();
        assert_eq!(store.row_count("Member"), 2);
        assert_eq!(store.row_count("Team"), 1);
        assert_eq!(store.row_count("Trophy"), 0);
        store.clear();
        assert_eq!(store.row_count("Member"), 0);
    }

    #[test]
    fn test_filter_against_bound_param() {
        let store = seeded();
        let mut query = bare_query();
        query.filter = Some(ScalarOp::Binary {
            op: BinaryOp::Gt,
            lhs: Box::new(column("m", "age")),
            rhs: Box::new(ScalarOp::Param(0)),
        });
        let mut params = BoundParams::new();
        params.push(Value::Int64(15));
        let rows = store
            .execute(&query, &params, &ExecOptions::default())
            .unwrap();
        assert_eq!(rows, vec![vec![Value::Int64(2)]]);
    }

    #[test]
    fn test_left_outer_join_pads_missing_target() {
        let store = seeded();
        let mut query = bare_query();
        query.projection = vec![column("m", "id"), column("t", "name")];
        query.joins = vec![TranslatedJoin {
            target: SourceRef {
                entity: "Team".to_string(),
                alias: "t".to_string(),
            },
            kind: TranslatedJoinKind::LeftOuter,
            on: ScalarOp::Binary {
                op: BinaryOp::Eq,
                lhs: Box::new(column("m", "team_id")),
                rhs: Box::new(column("t", "id")),
            },
        }];
        let rows = store
            .execute(&query, &BoundParams::new(), &ExecOptions::default())
            .unwrap();
        assert_eq!(
            rows,
            vec![
                vec![Value::Int64(1), Value::from("teamA")],
                vec![Value::Int64(2), Value::Null],
            ]
        );
    }

    #[test]
    fn test_inner_join_drops_unmatched() {
        let store = seeded();
        let mut query = bare_query();
        query.joins = vec![TranslatedJoin {
            target: SourceRef {
                entity: "Team".to_string(),
                alias: "t".to_string(),
            },
            kind: TranslatedJoinKind::Inner,
            on: ScalarOp::Binary {
                op: BinaryOp::Eq,
                lhs: Box::new(column("m", "team_id")),
                rhs: Box::new(column("t", "id")),
            },
        }];
        let rows = store
            .execute(&query, &BoundParams::new(), &ExecOptions::default())
            .unwrap();
        assert_eq!(rows, vec![vec![Value::Int64(1)]]);
    }

    #[test]
    fn test_window_applies_after_order() {
        let store = seeded();
        let mut query = bare_query();
        query.order_by = vec![crate::translate::OrderKey {
            expr: column("m", "age"),
            direction: relq_model::Direction::Desc,
            nulls: relq_model::NullPlacement::Default,
        }];
        query.offset = Some(1);
        query.limit = Some(5);
        let rows = store
            .execute(&query, &BoundParams::new(), &ExecOptions::default())
            .unwrap();
        assert_eq!(rows, vec![vec![Value::Int64(1)]]);
    }

    #[test]
    fn test_zero_timeout_fails_fast() {
        let store = seeded();
        let query = bare_query();
        let options = ExecOptions::with_timeout(Duration::ZERO);
        let err = store
            .execute(&query, &BoundParams::new(), &options)
            .unwrap_err();
        assert_eq!(err, ExecutorError::Timeout(Duration::ZERO));
    }
}
