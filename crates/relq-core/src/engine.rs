//! The query engine: resolve, translate, execute, materialize.

use tracing::debug;

use relq_model::{Model, Pagination, QueryPlan, Value};

use crate::error::{CardinalityError, ResolutionError, Result};
use crate::exec::{ExecOptions, RelationalExecutor, Row};
use crate::materialize::{self, FetchResults, MaterializedEntity, Tuple};
use crate::resolve::Resolver;
use crate::translate::{RowShape, TranslatedQuery, Translation, Translator};

/// Runs query plans against a model through a [`RelationalExecutor`].
///
/// The engine owns the full path from plan to results: resolution against
/// the model, translation into an executable query with bound parameters,
/// execution, and materialization of the raw rows. Execution options are
/// forwarded to the executor unchanged.
#[derive(Debug)]
pub struct QueryEngine<E> {
    model: Model,
    executor: E,
    options: ExecOptions,
}

impl<E: RelationalExecutor> QueryEngine<E> {
    /// An engine over a model and an executor, with default options.
    pub fn new(model: Model, executor: E) -> Self {
        QueryEngine {
            model,
            executor,
            options: ExecOptions::default(),
        }
    }

    /// Replace the execution options forwarded to every call.
    pub fn with_options(mut self, options: ExecOptions) -> Self {
        self.options = options;
        self
    }

    /// The model plans resolve against.
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// The executor behind this engine.
    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Fetch a plan's root entities, deduplicated by identity in
    /// first-seen order.
    pub fn fetch(&self, plan: &QueryPlan) -> Result<Vec<MaterializedEntity>> {
        let (rows, translation) = self.run(plan)?;
        match translation.shape {
            RowShape::Entity {
                root,
                fetched,
                deferred_page,
            } => {
                let mut entities = materialize::entities(&rows, &root, &fetched);
                if let Some(page) = deferred_page {
                    entities = window(entities, &page);
                }
                Ok(entities)
            }
            RowShape::Tuple { .. } => Err(ResolutionError::InvalidPlan(
                "plan projects expressions; use fetch_tuples".to_string(),
            )
            .into()),
        }
    }

    /// Fetch a plan's projected rows, one tuple per row.
    pub fn fetch_tuples(&self, plan: &QueryPlan) -> Result<Vec<Tuple>> {
        let (rows, translation) = self.run(plan)?;
        match translation.shape {
            RowShape::Tuple { .. } => Ok(materialize::tuples(rows)),
            RowShape::Entity { .. } => Err(ResolutionError::InvalidPlan(
                "plan projects a root entity; use fetch".to_string(),
            )
            .into()),
        }
    }

    /// Fetch exactly one entity.
    pub fn fetch_one(&self, plan: &QueryPlan) -> Result<MaterializedEntity> {
        let mut entities = self.fetch(plan)?;
        if entities.len() > 1 {
            return Err(CardinalityError::TooManyResults {
                found: entities.len(),
            }
            .into());
        }
        entities
            .pop()
            .ok_or_else(|| CardinalityError::NoResult.into())
    }

    /// Fetch exactly one tuple.
    pub fn fetch_one_tuple(&self, plan: &QueryPlan) -> Result<Tuple> {
        let mut tuples = self.fetch_tuples(plan)?;
        if tuples.len() > 1 {
            return Err(CardinalityError::TooManyResults {
                found: tuples.len(),
            }
            .into());
        }
        tuples.pop().ok_or_else(|| CardinalityError::NoResult.into())
    }

    /// Fetch the first entity, if any, by limiting the plan to one result.
    pub fn fetch_first(&self, plan: &QueryPlan) -> Result<Option<MaterializedEntity>> {
        let mut limited = plan.clone();
        limited.pagination.limit = Some(1);
        let entities = self.fetch(&limited)?;
        Ok(entities.into_iter().next())
    }

    /// Fetch a page of entities together with the total the filters select.
    ///
    /// The total comes from the companion count query: same filters and
    /// joins, no ordering or window.
    pub fn fetch_results(&self, plan: &QueryPlan) -> Result<FetchResults<MaterializedEntity>> {
        let results = self.fetch(plan)?;
        let total = self.fetch_count(plan)?;
        Ok(FetchResults {
            results,
            total,
            offset: plan.pagination.offset,
            limit: plan.pagination.limit,
        })
    }

    /// Fetch a page of tuples together with the total the filters select.
    pub fn fetch_tuple_results(&self, plan: &QueryPlan) -> Result<FetchResults<Tuple>> {
        let results = self.fetch_tuples(plan)?;
        let total = self.fetch_count(plan)?;
        Ok(FetchResults {
            results,
            total,
            offset: plan.pagination.offset,
            limit: plan.pagination.limit,
        })
    }

    /// Count the rows a plan's filters select, ignoring its ordering and
    /// window. Entity plans count distinct root identities.
    pub fn fetch_count(&self, plan: &QueryPlan) -> Result<i64> {
        let resolved = Resolver::new(&self.model).resolve(plan.clone())?;
        let translation = Translator::new(&self.model).translate_count(&resolved)?;
        let rows = self
            .executor
            .execute(&translation.query, &translation.params, &self.options)?;
        Ok(total_from(&translation.query, &rows))
    }

    fn run(&self, plan: &QueryPlan) -> Result<(Vec<Row>, Translation)> {
        let resolved = Resolver::new(&self.model).resolve(plan.clone())?;
        let translation = Translator::new(&self.model).translate(&resolved)?;
        let rows = self
            .executor
            .execute(&translation.query, &translation.params, &self.options)?;
        debug!(rows = rows.len(), "Executed query plan");
        Ok((rows, translation))
    }
}

/// Total from a companion count query's rows. A grouped companion yields
/// one row per group; an ungrouped one yields a single count row.
fn total_from(query: &TranslatedQuery, rows: &[Row]) -> i64 {
    if query.group_by.is_empty() {
        rows.first()
            .and_then(|row| row.first())
            .and_then(Value::as_i64)
            .unwrap_or(0)
    } else {
        rows.len() as i64
    }
}

fn window<T>(mut items: Vec<T>, page: &Pagination) -> Vec<T> {
    if let Some(offset) = page.offset {
        let skip = (offset as usize).min(items.len());
        items = items.split_off(skip);
    }
    if let Some(limit) = page.limit {
        items.truncate(limit as usize);
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_clamps_out_of_range_offset() {
        let page = Pagination {
            offset: Some(10),
            limit: Some(2),
        };
        let items: Vec<i64> = vec![1, 2, 3];
        assert!(window(items, &page).is_empty());

        let page = Pagination {
            offset: Some(1),
            limit: None,
        };
        assert_eq!(window(vec![1, 2, 3], &page), vec![2, 3]);
    }

    #[test]
    fn test_total_from_count_rows() {
        let query = TranslatedQuery {
            sources: Vec::new(),
            joins: Vec::new(),
            projection: Vec::new(),
            distinct: false,
            filter: None,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            offset: None,
            limit: None,
        };
        assert_eq!(total_from(&query, &[vec![Value::Int64(4)]]), 4);
        assert_eq!(total_from(&query, &[]), 0);

        let mut grouped = query;
        grouped.group_by = vec![crate::translate::ScalarOp::Column {
            alias: "t".to_string(),
            field: "name".to_string(),
        }];
        let rows = vec![vec![Value::Int64(2)], vec![Value::Int64(2)]];
        assert_eq!(total_from(&grouped, &rows), 2);
    }
}
