//! Plan translation: lowering a resolved plan to an executable query.
//!
//! Translation flattens expressions into parameter-bound scalar operations,
//! expands entity projections into column lists, and produces the row shape
//! the materializer uses to rebuild entities from raw rows. Literals never
//! survive into the translated query text; every one becomes a slot in
//! [`BoundParams`].

mod sql;
mod translator;

pub use translator::Translator;

use serde::{Deserialize, Serialize};

use relq_model::{AggregateFunc, BinaryOp, Direction, NullPlacement, Pagination, UnaryOp, Value};

/// A flattened scalar operation.
///
/// The executable mirror of [`Expr`](relq_model::Expr): field references are
/// pinned to resolved columns and literals are replaced by parameter slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarOp {
    /// A resolved column reference.
    Column { alias: String, field: String },
    /// A bound parameter, indexing into the translation's [`BoundParams`].
    Param(usize),
    /// Binary operation.
    Binary {
        op: BinaryOp,
        lhs: Box<ScalarOp>,
        rhs: Box<ScalarOp>,
    },
    /// Unary operation.
    Unary { op: UnaryOp, expr: Box<ScalarOp> },
    /// A parameter list, the right-hand side of `in`.
    List(Vec<ScalarOp>),
    /// Aggregate over an optional argument; `None` is `count(*)`.
    Aggregate {
        func: AggregateFunc,
        arg: Option<Box<ScalarOp>>,
        distinct: bool,
    },
    /// A nested translated query used as a scalar.
    Subquery(Box<TranslatedQuery>),
}

/// An entity source in the translated query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    /// Entity name.
    pub entity: String,
    /// Alias the entity is visible under.
    pub alias: String,
}

/// Join kinds after translation. Fetch joins have been lowered to inner
/// joins plus projection expansion by this point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TranslatedJoinKind {
    /// Inner join.
    Inner,
    /// Left outer join.
    LeftOuter,
}

/// One translated join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslatedJoin {
    /// Joined entity.
    pub target: SourceRef,
    /// Join kind.
    pub kind: TranslatedJoinKind,
    /// Join condition. For relationship joins this carries the key equality;
    /// outer joins additionally carry their correlating predicate here.
    pub on: ScalarOp,
}

/// Ordering key after translation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderKey {
    /// Expression to sort by.
    pub expr: ScalarOp,
    /// Sort direction.
    pub direction: Direction,
    /// Null placement.
    pub nulls: NullPlacement,
}

/// The executable query handed to a [`RelationalExecutor`].
///
/// [`RelationalExecutor`]: crate::exec::RelationalExecutor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslatedQuery {
    /// Sources in declaration order; the first is the root.
    pub sources: Vec<SourceRef>,
    /// Joins in declaration order.
    pub joins: Vec<TranslatedJoin>,
    /// Projected operations, one per output column.
    pub projection: Vec<ScalarOp>,
    /// Row-level duplicate elimination over the projection.
    pub distinct: bool,
    /// Row filter.
    pub filter: Option<ScalarOp>,
    /// Group-by keys.
    pub group_by: Vec<ScalarOp>,
    /// Group filter.
    pub having: Option<ScalarOp>,
    /// Ordering keys.
    pub order_by: Vec<OrderKey>,
    /// Rows to skip.
    pub offset: Option<u64>,
    /// Maximum rows to return.
    pub limit: Option<u64>,
}

/// Positional parameter values bound during translation.
///
/// One list serves the whole translation, subqueries included;
/// [`ScalarOp::Param`] indexes into it wherever the operation appears.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundParams(Vec<Value>);

impl BoundParams {
    /// Create an empty parameter list.
    pub fn new() -> Self {
        BoundParams::default()
    }

    /// Append a value, returning its slot index.
    pub(crate) fn push(&mut self, value: Value) -> usize {
        self.0.push(value);
        self.0.len() - 1
    }

    /// Value bound at the given slot.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    /// Number of bound values.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if no values are bound.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The bound values in slot order.
    pub fn values(&self) -> &[Value] {
        &self.0
    }
}

/// Column span of one entity within a translated row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySpan {
    /// Alias the entity was projected under.
    pub alias: String,
    /// Entity name.
    pub entity: String,
    /// Field names in projected order.
    pub fields: Vec<String>,
    /// Row position of each field, parallel to `fields`.
    pub columns: Vec<usize>,
    /// Row position of the identity field.
    pub identity_col: usize,
}

/// A fetched relationship's span within a translated row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchSpan {
    /// The fetched entity's column span.
    pub span: EntitySpan,
    /// Alias owning the relationship.
    pub owner_alias: String,
    /// Relationship name on the owner.
    pub relation: String,
    /// Whether the relationship fans out.
    pub to_many: bool,
}

/// How the materializer maps raw rows back to results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RowShape {
    /// Rows rebuild entities: the root span plus any fetch-eager spans.
    Entity {
        /// The projected root entity's span.
        root: EntitySpan,
        /// Fetch-eager spans in declaration order.
        fetched: Vec<FetchSpan>,
        /// Pagination lifted off the translated query. A row window under a
        /// to-many fetch would cut through the middle of an entity, so the
        /// window is applied to deduplicated entities instead.
        deferred_page: Option<Pagination>,
    },
    /// Each row maps 1:1 to a tuple of this width.
    Tuple {
        /// Number of projected columns.
        width: usize,
    },
}

/// Everything execution needs: the query, its parameters, and the row shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Translation {
    /// The executable query.
    pub query: TranslatedQuery,
    /// Parameter values referenced by the query.
    pub params: BoundParams,
    /// Row shape for materialization.
    pub shape: RowShape,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bound_params() {
        let mut params = BoundParams::new();
        assert!(params.is_empty());
        assert_eq!(params.push(Value::Int64(30)), 0);
        assert_eq!(params.push(Value::from("teamA")), 1);
        assert_eq!(params.len(), 2);
        assert_eq!(params.get(0), Some(&Value::Int64(30)));
        assert_eq!(params.get(2), None);
    }
}
