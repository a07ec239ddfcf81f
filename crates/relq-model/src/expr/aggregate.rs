//! Aggregate functions.

use serde::{Deserialize, Serialize};

use super::{Expr, TypedExpr};
use crate::types::ScalarType;

/// Aggregate functions usable in projections, having, and grouped ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateFunc {
    /// Row count.
    Count,
    /// Numeric sum.
    Sum,
    /// Numeric average.
    Avg,
    /// Maximum value.
    Max,
    /// Minimum value.
    Min,
}

impl AggregateFunc {
    /// Lowercase name, used in rendered text and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunc::Count => "count",
            AggregateFunc::Sum => "sum",
            AggregateFunc::Avg => "avg",
            AggregateFunc::Max => "max",
            AggregateFunc::Min => "min",
        }
    }

    /// Result scalar type, given the argument's scalar type.
    ///
    /// `count` is always Int64 and `avg` always Float64; `sum`, `max`, and
    /// `min` keep their argument's type.
    pub fn result_type(&self, arg: Option<ScalarType>) -> Option<ScalarType> {
        match self {
            AggregateFunc::Count => Some(ScalarType::Int64),
            AggregateFunc::Avg => Some(ScalarType::Float64),
            AggregateFunc::Sum | AggregateFunc::Max | AggregateFunc::Min => arg,
        }
    }
}

/// `count(*)` over the result rows.
pub fn count_all() -> TypedExpr<i64> {
    TypedExpr::new(Expr::Aggregate {
        func: AggregateFunc::Count,
        arg: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_types() {
        assert_eq!(
            AggregateFunc::Count.result_type(None),
            Some(ScalarType::Int64)
        );
        assert_eq!(
            AggregateFunc::Avg.result_type(Some(ScalarType::Int64)),
            Some(ScalarType::Float64)
        );
        assert_eq!(
            AggregateFunc::Sum.result_type(Some(ScalarType::Int64)),
            Some(ScalarType::Int64)
        );
        assert_eq!(
            AggregateFunc::Max.result_type(Some(ScalarType::String)),
            Some(ScalarType::String)
        );
    }

    #[test]
    fn test_count_all() {
        let expr = count_all().into_expr();
        assert_eq!(expr.to_string(), "count(*)");
    }
}
