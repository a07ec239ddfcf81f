//! Ordering keys: direction and null placement.

use serde::{Deserialize, Serialize};

use super::Expr;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

/// Where null values sort relative to non-null values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NullPlacement {
    /// Leave the placement to the dialect (translated without an explicit
    /// placement clause).
    Default,
    /// Nulls sort before every non-null value.
    NullsFirst,
    /// Nulls sort after every non-null value.
    NullsLast,
}

/// One ordering key: an expression, a direction, and a null placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSpec {
    /// Expression to sort by.
    pub expr: Expr,
    /// Sort direction.
    pub direction: Direction,
    /// Null placement, independent of the direction.
    pub nulls: NullPlacement,
}

impl OrderSpec {
    /// Ascending order on an expression.
    pub fn asc(expr: Expr) -> Self {
        OrderSpec {
            expr,
            direction: Direction::Asc,
            nulls: NullPlacement::Default,
        }
    }

    /// Descending order on an expression.
    pub fn desc(expr: Expr) -> Self {
        OrderSpec {
            expr,
            direction: Direction::Desc,
            nulls: NullPlacement::Default,
        }
    }

    /// Sort nulls before all values, regardless of direction.
    pub fn nulls_first(mut self) -> Self {
        self.nulls = NullPlacement::NullsFirst;
        self
    }

    /// Sort nulls after all values, regardless of direction.
    pub fn nulls_last(mut self) -> Self {
        self.nulls = NullPlacement::NullsLast;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_builders() {
        let spec = OrderSpec::desc(Expr::field("m", "age"));
        assert_eq!(spec.direction, Direction::Desc);
        assert_eq!(spec.nulls, NullPlacement::Default);

        let spec = OrderSpec::asc(Expr::field("m", "name")).nulls_last();
        assert_eq!(spec.direction, Direction::Asc);
        assert_eq!(spec.nulls, NullPlacement::NullsLast);
    }
}
