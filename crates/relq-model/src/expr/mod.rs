//! Expression algebra: the untyped expression tree and its typed wrappers.
//!
//! Callers normally build expressions through the typed layer ([`FieldRef`],
//! [`TypedExpr`], [`Predicate`]); the untyped [`Expr`] tree is what the
//! resolver validates and the translator lowers.

mod aggregate;
mod order;
mod predicate;
mod typed;

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::plan::QueryPlan;
use crate::types::ScalarType;
use crate::value::Value;

pub use aggregate::{count_all, AggregateFunc};
pub use order::{Direction, NullPlacement, OrderSpec};
pub use predicate::{Predicate, PredicateSlot};
pub use typed::{EntityAlias, FieldRef, FieldValue, NumericValue, Operand, OperandList, Subquery, TypedExpr};

/// Binary operators over value expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    /// Equality.
    Eq,
    /// Inequality.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Goe,
    /// Less than.
    Lt,
    /// Less than or equal.
    Loe,
    /// SQL `LIKE` pattern match.
    Like,
    /// Membership in a list or subquery.
    In,
    /// Boolean conjunction.
    And,
    /// Boolean disjunction.
    Or,
}

impl BinaryOp {
    /// Check if this operator compares two values into a boolean.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Gt | BinaryOp::Goe | BinaryOp::Lt | BinaryOp::Loe
        )
    }

    /// The operator's SQL-flavored symbol, as used in rendered expressions.
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Gt => ">",
            BinaryOp::Goe => ">=",
            BinaryOp::Lt => "<",
            BinaryOp::Loe => "<=",
            BinaryOp::Like => "like",
            BinaryOp::In => "in",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    /// Boolean negation.
    Not,
    /// Null test.
    IsNull,
    /// Non-null test.
    IsNotNull,
}

/// Untyped expression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// A literal value; bound as a parameter at translation, never inlined.
    Literal(Value),
    /// A field of an aliased entity. `claimed` records the scalar type a
    /// typed handle asserted, for cross-checking against the model.
    Field {
        alias: String,
        field: String,
        claimed: Option<ScalarType>,
    },
    /// Binary operation.
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Unary operation.
    Unary { op: UnaryOp, expr: Box<Expr> },
    /// A literal list, the right-hand side of [`BinaryOp::In`].
    List(Vec<Expr>),
    /// Aggregate over an argument; `None` is `count(*)`.
    Aggregate {
        func: AggregateFunc,
        arg: Option<Box<Expr>>,
    },
    /// A plan used as a scalar expression.
    Subquery(Box<QueryPlan>),
}

impl Expr {
    /// An untyped field reference.
    pub fn field(alias: impl Into<String>, field: impl Into<String>) -> Self {
        Expr::Field {
            alias: alias.into(),
            field: field.into(),
            claimed: None,
        }
    }

    /// A literal expression.
    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    /// A binary operation.
    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Check if this tree contains an aggregate, without descending into
    /// subqueries (their aggregates live in their own projections).
    pub fn contains_aggregate(&self) -> bool {
        match self {
            Expr::Aggregate { .. } => true,
            Expr::Binary { lhs, rhs, .. } => lhs.contains_aggregate() || rhs.contains_aggregate(),
            Expr::Unary { expr, .. } => expr.contains_aggregate(),
            Expr::List(items) => items.iter().any(Expr::contains_aggregate),
            Expr::Literal(_) | Expr::Field { .. } | Expr::Subquery(_) => false,
        }
    }

    /// Collect the aliases this tree references, without descending into
    /// subqueries (their aliases resolve against their own sources).
    pub fn collect_aliases<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Expr::Field { alias, .. } => {
                out.insert(alias);
            }
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_aliases(out);
                rhs.collect_aliases(out);
            }
            Expr::Unary { expr, .. } => expr.collect_aliases(out),
            Expr::List(items) => {
                for item in items {
                    item.collect_aliases(out);
                }
            }
            Expr::Aggregate { arg, .. } => {
                if let Some(arg) = arg {
                    arg.collect_aliases(out);
                }
            }
            Expr::Literal(_) | Expr::Subquery(_) => {}
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(Value::Null) => write!(f, "null"),
            Expr::Literal(Value::Bool(b)) => write!(f, "{b}"),
            Expr::Literal(Value::Int32(i)) => write!(f, "{i}"),
            Expr::Literal(Value::Int64(i)) => write!(f, "{i}"),
            Expr::Literal(Value::Float32(v)) => write!(f, "{v}"),
            Expr::Literal(Value::Float64(v)) => write!(f, "{v}"),
            Expr::Literal(Value::String(s)) => write!(f, "'{s}'"),
            Expr::Field { alias, field, .. } => write!(f, "{alias}.{field}"),
            Expr::Binary { op, lhs, rhs } => write!(f, "({lhs} {} {rhs})", op.symbol()),
            Expr::Unary { op: UnaryOp::Not, expr } => write!(f, "not {expr}"),
            Expr::Unary { op: UnaryOp::IsNull, expr } => write!(f, "{expr} is null"),
            Expr::Unary { op: UnaryOp::IsNotNull, expr } => write!(f, "{expr} is not null"),
            Expr::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            Expr::Aggregate { func, arg: Some(arg) } => write!(f, "{}({arg})", func.name()),
            Expr::Aggregate { func, arg: None } => write!(f, "{}(*)", func.name()),
            Expr::Subquery(_) => write!(f, "(subquery)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let expr = Expr::binary(
            BinaryOp::Goe,
            Expr::field("m", "age"),
            Expr::literal(30i64),
        );
        assert_eq!(expr.to_string(), "(m.age >= 30)");

        let agg = Expr::Aggregate {
            func: AggregateFunc::Avg,
            arg: Some(Box::new(Expr::field("m", "age"))),
        };
        assert_eq!(agg.to_string(), "avg(m.age)");
    }

    #[test]
    fn test_contains_aggregate() {
        let plain = Expr::field("m", "age");
        assert!(!plain.contains_aggregate());

        let nested = Expr::binary(
            BinaryOp::Gt,
            Expr::Aggregate {
                func: AggregateFunc::Count,
                arg: None,
            },
            Expr::literal(1i64),
        );
        assert!(nested.contains_aggregate());
    }

    #[test]
    fn test_collect_aliases() {
        let expr = Expr::binary(
            BinaryOp::Eq,
            Expr::field("m", "name"),
            Expr::field("t", "name"),
        );
        let mut aliases = BTreeSet::new();
        expr.collect_aliases(&mut aliases);
        assert_eq!(aliases.into_iter().collect::<Vec<_>>(), vec!["m", "t"]);
    }
}
