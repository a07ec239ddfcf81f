//! Boolean predicates and the dynamic predicate-list reducers.

use serde::{Deserialize, Serialize};

use super::{BinaryOp, Expr, UnaryOp};

/// A boolean-typed expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    expr: Expr,
}

impl Predicate {
    pub(crate) fn new(expr: Expr) -> Self {
        Predicate { expr }
    }

    /// Borrow the underlying expression.
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Consume into the underlying expression.
    pub fn into_expr(self) -> Expr {
        self.expr
    }

    /// Conjunction of two predicates.
    pub fn and(self, other: Predicate) -> Predicate {
        Predicate::new(Expr::binary(BinaryOp::And, self.expr, other.expr))
    }

    /// Disjunction of two predicates.
    pub fn or(self, other: Predicate) -> Predicate {
        Predicate::new(Expr::binary(BinaryOp::Or, self.expr, other.expr))
    }

    /// Negation.
    pub fn not(self) -> Predicate {
        Predicate::new(Expr::Unary {
            op: UnaryOp::Not,
            expr: Box::new(self.expr),
        })
    }

    /// Conjoin the present entries of a predicate sequence.
    ///
    /// Absent entries are no-ops and are dropped before conjunction; an empty
    /// or all-absent sequence yields `None`, meaning "no filter". This is the
    /// mechanism for dynamic, conditionally included filters.
    pub fn all<I>(slots: I) -> Option<Predicate>
    where
        I: IntoIterator<Item = Option<Predicate>>,
    {
        slots
            .into_iter()
            .flatten()
            .reduce(|acc, pred| acc.and(pred))
    }

    /// Disjoin the present entries of a predicate sequence, dropping absent
    /// entries the same way as [`Predicate::all`].
    pub fn any<I>(slots: I) -> Option<Predicate>
    where
        I: IntoIterator<Item = Option<Predicate>>,
    {
        slots
            .into_iter()
            .flatten()
            .reduce(|acc, pred| acc.or(pred))
    }
}

/// One slot in a dynamic predicate list.
///
/// Both `Predicate` and `Option<Predicate>` fit a slot, so call sites can mix
/// unconditional predicates with conditionally built ones without branching.
pub trait PredicateSlot {
    /// Convert into an optional predicate; `None` means "skip this slot".
    fn into_slot(self) -> Option<Predicate>;
}

impl PredicateSlot for Predicate {
    fn into_slot(self) -> Option<Predicate> {
        Some(self)
    }
}

impl PredicateSlot for Option<Predicate> {
    fn into_slot(self) -> Option<Predicate> {
        self
    }
}
