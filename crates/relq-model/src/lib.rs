//! Relational metamodel, expression algebra, and query plans for relq.
//!
//! This crate defines the model-side half of the engine: entity and
//! relationship definitions, the typed expression algebra, and the fluent
//! builder that freezes a chain of calls into an immutable [`QueryPlan`].
//! Resolution against a model and execution live in `relq-core`.
//!
//! # Modules
//!
//! - [`model`] - Entity, field, and relationship definitions
//! - [`expr`] - Typed field references, predicates, aggregates, ordering
//! - [`plan`] - The fluent [`Query`](plan::Query) builder and plan types
//! - [`types`] - Scalar type tags
//! - [`value`] - Runtime values for literals and rows
//! - [`error`] - Build-time validation errors
//!
//! # Building a plan
//!
//! ```
//! use relq_model::{EntityAlias, Query};
//!
//! let m = EntityAlias::new("Member", "m");
//! let age = m.field::<i64>("age");
//!
//! let plan = Query::entity(&m)
//!     .filter(age.goe(30))
//!     .order_by(age.desc())
//!     .build()
//!     .unwrap();
//! assert_eq!(plan.declared_aliases(), vec!["m"]);
//! ```

pub mod error;
pub mod expr;
pub mod model;
pub mod plan;
pub mod types;
pub mod value;

pub use error::BuildError;

// Re-export commonly used types at crate root
pub use expr::{
    count_all, AggregateFunc, BinaryOp, Direction, EntityAlias, Expr, FieldRef, NullPlacement,
    OrderSpec, Predicate, PredicateSlot, Subquery, TypedExpr, UnaryOp,
};
pub use model::{Cardinality, EntityDef, FieldDef, Model, RelationDef};
pub use plan::{JoinKind, JoinSpec, Pagination, Projection, Query, QueryPlan, RelRef, Source};
pub use types::ScalarType;
pub use value::Value;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fluent_chain() {
        let m = EntityAlias::new("Member", "m");
        let t = EntityAlias::new("Team", "t");
        let age = m.field::<i64>("age");
        let team_name = t.field::<String>("name");

        let plan = Query::select([team_name.expr(), age.avg().into_expr()])
            .from(&m)
            .join(m.rel("team"), &t)
            .group_by([team_name.expr()])
            .having(age.avg().goe(10.0))
            .order_by(team_name.asc())
            .build()
            .unwrap();

        assert_eq!(plan.declared_aliases(), vec!["m", "t"]);
        assert_eq!(plan.group_by.len(), 1);
        assert!(plan.having.is_some());
    }

    #[test]
    fn test_plan_roundtrip() {
        let m = EntityAlias::new("Member", "m");
        let plan = Query::entity(&m)
            .filter(m.field::<String>("name").like("mem%"))
            .order_by(m.field::<i64>("age").desc().nulls_last())
            .build()
            .unwrap();

        let json = serde_json::to_string(&plan).unwrap();
        let back: QueryPlan = serde_json::from_str(&json).unwrap();
        assert_eq!(plan, back);
    }

    #[test]
    fn test_dynamic_predicates_skip_absent() {
        let m = EntityAlias::new("Member", "m");
        let name: Option<String> = None;
        let min_age: Option<i64> = Some(20);

        let plan = Query::entity(&m)
            .filter(name.map(|n| m.field::<String>("name").eq(n)))
            .filter(min_age.map(|a| m.field::<i64>("age").goe(a)))
            .build()
            .unwrap();

        assert_eq!(
            plan.filter.map(|p| p.expr().to_string()),
            Some("(m.age >= 20)".to_string())
        );
    }
}
