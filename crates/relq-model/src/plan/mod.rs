//! Query plans: the immutable output of the fluent builder.

mod builder;
mod join;

use serde::{Deserialize, Serialize};

use crate::expr::{Expr, OrderSpec, Predicate};

pub use builder::Query;
pub use join::{JoinKind, JoinSpec, RelRef};

/// A query source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Source {
    /// An aliased entity.
    Entity { entity: String, alias: String },
    /// A subquery in source position. Representable so the resolver can
    /// reject it with a descriptive error instead of mis-translating it.
    Subquery { plan: Box<QueryPlan>, alias: String },
}

impl Source {
    /// The alias this source declares.
    pub fn alias(&self) -> &str {
        match self {
            Source::Entity { alias, .. } => alias,
            Source::Subquery { alias, .. } => alias,
        }
    }
}

/// What a plan projects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Projection {
    /// A whole entity, materialized with identity deduplication.
    Entity { alias: String, distinct: bool },
    /// A fixed list of expressions; each row becomes one tuple.
    Exprs(Vec<Expr>),
}

/// Offset/limit window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Rows to skip.
    pub offset: Option<u64>,
    /// Maximum rows to return.
    pub limit: Option<u64>,
}

impl Pagination {
    /// Check if any window bound is set.
    pub fn is_paged(&self) -> bool {
        self.offset.is_some() || self.limit.is_some()
    }
}

/// Immutable description of a query before translation and execution.
///
/// Built by [`Query`], validated by the resolver, and lowered by the
/// translator; never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    /// Sources in declaration order; the first is the root.
    pub sources: Vec<Source>,
    /// Projection shape.
    pub projection: Projection,
    /// Joins in declaration order.
    pub joins: Vec<JoinSpec>,
    /// Top-level filter, already folded from the builder's filter slots.
    pub filter: Option<Predicate>,
    /// Group-by keys.
    pub group_by: Vec<Expr>,
    /// Group filter.
    pub having: Option<Predicate>,
    /// Ordering keys.
    pub order_by: Vec<OrderSpec>,
    /// Offset/limit window.
    pub pagination: Pagination,
}

impl QueryPlan {
    /// The root source, if any source was declared.
    pub fn root(&self) -> Option<&Source> {
        self.sources.first()
    }

    /// Aliases declared by sources and joins, in declaration order.
    pub fn declared_aliases(&self) -> Vec<&str> {
        self.sources
            .iter()
            .map(Source::alias)
            .chain(self.joins.iter().map(|j| j.alias.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::EntityAlias;

    #[test]
    fn test_declared_aliases() {
        let member = EntityAlias::new("Member", "m");
        let team = EntityAlias::new("Team", "t");
        let plan = Query::entity(&member)
            .join(member.rel("team"), &team)
            .build()
            .expect("valid plan");

        assert_eq!(plan.declared_aliases(), vec!["m", "t"]);
        assert_eq!(plan.root().map(Source::alias), Some("m"));
    }

    #[test]
    fn test_plan_serializes() {
        let member = EntityAlias::new("Member", "m");
        let plan = Query::entity(&member)
            .filter(member.field::<i64>("age").goe(30))
            .build()
            .expect("valid plan");

        let json = serde_json::to_string(&plan).expect("serializable");
        let back: QueryPlan = serde_json::from_str(&json).expect("deserializable");
        assert_eq!(plan, back);
    }
}
