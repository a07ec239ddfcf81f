//! Join declarations.

use serde::{Deserialize, Serialize};

use crate::expr::Predicate;

/// Reference to a named relationship from an aliased source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelRef {
    /// Alias the relationship is traversed from.
    pub source_alias: String,
    /// Relationship name on the source alias's entity.
    pub relation: String,
}

impl RelRef {
    /// Relationship `relation` traversed from `source_alias`.
    pub fn new(source_alias: impl Into<String>, relation: impl Into<String>) -> Self {
        RelRef {
            source_alias: source_alias.into(),
            relation: relation.into(),
        }
    }

    /// Dotted path form, used in diagnostics.
    pub fn path(&self) -> String {
        format!("{}.{}", self.source_alias, self.relation)
    }
}

/// How a join materializes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinKind {
    /// Inner join; the target is joinable but not eagerly materialized.
    Plain,
    /// Inner join; the target is eagerly materialized into the result graph.
    Fetch,
    /// Left outer join; unmatched source rows are kept with nulls.
    LeftOuter,
}

/// One join declaration in a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinSpec {
    /// Relationship path this join follows; `None` for an unrelated pair,
    /// which is correlated only through `on`.
    pub relation: Option<RelRef>,
    /// Declared target entity name.
    pub entity: String,
    /// Alias the joined entity is visible under.
    pub alias: String,
    /// Join kind.
    pub kind: JoinKind,
    /// Extra join condition. For inner joins this is result-equivalent to a
    /// `where` predicate; for outer joins it is the only place correlation
    /// can live without collapsing the join back to inner.
    pub on: Option<Predicate>,
}

impl JoinSpec {
    /// Dotted path of the joined relationship, or the bare alias for an
    /// unrelated pair.
    pub fn path(&self) -> String {
        match &self.relation {
            Some(rel) => rel.path(),
            None => self.alias.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rel_path() {
        let rel = RelRef::new("m", "team");
        assert_eq!(rel.path(), "m.team");
    }

    #[test]
    fn test_join_path() {
        let join = JoinSpec {
            relation: Some(RelRef::new("m", "team")),
            entity: "Team".into(),
            alias: "t".into(),
            kind: JoinKind::Plain,
            on: None,
        };
        assert_eq!(join.path(), "m.team");

        let unrelated = JoinSpec {
            relation: None,
            entity: "Team".into(),
            alias: "t".into(),
            kind: JoinKind::LeftOuter,
            on: None,
        };
        assert_eq!(unrelated.path(), "t");
    }
}
