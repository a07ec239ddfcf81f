//! Plan resolution: checking a [`QueryPlan`] against a [`Model`].
//!
//! Resolution binds every alias to its entity definition, verifies field and
//! relationship references, enforces the fetch join rules, and records which
//! aliases are fetch-eager so the materializer can populate them without a
//! second round-trip.
//!
//! [`Model`]: relq_model::Model

mod resolver;

pub use resolver::Resolver;

use relq_model::{EntityDef, QueryPlan, RelationDef};

/// An alias bound to the entity definition it refers to.
#[derive(Debug, Clone)]
pub struct AliasBinding {
    /// The declared alias.
    pub alias: String,
    /// The entity it is bound to.
    pub entity: EntityDef,
}

/// One fetch join recorded during resolution.
#[derive(Debug, Clone)]
pub struct FetchPath {
    /// Alias owning the relationship.
    pub source_alias: String,
    /// The resolved relationship definition.
    pub relation: RelationDef,
    /// Alias the fetched entity is visible under.
    pub target_alias: String,
}

impl FetchPath {
    /// Dotted path form, `owner.relation`.
    pub fn path(&self) -> String {
        format!("{}.{}", self.source_alias, self.relation.name)
    }
}

/// Non-fatal observations made while resolving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advisory {
    /// A fetch join whose owner is not the plan root. It still loads
    /// eagerly, but the nested placement may not be what the caller reads.
    NestedFetch { path: String },
}

/// A plan that passed resolution, with its alias bindings and fetch paths.
#[derive(Debug, Clone)]
pub struct ResolvedPlan {
    /// The validated plan.
    pub plan: QueryPlan,
    /// Alias bindings in declaration order; the first is the root.
    pub bindings: Vec<AliasBinding>,
    /// Fetch joins in declaration order.
    pub fetched: Vec<FetchPath>,
    /// Advisories produced during resolution.
    pub advisories: Vec<Advisory>,
}

impl ResolvedPlan {
    /// Binding for the given alias.
    pub fn binding(&self, alias: &str) -> Option<&AliasBinding> {
        self.bindings.iter().find(|b| b.alias == alias)
    }

    /// Check if the given alias is the target of a fetch join.
    pub fn is_fetch_eager(&self, alias: &str) -> bool {
        self.fetched.iter().any(|f| f.target_alias == alias)
    }
}
