//! Engine error types.

use thiserror::Error;

use relq_model::{BuildError, ScalarType};

use crate::exec::ExecutorError;

/// Errors raised while resolving a plan against a model.
///
/// Resolution failures carry enough context to name the offending alias,
/// field, or relationship path; none of them depend on data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolutionError {
    /// A source or join names an entity the model does not define.
    #[error("unknown entity '{entity}'")]
    UnknownEntity { entity: String },

    /// An expression references a field the entity does not define.
    #[error("entity '{entity}' (alias '{alias}') has no field '{field}'")]
    UnknownField {
        alias: String,
        entity: String,
        field: String,
    },

    /// A join path names a relationship the source entity does not declare.
    #[error("entity '{entity}' has no relationship '{relation}'")]
    UnknownRelation { entity: String, relation: String },

    /// A join's target alias is bound to a different entity than the
    /// relationship points at.
    #[error(
        "relationship '{path}' targets entity '{expected}', but alias '{alias}' is bound to '{actual}'"
    )]
    RelationTargetMismatch {
        path: String,
        alias: String,
        expected: String,
        actual: String,
    },

    /// A typed handle claimed a different scalar type than the model declares.
    #[error("field '{alias}.{field}' was used as {claimed:?} but the model declares {actual:?}")]
    FieldTypeMismatch {
        alias: String,
        field: String,
        claimed: ScalarType,
        actual: ScalarType,
    },

    /// Comparison between operands whose scalar types cannot be compared.
    #[error("cannot compare {lhs:?} with {rhs:?} using '{op}'")]
    IncomparableOperands {
        op: String,
        lhs: ScalarType,
        rhs: ScalarType,
    },

    /// `like` against a non-string operand.
    #[error("'like' requires a string operand, got {actual:?}")]
    LikeOnNonString { actual: ScalarType },

    /// A subquery placed in source position. Subqueries are valid as
    /// comparison operands and scalar projections only.
    #[error(
        "subquery cannot appear as a source (alias '{alias}'); use it as a comparison operand or scalar projection"
    )]
    SubqueryAsSource { alias: String },

    /// A scalar subquery projecting anything other than one expression.
    #[error("scalar subquery must project exactly one expression, found {found}")]
    NonScalarSubquery { found: usize },

    /// A fetch join in a plan whose projection does not include the owning
    /// entity graph.
    #[error("fetch join '{path}' requires the plan to project its owning entity")]
    FetchWithoutOwner { path: String },

    /// A fetch join whose source alias is not connected to the projected
    /// root through relationship joins.
    #[error("fetch join '{path}' is not reachable from the projected root")]
    FetchUnreachable { path: String },

    /// More than one to-many relationship fetched in a single plan. The
    /// cartesian fan-out of two collections cannot be deduplicated reliably.
    #[error("cannot fetch more than one collection per plan: '{first}' and '{second}'")]
    MultipleCollectionFetch { first: String, second: String },

    /// Structurally invalid plan.
    #[error("invalid plan: {0}")]
    InvalidPlan(String),
}

/// The value a query produced where the caller required something else.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CardinalityError {
    /// `fetch_one` against a result with more than one row.
    #[error("expected at most one result, found {found}")]
    TooManyResults { found: usize },

    /// `fetch_one` against an empty result.
    #[error("expected exactly one result, found none")]
    NoResult,
}

/// Top-level engine error.
#[derive(Debug, Error)]
pub enum Error {
    /// Plan construction failed.
    #[error(transparent)]
    Build(#[from] BuildError),

    /// Plan resolution against the model failed.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// The executor failed to run the translated query.
    #[error("execution failed: {0}")]
    Execution(#[from] ExecutorError),

    /// The result shape did not match the fetch method used.
    #[error(transparent)]
    Cardinality(#[from] CardinalityError),
}

/// Convenience alias for engine results.
pub type Result<T> = std::result::Result<T, Error>;
