//! Plan-construction errors.

use thiserror::Error;

/// Errors raised while assembling a plan, before it ever touches a model or
/// an executor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// No `from` source was declared.
    #[error("query has no source; declare a root with `from`")]
    MissingSource,

    /// The same alias was declared by more than one source or join.
    #[error("alias `{alias}` is declared more than once")]
    DuplicateAlias { alias: String },

    /// An expression references an alias no source or join declares.
    #[error("alias `{alias}` is referenced but never declared")]
    UnknownAlias { alias: String },

    /// A join references an alias that is only declared later in the plan.
    #[error("join alias `{alias}` is referenced before it is declared")]
    AliasUsedBeforeDeclared { alias: String },

    /// An aggregate appeared where the query form does not allow one.
    #[error("aggregate expressions are not allowed in {context}")]
    MisplacedAggregate { context: &'static str },

    /// A projected expression is neither aggregated nor part of the group key.
    #[error("projected expression `{expr}` must appear in the group-by key")]
    IncompleteGroupBy { expr: String },

    /// Group-by was combined with a whole-entity projection.
    #[error("entity projection `{alias}` cannot be grouped; project the grouped expressions instead")]
    GroupedEntityProjection { alias: String },

    /// Having was declared without a group-by.
    #[error("having requires a group-by clause")]
    HavingWithoutGroupBy,

    /// Offset or limit was declared without an order-by.
    #[error("offset/limit requires an order-by clause for deterministic pages")]
    PaginationWithoutOrder,
}
