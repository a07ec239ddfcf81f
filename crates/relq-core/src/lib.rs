//! relq core - Plan resolution, translation, and query execution.
//!
//! This crate turns query plans built with `relq-model` into executable
//! queries with bound parameters, runs them through a [`RelationalExecutor`],
//! and materializes the raw rows back into entities and tuples.

pub mod engine;
pub mod error;
pub mod exec;
pub mod materialize;
pub mod resolve;
pub mod translate;

pub use engine::QueryEngine;
pub use error::{CardinalityError, Error, ResolutionError, Result};
pub use exec::{ExecOptions, ExecutorError, MemoryExecutor, RelationalExecutor, Row};
pub use materialize::{FetchResults, MaterializedEntity, Related, Tuple};

// Resolution exports
pub use resolve::{Advisory, AliasBinding, FetchPath, ResolvedPlan, Resolver};

// Translation exports
pub use translate::{
    BoundParams, EntitySpan, FetchSpan, OrderKey, RowShape, ScalarOp, SourceRef, TranslatedJoin,
    TranslatedJoinKind, TranslatedQuery, Translation, Translator,
};

/// Re-export model types.
pub use relq_model as model;
