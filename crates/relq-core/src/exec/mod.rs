//! Execution: the executor capability and the in-memory reference executor.
//!
//! The engine never talks to storage directly; it hands a
//! [`TranslatedQuery`] and its [`BoundParams`] to a [`RelationalExecutor`]
//! and materializes whatever rows come back. [`MemoryExecutor`] implements
//! the capability over in-memory tables so the full pipeline runs without a
//! database.

mod eval;
mod memory;
mod query;

pub use memory::MemoryExecutor;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use relq_model::Value;

use crate::materialize::MaterializedEntity;
use crate::translate::{BoundParams, TranslatedQuery};

/// One raw result row.
pub type Row = Vec<Value>;

/// Per-call execution options.
///
/// The timeout is forwarded to the executor, which decides how to honor it;
/// the engine does not reimplement cancellation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ExecOptions {
    /// Maximum duration the executor may spend on one call.
    pub timeout: Option<Duration>,
}

impl ExecOptions {
    /// Options with a per-call timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        ExecOptions {
            timeout: Some(timeout),
        }
    }
}

/// Failures reported by an executor.
///
/// These propagate to the caller unchanged; retry policy, if any, belongs to
/// the executor itself.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutorError {
    /// The call exceeded its time budget.
    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    /// The backing store could not be reached.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The executor rejected the query form.
    #[error("query rejected: {0}")]
    Rejected(String),

    /// Evaluating an operation over a row failed.
    #[error("evaluation failed: {0}")]
    Evaluation(String),
}

/// The storage capability this engine executes against.
pub trait RelationalExecutor {
    /// Run a translated query with its bound parameters and return the raw
    /// rows in result order.
    fn execute(
        &self,
        query: &TranslatedQuery,
        params: &BoundParams,
        options: &ExecOptions,
    ) -> Result<Vec<Row>, ExecutorError>;

    /// Check whether a relationship path on a materialized entity was
    /// eagerly loaded. Diagnostics only; the engine itself never calls it.
    fn is_loaded(&self, entity: &MaterializedEntity, path: &str) -> bool {
        entity.is_loaded(path)
    }
}
