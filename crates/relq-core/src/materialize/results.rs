//! Result containers returned by the engine.

use serde::{Deserialize, Serialize};

use relq_model::Value;

/// One projected row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tuple(Vec<Value>);

impl Tuple {
    pub(crate) fn new(values: Vec<Value>) -> Self {
        Tuple(values)
    }

    /// Value at a projected position.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    /// Number of projected values.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the tuple has no values.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// All values in projected order.
    pub fn values(&self) -> &[Value] {
        &self.0
    }

    /// Consume the tuple into its values.
    pub fn into_values(self) -> Vec<Value> {
        self.0
    }
}

/// One page of results plus the total count the filters select.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchResults<T> {
    /// Rows of the requested page.
    pub results: Vec<T>,
    /// Total rows matching the filters, ignoring the page window.
    pub total: i64,
    /// Offset the page was fetched with.
    pub offset: Option<u64>,
    /// Limit the page was fetched with.
    pub limit: Option<u64>,
}
