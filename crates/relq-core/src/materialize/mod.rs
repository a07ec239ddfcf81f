//! Turning raw result rows into entities and tuples.
//!
//! The translator records a [`RowShape`](crate::translate::RowShape) for
//! every query; this module applies it. Entity rows collapse join fan-out
//! by root identity and hang fetched relationships off their owners;
//! projected rows become [`Tuple`]s 1:1.

mod entity;
mod materializer;
mod results;

pub use entity::{MaterializedEntity, Related};
pub use results::{FetchResults, Tuple};

pub(crate) use materializer::{entities, tuples};
