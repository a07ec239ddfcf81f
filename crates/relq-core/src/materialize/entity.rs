//! Materialized entity trees.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use relq_model::Value;

/// One entity instance assembled from result rows: its scalar fields plus
/// any relationships populated by fetch joins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterializedEntity {
    entity: String,
    identity: Value,
    values: BTreeMap<String, Value>,
    related: BTreeMap<String, Related>,
}

/// A relationship populated on a materialized entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Related {
    /// To-one target; `None` when the owning row carried no target.
    One(Option<Box<MaterializedEntity>>),
    /// To-many targets in first-seen order.
    Many(Vec<MaterializedEntity>),
}

impl MaterializedEntity {
    pub(crate) fn new(entity: String, identity: Value, values: BTreeMap<String, Value>) -> Self {
        MaterializedEntity {
            entity,
            identity,
            values,
            related: BTreeMap::new(),
        }
    }

    /// Name of the entity this instance belongs to.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Identity field value.
    pub fn identity(&self) -> &Value {
        &self.identity
    }

    /// A field's value. `None` means the field was not part of the row
    /// shape; a null field reads as `Some(&Value::Null)`.
    pub fn value(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// A string field's value.
    pub fn str(&self, field: &str) -> Option<&str> {
        self.value(field).and_then(Value::as_str)
    }

    /// An integer field's value, widened to i64.
    pub fn i64(&self, field: &str) -> Option<i64> {
        self.value(field).and_then(Value::as_i64)
    }

    /// A relationship, if a fetch join populated it.
    pub fn related(&self, name: &str) -> Option<&Related> {
        self.related.get(name)
    }

    /// A populated to-one target.
    pub fn one(&self, name: &str) -> Option<&MaterializedEntity> {
        match self.related.get(name) {
            Some(Related::One(Some(target))) => Some(target),
            _ => None,
        }
    }

    /// A populated to-many collection.
    pub fn many(&self, name: &str) -> Option<&[MaterializedEntity]> {
        match self.related.get(name) {
            Some(Related::Many(items)) => Some(items),
            _ => None,
        }
    }

    /// Whether a dot-separated relationship path was populated on this
    /// instance. Collections are walked through their first element.
    pub fn is_loaded(&self, path: &str) -> bool {
        let mut current = self;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            match current.related.get(segment) {
                None => return false,
                Some(Related::One(target)) => match (target, segments.peek()) {
                    (_, None) => return true,
                    (Some(next), Some(_)) => current = next,
                    (None, Some(_)) => return false,
                },
                Some(Related::Many(items)) => match (items.first(), segments.peek()) {
                    (_, None) => return true,
                    (Some(next), Some(_)) => current = next,
                    (None, Some(_)) => return false,
                },
            }
        }
        true
    }

    /// Mark a relationship as populated without attaching anything yet.
    /// Keeps an existing entry untouched.
    pub(crate) fn init_relation(&mut self, name: &str, to_many: bool) {
        self.related.entry(name.to_string()).or_insert_with(|| {
            if to_many {
                Related::Many(Vec::new())
            } else {
                Related::One(None)
            }
        });
    }

    /// Attach one child under a relationship. For to-one, the first child
    /// wins; for to-many, children append in attach order.
    pub(crate) fn attach(&mut self, name: &str, child: MaterializedEntity, to_many: bool) {
        self.init_relation(name, to_many);
        match self.related.get_mut(name) {
            Some(Related::Many(items)) => items.push(child),
            Some(Related::One(slot)) => {
                if slot.is_none() {
                    *slot = Some(Box::new(child));
                }
            }
            None => {}
        }
    }
}
