//! The entity model: a read-only registry of entities and relationships.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::entity::EntityDef;
use super::relation::RelationDef;

/// A read-only registry of entity and relationship definitions.
///
/// Built once at startup from static metadata and shared by every query,
/// typically behind an `Arc`. Nothing mutates a model after construction, so
/// unsynchronized concurrent reads are safe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Model {
    entities: HashMap<String, EntityDef>,
    relations: Vec<RelationDef>,
}

impl Model {
    /// Create an empty model.
    pub fn new() -> Self {
        Model::default()
    }

    /// Add an entity definition (builder style).
    pub fn with_entity(mut self, entity: EntityDef) -> Self {
        self.entities.insert(entity.name.clone(), entity);
        self
    }

    /// Add a relationship definition (builder style).
    pub fn with_relation(mut self, relation: RelationDef) -> Self {
        self.relations.push(relation);
        self
    }

    /// Look up an entity by name.
    pub fn get_entity(&self, name: &str) -> Option<&EntityDef> {
        self.entities.get(name)
    }

    /// Look up a relationship by source entity and name.
    pub fn get_relation(&self, source: &str, name: &str) -> Option<&RelationDef> {
        self.relations
            .iter()
            .find(|r| r.source == source && r.name == name)
    }

    /// All relationships declared by the given source entity.
    pub fn relations_from<'a>(
        &'a self,
        source: &'a str,
    ) -> impl Iterator<Item = &'a RelationDef> + 'a {
        self.relations.iter().filter(move |r| r.source == source)
    }
}
