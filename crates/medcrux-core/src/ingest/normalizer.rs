use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entity::KnowledgeEntity;
use crate::relation::KnowledgeRelation;

/// What happened to an entity offered to the [`Normalizer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// First entity seen with this id.
    New,
    /// Replaced a less authoritative entity with the same id.
    Superseded,
    /// Lost to an equally or more authoritative entity; only its references were kept.
    Absorbed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NormalizationOutput {
    pub entities: Vec<KnowledgeEntity>,
    pub relations: Vec<KnowledgeRelation>,
    pub merged_entities: usize,
    pub duplicate_relations: usize,
}

impl NormalizationOutput {
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn relation_count(&self) -> usize {
        self.relations.len()
    }
}

/// Collapses the entities of many documents onto one record per id.
///
/// Among entities that share an id the lowest priority value wins; the
/// references of every other copy are appended to the winner. Relations are
/// kept once per id, first seen wins.
#[derive(Debug, Default)]
pub struct Normalizer {
    entities: BTreeMap<String, KnowledgeEntity>,
    relations: BTreeMap<String, KnowledgeRelation>,
    merged_entities: usize,
    duplicate_relations: usize,
}

impl Normalizer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entity(&mut self, entity: KnowledgeEntity) -> Resolution {
        let Some(existing) = self.entities.get_mut(&entity.id) else {
            self.entities.insert(entity.id.clone(), entity);
            return Resolution::New;
        };

        self.merged_entities += 1;
        if entity.priority < existing.priority {
            let mut winner = entity;
            let absorbed = std::mem::take(&mut existing.metadata.references);
            append_references(&mut winner.metadata.references, absorbed);
            *existing = winner;
            Resolution::Superseded
        } else {
            append_references(&mut existing.metadata.references, entity.metadata.references);
            Resolution::Absorbed
        }
    }

    pub fn add_entities(&mut self, entities: impl IntoIterator<Item = KnowledgeEntity>) {
        for entity in entities {
            let id = entity.id.clone();
            let resolution = self.add_entity(entity);
            if resolution != Resolution::New {
                tracing::debug!("Merged entity {} ({:?})", id, resolution);
            }
        }
    }

    pub fn add_relation(&mut self, relation: KnowledgeRelation) -> bool {
        if self.relations.contains_key(&relation.id) {
            self.duplicate_relations += 1;
            return false;
        }
        self.relations.insert(relation.id.clone(), relation);
        true
    }

    pub fn add_relations(&mut self, relations: impl IntoIterator<Item = KnowledgeRelation>) {
        for relation in relations {
            self.add_relation(relation);
        }
    }


    /// Entities and relations ordered by id.
    #[must_use]
    pub fn finish(self) -> NormalizationOutput {
        NormalizationOutput {
            entities: self.entities.into_values().collect(),
            relations: self.relations.into_values().collect(),
            merged_entities: self.merged_entities,
            duplicate_relations: self.duplicate_relations,
        }
    }
}

fn append_references(into: &mut Vec<String>, from: Vec<String>) {
    for reference in from {
        if !into.contains(&reference) {
            into.push(reference);
        }
    }
}
