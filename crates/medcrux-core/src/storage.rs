use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{
    entity::{EntityType, KnowledgeEntity},
    relation::{KnowledgeRelation, RelationType},
    Error, Result,
};

pub const ENTITY_INDEX: &str = "entity_index.json";
pub const RELATION_INDEX: &str = "relation_index.json";
const ENTITY_DIR: &str = "entities";
const RELATION_DIR: &str = "relations";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityIndexEntry {
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub name: String,
    /// Relative to the store root.
    pub file: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationIndexEntry {
    #[serde(rename = "type")]
    pub relation_type: RelationType,
    pub source: String,
    pub target: String,
    pub file: String,
}

pub type EntityIndex = BTreeMap<String, EntityIndexEntry>;
pub type RelationIndex = BTreeMap<String, RelationIndexEntry>;

/// Knowledge base persisted as one JSON file per record plus two indexes:
///
/// ```text
/// <root>/entities/<type>/<id>.json
/// <root>/relations/<relation_type>/<id>.json
/// <root>/entity_index.json
/// <root>/relation_index.json
/// ```
pub struct KnowledgeStore {
    root: PathBuf,
}

impl KnowledgeStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.root.join(ENTITY_INDEX).is_file() && self.root.join(RELATION_INDEX).is_file()
    }

    // Writing

    pub fn write(&self, entities: &[KnowledgeEntity], relations: &[KnowledgeRelation]) -> Result<()> {
        let mut entity_index = EntityIndex::new();
        for entity in entities {
            let file = format!(
                "{ENTITY_DIR}/{}/{}.json",
                entity.entity_type.as_str(),
                file_stem(&entity.id)
            );
            self.write_json(&file, entity)?;
            entity_index.insert(
                entity.id.clone(),
                EntityIndexEntry {
                    entity_type: entity.entity_type,
                    name: entity.name.clone(),
                    file,
                },
            );
        }

        let mut relation_index = RelationIndex::new();
        for relation in relations {
            let file = format!(
                "{RELATION_DIR}/{}/{}.json",
                relation.relation_type.as_str(),
                file_stem(&relation.id)
            );
            self.write_json(&file, relation)?;
            relation_index.insert(
                relation.id.clone(),
                RelationIndexEntry {
                    relation_type: relation.relation_type,
                    source: relation.source_entity_id.clone(),
                    target: relation.target_entity_id.clone(),
                    file,
                },
            );
        }

        self.write_json(ENTITY_INDEX, &entity_index)?;
        self.write_json(RELATION_INDEX, &relation_index)?;

        tracing::info!(
            "Wrote {} entities and {} relations to {}",
            entity_index.len(),
            relation_index.len(),
            self.root.display()
        );
        Ok(())
    }

    fn write_json<T: Serialize>(&self, relative: &str, value: &T) -> Result<()> {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(value)?;
        std::fs::write(&path, json).map_err(|e| Error::io(&path, e))
    }

    // Reading

    pub fn entity_index(&self) -> Result<EntityIndex> {
        self.read_index(ENTITY_INDEX)
    }

    pub fn relation_index(&self) -> Result<RelationIndex> {
        self.read_index(RELATION_INDEX)
    }

    /// Every indexed entity, in id order.
    pub fn load_entities(&self) -> Result<Vec<KnowledgeEntity>> {
        self.entity_index()?
            .values()
            .map(|entry| self.read_json(&entry.file))
            .collect()
    }

    /// Every indexed relation, in id order.
    pub fn load_relations(&self) -> Result<Vec<KnowledgeRelation>> {
        self.relation_index()?
            .values()
            .map(|entry| self.read_json(&entry.file))
            .collect()
    }

    fn read_index<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let path = self.root.join(name);
        if !path.is_file() {
            return Err(Error::KnowledgeBaseMissing(path));
        }
        self.read_json(name)
    }

    fn read_json<T: DeserializeOwned>(&self, relative: &str) -> Result<T> {
        let path = self.root.join(relative);
        let text = std::fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::MissingFile(path.clone()),
            _ => Error::io(&path, e),
        })?;
        serde_json::from_str(&text).map_err(|e| Error::corrupt(&path, e))
    }
}

/// Longest file stem written as-is; anything longer is shortened and hashed.
const MAX_STEM_BYTES: usize = 200;
const HASHED_PREFIX_BYTES: usize = 96;

/// Ids are used as file names. An id that is not a safe file name, or is too
/// long for one, is stored as a readable prefix plus a hash of the full id,
/// so distinct ids never share a file.
fn file_stem(id: &str) -> String {
    let safe = id.chars().all(|c| {
        !c.is_control() && !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|')
    });
    if safe && !id.is_empty() && id.len() <= MAX_STEM_BYTES {
        return id.to_string();
    }

    let mut prefix = String::new();
    for c in id.chars() {
        if prefix.len() + c.len_utf8() > HASHED_PREFIX_BYTES {
            break;
        }
        prefix.push(match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        });
    }
    let hash = blake3::hash(id.as_bytes()).to_hex();
    format!("{prefix}_{}", &hash.as_str()[..16])
}
