//! Lexical retrieval over the knowledge graph.
//!
//! A [`Retriever`] owns a loaded [`KnowledgeBase`] and is built once per
//! process; afterwards it is only read, so it can be shared across threads
//! behind a plain reference or an `Arc`.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::advisory::fail_open;
use crate::entity::KnowledgeEntity;
use crate::relation::{KnowledgeRelation, RelationType};
use crate::storage::KnowledgeStore;
use crate::{Error, Result};

/// Most entities a single retrieval returns.
pub const MAX_ENTITIES: usize = 20;
/// Scores at or below this are not matches.
pub const SCORE_THRESHOLD: f64 = 0.1;

const NAME_MATCH_SCORE: f64 = 0.5;
const ID_TOKEN_SCORE: f64 = 0.3;

const CONTEXT_ENTITIES: usize = 10;
const CONTEXT_PATHS: usize = 5;
const CONTEXT_CONTENT_CHARS: usize = 200;

#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    entities: Vec<KnowledgeEntity>,
    relations: Vec<KnowledgeRelation>,
}

impl KnowledgeBase {
    /// Loads a store written by [`KnowledgeStore::write`].
    ///
    /// Fails on a missing index, a missing or corrupt record file. Relations
    /// whose endpoints are absent are kept; they never match.
    pub fn load(dir: &Path) -> Result<Self> {
        let store = KnowledgeStore::new(dir);
        let entities = store.load_entities()?;
        let relations = store.load_relations()?;

        let ids: HashSet<&str> = entities.iter().map(|e| e.id.as_str()).collect();
        let dangling = relations
            .iter()
            .filter(|r| {
                !ids.contains(r.source_entity_id.as_str()) || !ids.contains(r.target_entity_id.as_str())
            })
            .count();
        if dangling > 0 {
            tracing::warn!("{} relations reference missing entities", dangling);
        }

        tracing::info!(
            "Loaded knowledge base from {}: {} entities, {} relations",
            dir.display(),
            entities.len(),
            relations.len()
        );
        Ok(Self::from_parts(entities, relations))
    }

    #[must_use]
    pub fn from_parts(entities: Vec<KnowledgeEntity>, relations: Vec<KnowledgeRelation>) -> Self {
        Self {
            entities,
            relations,
        }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn entities(&self) -> &[KnowledgeEntity] {
        &self.entities
    }

    #[must_use]
    pub fn relations(&self) -> &[KnowledgeRelation] {
        &self.relations
    }

    #[must_use]
    pub fn entity(&self, id: &str) -> Option<&KnowledgeEntity> {
        self.entities.iter().find(|e| e.id == id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub entities: Vec<KnowledgeEntity>,
    pub relations: Vec<KnowledgeRelation>,
    /// `[source_id, target_id]` pairs whose endpoints both matched.
    pub inference_paths: Vec<Vec<String>>,
    pub confidence: f64,
}

impl RetrievalResult {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Bulleted summary for a downstream reasoning prompt. Empty when
    /// nothing matched.
    #[must_use]
    pub fn render_context(&self) -> String {
        if self.entities.is_empty() {
            return String::new();
        }

        let mut out = String::from("## Relevant knowledge\n\n### Concepts and rules\n");
        for entity in self
            .entities
            .iter()
            .filter(|e| !e.name.is_empty() && !e.content.is_empty())
            .take(CONTEXT_ENTITIES)
        {
            let _ = writeln!(out, "- **{}**: {}", entity.name, truncate(&entity.content));
        }

        if !self.inference_paths.is_empty() {
            out.push_str("\n### Inference paths\n");
            for path in self.inference_paths.iter().take(CONTEXT_PATHS) {
                let _ = writeln!(out, "- {}", path.join(" → "));
            }
        }

        out
    }
}

fn truncate(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(CONTEXT_CONTENT_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResult {
    #[serde(rename = "type")]
    pub kind: RelationType,
    pub source: String,
    pub target: String,
    pub strength: f64,
    pub path: Vec<String>,
}

pub struct Retriever {
    knowledge: KnowledgeBase,
}

impl Retriever {
    #[must_use]
    pub fn new(knowledge: KnowledgeBase) -> Self {
        Self { knowledge }
    }

    /// Loads the store at `dir`. Any load failure is returned to the caller.
    pub fn open(dir: &Path) -> Result<Self> {
        Ok(Self::new(KnowledgeBase::load(dir)?))
    }

    #[must_use]
    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    pub fn try_retrieve(&self, query: &str) -> Result<RetrievalResult> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Ok(RetrievalResult::default());
        }

        let words: Vec<&str> = query.split_whitespace().collect();
        let mut scored: Vec<(&KnowledgeEntity, f64)> = self
            .knowledge
            .entities
            .iter()
            .map(|entity| (entity, score(entity, &query, &words)))
            .filter(|(_, score)| *score > SCORE_THRESHOLD)
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(MAX_ENTITIES);

        let ids: HashSet<&str> = scored.iter().map(|(e, _)| e.id.as_str()).collect();
        let relations: Vec<KnowledgeRelation> = self
            .knowledge
            .relations
            .iter()
            .filter(|r| ids.contains(r.source_entity_id.as_str()) || ids.contains(r.target_entity_id.as_str()))
            .cloned()
            .collect();
        let inference_paths: Vec<Vec<String>> = relations
            .iter()
            .filter(|r| ids.contains(r.source_entity_id.as_str()) && ids.contains(r.target_entity_id.as_str()))
            .map(|r| vec![r.source_entity_id.clone(), r.target_entity_id.clone()])
            .collect();

        let confidence = confidence(scored.len(), &relations);
        if !confidence.is_finite() {
            return Err(Error::NonFinite("retrieval confidence"));
        }

        tracing::debug!(
            "Query matched {} entities, {} relations, {} paths",
            scored.len(),
            relations.len(),
            inference_paths.len()
        );

        Ok(RetrievalResult {
            entities: scored.into_iter().map(|(e, _)| e.clone()).collect(),
            relations,
            inference_paths,
            confidence,
        })
    }

    /// Never fails; an internal error yields an empty result.
    #[must_use]
    pub fn retrieve(&self, query: &str) -> RetrievalResult {
        fail_open(self.try_retrieve(query), "retrieval")
    }

    /// Implication, exclusion and containment edges leaving `entity_ids`.
    pub fn try_infer(&self, entity_ids: &[&str]) -> Result<Vec<InferenceResult>> {
        let ids: HashSet<&str> = entity_ids.iter().copied().collect();

        self.knowledge
            .relations
            .iter()
            .filter(|r| r.relation_type.is_inferential() && ids.contains(r.source_entity_id.as_str()))
            .map(|r| {
                if !r.strength.is_finite() {
                    return Err(Error::NonFinite("relation strength"));
                }
                Ok(InferenceResult {
                    kind: r.relation_type,
                    source: r.source_entity_id.clone(),
                    target: r.target_entity_id.clone(),
                    strength: r.strength,
                    path: vec![r.source_entity_id.clone(), r.target_entity_id.clone()],
                })
            })
            .collect()
    }

    #[must_use]
    pub fn infer(&self, entity_ids: &[&str]) -> Vec<InferenceResult> {
        fail_open(self.try_infer(entity_ids), "inference")
    }
}

/// Relevance of `entity` to a lowercased, non-empty query.
fn score(entity: &KnowledgeEntity, query: &str, words: &[&str]) -> f64 {
    let mut score = 0.0;

    let name = entity.name.to_lowercase();
    if !name.is_empty() && (name.contains(query) || query.contains(name.as_str())) {
        score += NAME_MATCH_SCORE;
    }

    if !entity.content.is_empty() {
        let content = entity.content.to_lowercase();
        let content_words: HashSet<&str> = content.split_whitespace().collect();
        let query_words: HashSet<&str> = words.iter().copied().collect();
        let common = query_words.intersection(&content_words).count();
        if common > 0 {
            score += common as f64 / query_words.len().max(content_words.len()) as f64;
        }
    }

    let id = entity.id.to_lowercase();
    for word in words {
        if id.contains(word) {
            score += ID_TOKEN_SCORE;
        }
    }

    score
}

fn confidence(matched: usize, relations: &[KnowledgeRelation]) -> f64 {
    if matched == 0 {
        return 0.0;
    }

    let entity_score = (matched as f64 / 10.0).min(1.0);
    let relation_score = if relations.is_empty() {
        0.0
    } else {
        relations.iter().map(|r| r.strength).sum::<f64>() / relations.len() as f64
    };

    (0.6 * entity_score + 0.4 * relation_score).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityType;
    use crate::ingest::KnowledgeBuilder;
    use crate::config::Vocabulary;
    use tempfile::TempDir;

    const FIXTURES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

    fn small() -> KnowledgeBase {
        KnowledgeBase::from_parts(
            vec![
                KnowledgeEntity::new(EntityType::Concept, "birads_3", "BI-RADS 3", "probably benign"),
                KnowledgeEntity::new(EntityType::Concept, "probably benign", "probably benign", "BI-RADS 3"),
                KnowledgeEntity::new(EntityType::Term, "oval", "oval", "oval shape"),
            ],
            vec![
                KnowledgeRelation::new("concept_birads_3", "concept_probably_benign", RelationType::Equivalent),
                KnowledgeRelation::new("concept_birads_3", "concept_missing", RelationType::Exclusive)
                    .with_strength(0.5),
                KnowledgeRelation::new("term_oval", "concept_birads_3", RelationType::Contains),
            ],
        )
    }

    #[test]
    fn test_score_components() {
        let kb = small();
        let label = &kb.entities()[0];
        // Name match plus the "3" token inside the id.
        assert!((score(label, "bi-rads 3", &["bi-rads", "3"]) - 0.8).abs() < 1e-9);
        // Name match, one shared word out of max(1, 2), and the id token.
        let oval = &kb.entities()[2];
        assert!((score(oval, "oval", &["oval"]) - (0.5 + 0.5 + 0.3)).abs() < 1e-9);
        assert!(score(label, "hyperechoic", &["hyperechoic"]).abs() < f64::EPSILON);
    }

    #[test]
    fn test_retrieve_expands_one_hop() {
        let retriever = Retriever::new(small());
        let result = retriever.retrieve("BI-RADS 3");

        // The descriptor's content matches both query words and outranks the label.
        let ids: Vec<&str> = result.entities.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["concept_probably_benign", "concept_birads_3"]);

        // All three relations touch the label; only the equivalence has both ends matched.
        assert_eq!(result.relations.len(), 3);
        assert_eq!(
            result.inference_paths,
            vec![vec!["concept_birads_3".to_string(), "concept_probably_benign".to_string()]]
        );
    }

    #[test]
    fn test_confidence_formula() {
        let retriever = Retriever::new(small());
        let result = retriever.retrieve("BI-RADS 3");
        let expected = 0.6 * (result.entities.len() as f64 / 10.0) + 0.4 * (2.5 / 3.0);
        assert!((result.confidence - expected).abs() < 1e-9);
    }

    #[test]
    fn test_empty_inputs() {
        let retriever = Retriever::new(KnowledgeBase::empty());
        let result = retriever.retrieve("BI-RADS 4A spiculated");
        assert!(result.entities.is_empty());
        assert!(result.confidence.abs() < f64::EPSILON);
        assert!(result.render_context().is_empty());

        let retriever = Retriever::new(small());
        assert!(retriever.retrieve("   ").is_empty());
        assert!(retriever.retrieve("").is_empty());
    }

    #[test]
    fn test_result_is_capped() {
        let entities = (0..40)
            .map(|i| KnowledgeEntity::new(EntityType::Term, &format!("oval {i}"), format!("oval {i}"), "oval"))
            .collect();
        let retriever = Retriever::new(KnowledgeBase::from_parts(entities, Vec::new()));
        let result = retriever.retrieve("oval");
        assert_eq!(result.entities.len(), MAX_ENTITIES);
        assert!((result.confidence - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_infer_filters_types_and_direction() {
        let retriever = Retriever::new(small());

        let results = retriever.infer(&["concept_birads_3"]);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].kind, RelationType::Exclusive);
        assert_eq!(results[0].target, "concept_missing");
        assert!((results[0].strength - 0.5).abs() < f64::EPSILON);

        let results = retriever.infer(&["term_oval"]);
        assert_eq!(results[0].kind, RelationType::Contains);
        assert_eq!(results[0].path, ["term_oval", "concept_birads_3"]);
        assert!(retriever.infer(&[]).is_empty());
    }

    #[test]
    fn test_render_context() {
        let long = "x".repeat(250);
        let result = RetrievalResult {
            entities: vec![KnowledgeEntity::new(EntityType::Rule, "r", "Follow-up", long)],
            relations: Vec::new(),
            inference_paths: vec![vec!["a".into(), "b".into()]],
            confidence: 0.1,
        };
        let context = result.render_context();
        assert!(context.contains(&format!("- **Follow-up**: {}…\n", "x".repeat(200))));
        assert!(context.contains("- a → b\n"));
    }

    #[test]
    fn test_open_built_store() {
        let kb_dir = TempDir::new().unwrap();
        let built = KnowledgeBuilder::new(Vocabulary::default())
            .unwrap()
            .build_paths(&[Path::new(FIXTURES).to_path_buf()]);
        KnowledgeStore::new(kb_dir.path())
            .write(&built.knowledge.entities, &built.knowledge.relations)
            .unwrap();

        let retriever = Retriever::open(kb_dir.path()).unwrap();
        assert_eq!(retriever.knowledge_base().entities().len(), built.knowledge.entity_count());

        let result = retriever.retrieve("spiculated margin");
        assert!(result
            .entities
            .iter()
            .any(|e| e.id == "concept_malignant_spiculated_margin"));
        assert!(result.confidence > 0.0);

        let inferred = retriever.infer(&["concept_malignant_spiculated_margin"]);
        assert!(inferred
            .iter()
            .any(|r| r.kind == RelationType::Implies && r.target == "concept_birads_4"));
    }

    #[test]
    fn test_open_missing_store_fails() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Retriever::open(dir.path()),
            Err(Error::KnowledgeBaseMissing(_))
        ));
    }
}
