use std::collections::HashSet;

use super::extractor::{DocumentRole, Provenance};
use super::parser::ParsedDocument;
use crate::config::Vocabulary;
use crate::entity::{ConceptRole, EntityType, KnowledgeEntity};
use crate::reconcile::label_numeral;
use crate::relation::{KnowledgeRelation, RelationConditions, RelationType};

const MALIGNANT_SIGN_STRENGTH: f64 = 0.95;
const SINGLE_SIGN_STRENGTH: f64 = 0.80;
const MULTIPLE_SIGN_STRENGTH: f64 = 0.90;
const CONTAINS_CONFIDENCE: f64 = 0.8;

/// Label reached by one risk sign, and the label reached by several.
const SINGLE_SIGN_LABEL: &str = "4";
const MULTIPLE_SIGN_LABEL: &str = "5";

/// Derives typed edges between the entities extracted from one document.
pub struct RelationExtractor {
    vocabulary: Vocabulary,
}

impl RelationExtractor {
    #[must_use]
    pub fn new(vocabulary: &Vocabulary) -> Self {
        Self {
            vocabulary: vocabulary.clone(),
        }
    }

    #[must_use]
    pub fn extract(&self, document: &ParsedDocument, entities: &[KnowledgeEntity]) -> Vec<KnowledgeRelation> {
        let provenance =
            Provenance::for_document(document, DocumentRole::detect(document), &self.vocabulary);
        let mut edges = Edges::new(&provenance);

        self.implies(entities, &mut edges);
        self.requires(entities, &mut edges);
        Self::equivalent(entities, &mut edges);
        Self::exclusive(entities, &mut edges);
        Self::contains(entities, &mut edges);

        tracing::debug!(
            "Derived {} relations from {}",
            edges.relations.len(),
            document.path.display()
        );
        edges.relations
    }

    fn implies(&self, entities: &[KnowledgeEntity], edges: &mut Edges<'_>) {
        let malignant = entities
            .iter()
            .find(|e| e.role() == Some(ConceptRole::MalignantSign));
        let single = find_label(entities, SINGLE_SIGN_LABEL);
        let multiple = find_label(entities, MULTIPLE_SIGN_LABEL);

        for sign in entities.iter().filter(|e| e.role() == Some(ConceptRole::RiskSign)) {
            if let Some(target) = malignant {
                edges.push(
                    KnowledgeRelation::new(&sign.id, &target.id, RelationType::Implies)
                        .with_strength(MALIGNANT_SIGN_STRENGTH),
                );
            }
            if let Some(target) = single {
                edges.push(
                    KnowledgeRelation::new(&sign.id, &target.id, RelationType::Implies)
                        .with_strength(SINGLE_SIGN_STRENGTH)
                        .with_conditions(RelationConditions {
                            multiple_signs: false,
                        }),
                );
            }
            if let Some(target) = multiple {
                edges.push(
                    KnowledgeRelation::new(&sign.id, &target.id, RelationType::Implies)
                        .with_strength(MULTIPLE_SIGN_STRENGTH)
                        .with_conditions(RelationConditions {
                            multiple_signs: true,
                        }),
                );
            }
        }
    }

    fn requires(&self, entities: &[KnowledgeEntity], edges: &mut Edges<'_>) {
        let keywords: Vec<String> = self
            .vocabulary
            .axioms
            .advice_keywords
            .iter()
            .map(|k| k.to_lowercase())
            .collect();
        let advice: Vec<&KnowledgeEntity> = entities
            .iter()
            .filter(|e| e.entity_type == EntityType::Rule)
            .filter(|e| {
                let name = e.name.to_lowercase();
                keywords.iter().any(|k| name.contains(k.as_str()))
            })
            .collect();

        for concept in entities {
            let Some(label) = concept.classification_label() else {
                continue;
            };
            for rule in advice.iter().filter(|r| mentions_label(&r.content, label)) {
                edges.push(KnowledgeRelation::new(&concept.id, &rule.id, RelationType::Requires));
            }
        }
    }

    fn equivalent(entities: &[KnowledgeEntity], edges: &mut Edges<'_>) {
        let descriptors: Vec<&KnowledgeEntity> = entities
            .iter()
            .filter(|e| e.role() == Some(ConceptRole::Descriptor))
            .collect();

        for concept in entities {
            let Some(label) = concept.classification_label() else {
                continue;
            };
            for descriptor in descriptors
                .iter()
                .filter(|d| d.metadata.label.as_deref() == Some(label))
            {
                edges.push(KnowledgeRelation::new(
                    &concept.id,
                    &descriptor.id,
                    RelationType::Equivalent,
                ));
            }
        }
    }

    /// Labels of different risk tiers exclude each other. Sub-labels of one
    /// tier (4A, 4B, 4C) do not.
    fn exclusive(entities: &[KnowledgeEntity], edges: &mut Edges<'_>) {
        let labels: Vec<(&KnowledgeEntity, u32)> = entities
            .iter()
            .filter_map(|e| {
                let numeral = label_numeral(e.classification_label()?)?;
                Some((e, numeral))
            })
            .collect();

        for (i, (a, a_numeral)) in labels.iter().enumerate() {
            for (b, b_numeral) in &labels[i + 1..] {
                if a_numeral != b_numeral {
                    edges.push(KnowledgeRelation::new(&a.id, &b.id, RelationType::Exclusive));
                }
            }
        }
    }

    fn contains(entities: &[KnowledgeEntity], edges: &mut Edges<'_>) {
        let names: Vec<(&KnowledgeEntity, String)> = entities
            .iter()
            .filter(|e| e.name.trim().chars().count() >= 2)
            .map(|e| (e, e.name.trim().to_lowercase()))
            .collect();

        for outer in entities {
            let content = outer.content.to_lowercase();
            for (inner, name) in &names {
                if inner.id != outer.id && content.contains(name.as_str()) {
                    edges.push(
                        KnowledgeRelation::new(&outer.id, &inner.id, RelationType::Contains)
                            .with_confidence(CONTAINS_CONFIDENCE),
                    );
                }
            }
        }
    }
}

impl Default for RelationExtractor {
    fn default() -> Self {
        Self::new(&Vocabulary::default())
    }
}

struct Edges<'a> {
    provenance: &'a Provenance,
    seen: HashSet<String>,
    relations: Vec<KnowledgeRelation>,
}

impl<'a> Edges<'a> {
    fn new(provenance: &'a Provenance) -> Self {
        Self {
            provenance,
            seen: HashSet::new(),
            relations: Vec::new(),
        }
    }

    fn push(&mut self, relation: KnowledgeRelation) {
        if self.seen.insert(relation.id.clone()) {
            self.relations.push(
                relation.with_provenance(self.provenance.created_date, &self.provenance.author),
            );
        }
    }
}

fn find_label<'a>(entities: &'a [KnowledgeEntity], label: &str) -> Option<&'a KnowledgeEntity> {
    entities
        .iter()
        .find(|e| e.classification_label() == Some(label))
}

/// Whether `label` occurs in `text` as a whole label: "3" matches "BI-RADS 3类"
/// but not "13" or "3A".
fn mentions_label(text: &str, label: &str) -> bool {
    let text = text.to_uppercase();
    text.match_indices(label).any(|(start, matched)| {
        let before = text[..start].chars().next_back();
        let after = text[start + matched.len()..].chars().next();
        !before.is_some_and(|c| c.is_ascii_digit()) && !after.is_some_and(|c| c.is_ascii_alphanumeric())
    })
}
