#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::module_name_repetitions)]

pub mod advisory;
pub mod conditions;
pub mod config;
pub mod entity;
pub mod error;
pub mod findings;
pub mod ingest;
pub mod reconcile;
pub mod relation;
pub mod retrieval;
pub mod risk_signs;
pub mod storage;
pub mod terminology;
pub mod verifier;

pub use conditions::{Comparison, ConditionTable, LabelConditions, Requirement};
pub use config::{Settings, Vocabulary};
pub use entity::{ConceptRole, EntityMetadata, EntityType, KnowledgeEntity};
pub use error::{Error, Result};
pub use findings::{Dimension, ExtractedFindings};
pub use reconcile::{
    compare_sets, compute_urgency, extract_label_set, LabelSet, SetComparison,
    UrgencyAssessment, UrgencyComparison,
};
pub use relation::{KnowledgeRelation, RelationConditions, RelationMetadata, RelationType};
pub use retrieval::{InferenceResult, KnowledgeBase, RetrievalResult, Retriever};
pub use risk_signs::{EvidenceLevel, Observation, RiskSign, RiskSignIdentifier, RiskSignSummary};
pub use storage::KnowledgeStore;
pub use terminology::{Standardizer, TermCheck};
pub use verifier::{
    ConditionCheck, ConsistencyReport, ConsistencyVerifier, RiskLevel, Violation, ViolationKind,
};
