use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    Implies,
    Equivalent,
    Exclusive,
    Contains,
    Requires,
}

impl RelationType {
    pub const ALL: [Self; 5] = [
        Self::Implies,
        Self::Equivalent,
        Self::Exclusive,
        Self::Contains,
        Self::Requires,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Implies => "implies",
            Self::Equivalent => "equivalent",
            Self::Exclusive => "exclusive",
            Self::Contains => "contains",
            Self::Requires => "requires",
        }
    }

    /// Relation kinds that take part in downstream inference.
    #[must_use]
    pub fn is_inferential(&self) -> bool {
        matches!(self, Self::Implies | Self::Exclusive | Self::Contains)
    }
}

impl std::fmt::Display for RelationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RelationType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "implies" => Ok(Self::Implies),
            "equivalent" => Ok(Self::Equivalent),
            "exclusive" => Ok(Self::Exclusive),
            "contains" => Ok(Self::Contains),
            "requires" => Ok(Self::Requires),
            _ => Err(crate::Error::InvalidRelationType(s.to_string())),
        }
    }
}

/// Structured predicate attached to an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationConditions {
    pub multiple_signs: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationMetadata {
    pub created_date: NaiveDate,
    pub author: String,
    pub confidence: f64,
}

impl Default for RelationMetadata {
    fn default() -> Self {
        Self {
            created_date: Local::now().date_naive(),
            author: String::new(),
            confidence: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeRelation {
    pub id: String,
    pub source_entity_id: String,
    pub target_entity_id: String,
    pub relation_type: RelationType,
    pub strength: f64,
    #[serde(default)]
    pub conditions: Option<RelationConditions>,
    pub metadata: RelationMetadata,
}

impl KnowledgeRelation {
    /// Creates an edge whose id is derived from its type and endpoints.
    /// Strength defaults to 1.0.
    #[must_use]
    pub fn new(source_entity_id: &str, target_entity_id: &str, relation_type: RelationType) -> Self {
        Self {
            id: relation_id(relation_type, source_entity_id, target_entity_id),
            source_entity_id: source_entity_id.to_string(),
            target_entity_id: target_entity_id.to_string(),
            relation_type,
            strength: 1.0,
            conditions: None,
            metadata: RelationMetadata::default(),
        }
    }

    /// Sets the strength and, unless overridden later, the metadata confidence.
    #[must_use]
    pub fn with_strength(mut self, strength: f64) -> Self {
        self.strength = strength.clamp(0.0, 1.0);
        self.metadata.confidence = self.strength;
        self
    }

    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.metadata.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    #[must_use]
    pub fn with_conditions(mut self, conditions: RelationConditions) -> Self {
        self.conditions = Some(conditions);
        self
    }

    #[must_use]
    pub fn with_provenance(mut self, created_date: NaiveDate, author: impl Into<String>) -> Self {
        self.metadata.created_date = created_date;
        self.metadata.author = author.into();
        self
    }

    #[must_use]
    pub fn touches(&self, entity_id: &str) -> bool {
        self.source_entity_id == entity_id || self.target_entity_id == entity_id
    }
}

#[must_use]
pub fn relation_id(relation_type: RelationType, source: &str, target: &str) -> String {
    format!("rel_{}_{source}_{target}", relation_type.as_str())
}
