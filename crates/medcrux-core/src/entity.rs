use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Axiom,
    Concept,
    Term,
    Rule,
}

impl EntityType {
    pub const ALL: [Self; 4] = [Self::Axiom, Self::Concept, Self::Term, Self::Rule];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Axiom => "axiom",
            Self::Concept => "concept",
            Self::Term => "term",
            Self::Rule => "rule",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "axiom" => Ok(Self::Axiom),
            "concept" => Ok(Self::Concept),
            "term" => Ok(Self::Term),
            "rule" => Ok(Self::Rule),
            _ => Err(crate::Error::InvalidEntityType(s.to_string())),
        }
    }
}

/// What a concept entity stands for in the relation graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConceptRole {
    ClassificationLabel,
    RiskSign,
    MalignantSign,
    Descriptor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMetadata {
    pub created_date: NaiveDate,
    pub author: String,
    #[serde(default)]
    pub references: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub axiom_number: Option<String>,
    /// Classification label a label concept or descriptor concept refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concept_role: Option<ConceptRole>,
}

impl EntityMetadata {
    #[must_use]
    pub fn new(created_date: NaiveDate, author: impl Into<String>) -> Self {
        Self {
            created_date,
            author: author.into(),
            references: Vec::new(),
            axiom_number: None,
            label: None,
            category: None,
            concept_role: None,
        }
    }

    #[must_use]
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        let reference = reference.into();
        if !reference.is_empty() && !self.references.contains(&reference) {
            self.references.push(reference);
        }
        self
    }

    #[must_use]
    pub fn with_axiom_number(mut self, number: impl Into<String>) -> Self {
        self.axiom_number = Some(number.into());
        self
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    #[must_use]
    pub fn with_role(mut self, role: ConceptRole) -> Self {
        self.concept_role = Some(role);
        self
    }
}

impl Default for EntityMetadata {
    fn default() -> Self {
        Self::new(Local::now().date_naive(), "")
    }
}

/// A node of the knowledge graph. Built once from a source document and
/// never mutated after it has been written to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntity {
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub name: String,
    pub content: String,
    pub source: String,
    /// Lower is more authoritative.
    pub priority: u8,
    pub metadata: EntityMetadata,
    /// Reserved for vector search; always empty.
    #[serde(default)]
    pub embeddings: Vec<f32>,
}

impl KnowledgeEntity {
    /// Creates an entity whose id is derived from its type and `key`.
    #[must_use]
    pub fn new(
        entity_type: EntityType,
        key: &str,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: entity_id(entity_type, key),
            entity_type,
            name: name.into(),
            content: content.into(),
            source: String::new(),
            priority: 1,
            metadata: EntityMetadata::default(),
            embeddings: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>, priority: u8) -> Self {
        self.source = source.into();
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: EntityMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    #[must_use]
    pub fn role(&self) -> Option<ConceptRole> {
        match self.entity_type {
            EntityType::Concept => self.metadata.concept_role,
            _ => None,
        }
    }

    /// The classification label of a label concept, e.g. `"4A"`.
    #[must_use]
    pub fn classification_label(&self) -> Option<&str> {
        match self.role() {
            Some(ConceptRole::ClassificationLabel) => self.metadata.label.as_deref(),
            _ => None,
        }
    }
}

/// Stable id for an entity: `<type>_<normalized key>`.
#[must_use]
pub fn entity_id(entity_type: EntityType, key: &str) -> String {
    format!("{}_{}", entity_type.as_str(), normalize_key(key))
}

/// Lowercases `key` and folds whitespace, `-` and `.` runs into single underscores.
#[must_use]
pub fn normalize_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut pending_sep = false;

    for c in key.trim().chars() {
        if c.is_whitespace() || c == '-' || c == '.' || c == '_' {
            pending_sep = !out.is_empty();
            continue;
        }
        if pending_sep {
            out.push('_');
            pending_sep = false;
        }
        out.extend(c.to_lowercase());
    }

    out
}
