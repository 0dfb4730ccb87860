use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{Local, NaiveDate};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::parser::{heading_level, DocumentFormat, ParsedDocument};
use crate::config::Vocabulary;
use crate::entity::{normalize_key, ConceptRole, EntityMetadata, EntityType, KnowledgeEntity};

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Extraction failed: {0}")]
    Failed(String),
    #[error("Invalid extraction pattern: {0}")]
    Pattern(#[from] regex::Error),
}

pub type ExtractionResult<T> = Result<T, ExtractionError>;

/// Most glossary terms taken from a single guideline.
pub const GUIDELINE_TERM_LIMIT: usize = 50;

const TERM_KEY_CHARS: usize = 30;

static AXIOM_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^##\s+(?:公理|Axiom\s*)(\d+)\s*[:：]\s*(.+?)\s*$")
        .expect("axiom heading pattern is valid")
});

static AXIOM_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\*\*(?:公理|Axiom\s*)(\d+)\.(\d+)\s+(.+?)\*\*\s*(.*)$")
        .expect("axiom clause pattern is valid")
});

static LABEL_MENTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)BI-RADS\s*[：:]?\s*([0-6][ABC]?)(?:\s*类|\b)")
        .expect("label mention pattern is valid")
});

static TERM_BULLET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*[-•*]\s+([^（(]+?)\s*[（(]([^）)]+)[）)]")
        .expect("term bullet pattern is valid")
});

const GUIDELINE_LABEL_PATTERN: &str = r"(?i)BI-RADS\s*[：:]\s*([0-6][ABC]?)";

const GUIDELINE_GLOSS_PATTERN: &str = concat!(
    r"([^，。；：\s（(]+?)\s*[（(]([A-Za-z][A-Za-z\s\-]*)[）)]",
    r"|([A-Za-z][A-Za-z\s\-]*?)\s*[（(]([^）)]+)[）)]",
);

/// How a source document contributes to the knowledge base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentRole {
    /// Curated Markdown with numbered axiom sections.
    Axioms,
    /// Curated Markdown without axiom sections.
    Concepts,
    /// Third-party guideline text.
    Guideline,
}

impl DocumentRole {
    #[must_use]
    pub fn detect(document: &ParsedDocument) -> Self {
        match document.format {
            DocumentFormat::Markdown
                if document
                    .raw_content
                    .lines()
                    .any(|line| AXIOM_HEADING.is_match(line.trim_end())) =>
            {
                Self::Axioms
            }
            DocumentFormat::Markdown => Self::Concepts,
            DocumentFormat::PlainText | DocumentFormat::Pdf => Self::Guideline,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Axioms => "axioms",
            Self::Concepts => "concepts",
            Self::Guideline => "guideline",
        }
    }
}

/// Source attribution stamped onto every entity a document yields.
#[derive(Debug, Clone, PartialEq)]
pub struct Provenance {
    pub source: String,
    pub author: String,
    pub priority: u8,
    pub created_date: NaiveDate,
    pub reference: String,
}

impl Provenance {
    #[must_use]
    pub fn for_document(document: &ParsedDocument, role: DocumentRole, vocabulary: &Vocabulary) -> Self {
        let metadata = &document.metadata;
        let created_date = metadata
            .created_date
            .unwrap_or_else(|| Local::now().date_naive());

        match role {
            DocumentRole::Axioms | DocumentRole::Concepts => Self {
                source: vocabulary.axioms.source.clone(),
                author: metadata
                    .maintainer
                    .clone()
                    .unwrap_or_else(|| vocabulary.axioms.author.clone()),
                priority: 1,
                created_date,
                reference: document.path.display().to_string(),
            },
            DocumentRole::Guideline => {
                let file_name = document.file_name();
                let source = metadata
                    .title
                    .clone()
                    .or_else(|| metadata.filename.clone())
                    .or_else(|| (!file_name.is_empty()).then(|| file_name.clone()))
                    .unwrap_or_else(|| "guideline".to_string());
                Self {
                    source,
                    author: "Extractor".to_string(),
                    priority: 2,
                    created_date,
                    reference: file_name,
                }
            }
        }
    }

    #[must_use]
    pub fn metadata(&self) -> EntityMetadata {
        EntityMetadata::new(self.created_date, &self.author).with_reference(&self.reference)
    }
}

/// Everything an extractor may consult while reading one document.
pub struct ExtractionContext<'a> {
    pub document: &'a ParsedDocument,
    pub vocabulary: &'a Vocabulary,
    pub role: DocumentRole,
    pub provenance: Provenance,
}

impl<'a> ExtractionContext<'a> {
    #[must_use]
    pub fn new(document: &'a ParsedDocument, vocabulary: &'a Vocabulary) -> Self {
        let role = DocumentRole::detect(document);
        Self {
            document,
            vocabulary,
            role,
            provenance: Provenance::for_document(document, role, vocabulary),
        }
    }

    /// An entity carrying this document's source, priority and references.
    #[must_use]
    pub fn entity(
        &self,
        entity_type: EntityType,
        key: &str,
        name: impl Into<String>,
        content: impl Into<String>,
        metadata: EntityMetadata,
    ) -> KnowledgeEntity {
        KnowledgeEntity::new(entity_type, key, name, content)
            .with_source(&self.provenance.source, self.provenance.priority)
            .with_metadata(metadata)
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.document.raw_content
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionOutput {
    pub entities: Vec<KnowledgeEntity>,
}

impl ExtractionOutput {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_entity(mut self, entity: KnowledgeEntity) -> Self {
        self.push(entity);
        self
    }

    /// Adds `entity` unless one with the same id is already present.
    pub fn push(&mut self, entity: KnowledgeEntity) -> bool {
        if self.entities.iter().any(|e| e.id == entity.id) {
            tracing::debug!("Skipping duplicate entity {}", entity.id);
            return false;
        }
        self.entities.push(entity);
        true
    }

    pub fn merge(&mut self, other: ExtractionOutput) {
        for entity in other.entities {
            self.push(entity);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

pub trait Extractor: Send + Sync {
    fn name(&self) -> &'static str;

    fn applies_to(&self, role: DocumentRole) -> bool;

    fn extract(&self, context: &ExtractionContext<'_>) -> ExtractionResult<ExtractionOutput>;
}

/// One `**Axiom N.M title**` clause and the text under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxiomClause {
    pub axiom: u32,
    pub clause: u32,
    pub axiom_title: String,
    pub title: String,
    pub body: String,
}

impl AxiomClause {
    #[must_use]
    pub fn number(&self) -> String {
        format!("{}.{}", self.axiom, self.clause)
    }

    /// Labels named in the clause title, uppercased.
    #[must_use]
    pub fn title_labels(&self) -> Vec<String> {
        LABEL_MENTION
            .captures_iter(&self.title)
            .map(|c| c[1].to_uppercase())
            .collect()
    }
}

/// Splits an axioms document into its clauses.
///
/// A clause runs from its bold heading line to the next bold line or heading.
/// A level-2 heading that is not an axiom heading closes the current axiom.
#[must_use]
pub fn axiom_clauses(text: &str) -> Vec<AxiomClause> {
    fn close(clauses: &mut Vec<AxiomClause>, open: Option<(AxiomClause, Vec<&str>)>) {
        if let Some((mut clause, body)) = open {
            clause.body = body.join("\n").trim().to_string();
            clauses.push(clause);
        }
    }

    let mut clauses = Vec::new();
    let mut axiom: Option<(u32, String)> = None;
    let mut open: Option<(AxiomClause, Vec<&str>)> = None;

    for line in text.lines() {
        let line = line.trim_end();

        if let Some(level) = heading_level(line) {
            close(&mut clauses, open.take());
            if level <= 2 {
                axiom = AXIOM_HEADING.captures(line.trim_start()).and_then(|c| {
                    let number = c[1].parse().ok()?;
                    Some((number, c[2].trim().to_string()))
                });
            }
            continue;
        }

        if line.trim_start().starts_with("**") {
            close(&mut clauses, open.take());
            let Some((_, axiom_title)) = &axiom else {
                continue;
            };
            let Some(c) = AXIOM_CLAUSE.captures(line.trim_start()) else {
                continue;
            };
            let (Ok(number), Ok(clause)) = (c[1].parse(), c[2].parse()) else {
                tracing::warn!("Skipping axiom clause with unreadable number: {}", line);
                continue;
            };
            let mut body = Vec::new();
            let rest = c.get(4).map_or("", |m| m.as_str()).trim();
            if !rest.is_empty() {
                body.push(rest);
            }
            open = Some((
                AxiomClause {
                    axiom: number,
                    clause,
                    axiom_title: axiom_title.clone(),
                    title: c[3].trim().to_string(),
                    body: String::new(),
                },
                body,
            ));
            continue;
        }

        if let Some((_, body)) = open.as_mut() {
            body.push(line);
        }
    }

    close(&mut clauses, open.take());
    clauses
}

/// Distinct labels mentioned anywhere in `text`, in order of first mention.
#[must_use]
pub fn label_mentions(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    LABEL_MENTION
        .captures_iter(text)
        .map(|c| c[1].to_uppercase())
        .filter(|label| seen.insert(label.clone()))
        .collect()
}

fn term_key(name: &str) -> String {
    normalize_key(name).chars().take(TERM_KEY_CHARS).collect()
}

/// Axiom clauses, glossary terms and report rules from an axioms document.
#[derive(Debug, Default)]
pub struct AxiomExtractor;

impl AxiomExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Extractor for AxiomExtractor {
    fn name(&self) -> &'static str {
        "axioms"
    }

    fn applies_to(&self, role: DocumentRole) -> bool {
        role == DocumentRole::Axioms
    }

    fn extract(&self, context: &ExtractionContext<'_>) -> ExtractionResult<ExtractionOutput> {
        let roles = &context.vocabulary.axioms;
        let mut output = ExtractionOutput::new();

        for clause in axiom_clauses(context.text()) {
            output.push(context.entity(
                EntityType::Axiom,
                &format!("{}_{}", clause.axiom, clause.clause),
                format!("{} - {}", clause.axiom_title, clause.title),
                clause.body.clone(),
                context.provenance.metadata().with_axiom_number(clause.number()),
            ));

            if clause.axiom == roles.terminology {
                for line in clause.body.lines() {
                    let Some(c) = TERM_BULLET.captures(line) else {
                        continue;
                    };
                    let name = c[1].trim();
                    if name.is_empty() {
                        continue;
                    }
                    output.push(context.entity(
                        EntityType::Term,
                        &term_key(name),
                        name,
                        format!("{} ({})", name, c[2].trim()),
                        context
                            .provenance
                            .metadata()
                            .with_axiom_number(clause.number())
                            .with_category(&clause.title),
                    ));
                }
            }

            if clause.axiom == roles.rules {
                output.push(context.entity(
                    EntityType::Rule,
                    &clause.title,
                    clause.title.clone(),
                    clause.body.clone(),
                    context.provenance.metadata().with_axiom_number(clause.number()),
                ));
            }
        }

        Ok(output)
    }
}

/// Label, risk-sign and descriptor concepts from curated Markdown.
#[derive(Debug, Default)]
pub struct ConceptExtractor;

impl ConceptExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Extractor for ConceptExtractor {
    fn name(&self) -> &'static str {
        "concepts"
    }

    fn applies_to(&self, role: DocumentRole) -> bool {
        matches!(role, DocumentRole::Axioms | DocumentRole::Concepts)
    }

    fn extract(&self, context: &ExtractionContext<'_>) -> ExtractionResult<ExtractionOutput> {
        let vocabulary = context.vocabulary;
        let text = context.text();
        let classification: Vec<AxiomClause> = axiom_clauses(text)
            .into_iter()
            .filter(|c| c.axiom == vocabulary.axioms.classification)
            .collect();
        let mut output = ExtractionOutput::new();

        for label in label_mentions(text) {
            let description = classification
                .iter()
                .find(|c| c.title_labels().contains(&label))
                .map_or_else(
                    || format!("BI-RADS {label}"),
                    |c| format!("{}\n{}", c.title, c.body),
                );
            output.push(context.entity(
                EntityType::Concept,
                &format!("birads_{label}"),
                format!("BI-RADS {label}"),
                description,
                context
                    .provenance
                    .metadata()
                    .with_label(&label)
                    .with_role(ConceptRole::ClassificationLabel),
            ));
        }

        for sign in &vocabulary.concepts.risk_signs {
            output.push(context.entity(
                EntityType::Concept,
                &format!("malignant {sign}"),
                sign.clone(),
                format!("{sign} is a highly suspicious malignant sign"),
                context.provenance.metadata().with_role(ConceptRole::RiskSign),
            ));
        }

        output.push(context.entity(
            EntityType::Concept,
            "malignant sign",
            vocabulary.concepts.malignant_sign.clone(),
            "Any finding suggestive of malignancy",
            context
                .provenance
                .metadata()
                .with_role(ConceptRole::MalignantSign),
        ));

        let lowered = text.to_lowercase();
        for descriptor in &vocabulary.concepts.descriptors {
            if !lowered.contains(&descriptor.name.to_lowercase()) {
                continue;
            }
            output.push(context.entity(
                EntityType::Concept,
                &descriptor.name,
                descriptor.name.clone(),
                format!("{} (BI-RADS {})", descriptor.name, descriptor.label),
                context
                    .provenance
                    .metadata()
                    .with_label(&descriptor.label)
                    .with_role(ConceptRole::Descriptor),
            ));
        }

        Ok(output)
    }
}

pub type PatternHandler = fn(&Captures<'_>, &ExtractionContext<'_>) -> Option<KnowledgeEntity>;

/// A regex paired with the function that turns each match into an entity.
pub struct ExtractionPattern {
    pub name: &'static str,
    pub regex: Regex,
    pub handler: PatternHandler,
    /// Most distinct entities this pattern may contribute per document.
    pub limit: Option<usize>,
}

impl ExtractionPattern {
    pub fn new(name: &'static str, pattern: &str, handler: PatternHandler) -> Result<Self, regex::Error> {
        Ok(Self {
            name,
            regex: Regex::new(pattern)?,
            handler,
            limit: None,
        })
    }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

fn guideline_label(captures: &Captures<'_>, context: &ExtractionContext<'_>) -> Option<KnowledgeEntity> {
    let label = captures.get(1)?.as_str().to_uppercase();
    Some(context.entity(
        EntityType::Concept,
        &format!("birads_{label}"),
        format!("BI-RADS {label}"),
        format!("BI-RADS {label} as referenced in {}", context.provenance.source),
        context
            .provenance
            .metadata()
            .with_label(&label)
            .with_role(ConceptRole::ClassificationLabel),
    ))
}

fn guideline_gloss(captures: &Captures<'_>, context: &ExtractionContext<'_>) -> Option<KnowledgeEntity> {
    let name = captures.get(1).or_else(|| captures.get(3))?.as_str().trim();
    let gloss = captures.get(2).or_else(|| captures.get(4))?.as_str().trim();
    if !(3..50).contains(&name.chars().count()) || gloss.is_empty() {
        return None;
    }

    Some(context.entity(
        EntityType::Term,
        &term_key(name),
        name,
        format!("{name} ({gloss})"),
        context.provenance.metadata(),
    ))
}

/// Applies regex patterns in order; the first entity produced for an id wins.
pub struct RuleBasedExtractor {
    patterns: Vec<ExtractionPattern>,
    roles: Vec<DocumentRole>,
}

impl RuleBasedExtractor {
    #[must_use]
    pub fn new(roles: Vec<DocumentRole>) -> Self {
        Self {
            patterns: Vec::new(),
            roles,
        }
    }

    #[must_use]
    pub fn with_pattern(mut self, pattern: ExtractionPattern) -> Self {
        self.patterns.push(pattern);
        self
    }

    /// Label references and bilingual glossary terms in guideline text.
    pub fn guideline() -> ExtractionResult<Self> {
        Ok(Self::new(vec![DocumentRole::Guideline])
            .with_pattern(ExtractionPattern::new(
                "label",
                GUIDELINE_LABEL_PATTERN,
                guideline_label,
            )?)
            .with_pattern(
                ExtractionPattern::new("gloss", GUIDELINE_GLOSS_PATTERN, guideline_gloss)?
                    .with_limit(GUIDELINE_TERM_LIMIT),
            ))
    }
}

impl Extractor for RuleBasedExtractor {
    fn name(&self) -> &'static str {
        "rules"
    }

    fn applies_to(&self, role: DocumentRole) -> bool {
        self.roles.contains(&role)
    }

    fn extract(&self, context: &ExtractionContext<'_>) -> ExtractionResult<ExtractionOutput> {
        let mut output = ExtractionOutput::new();

        for pattern in &self.patterns {
            let mut taken = 0;
            for captures in pattern.regex.captures_iter(context.text()) {
                if pattern.limit.is_some_and(|limit| taken >= limit) {
                    tracing::debug!("Pattern {} reached its limit of {}", pattern.name, taken);
                    break;
                }
                if let Some(entity) = (pattern.handler)(&captures, context) {
                    if output.push(entity) {
                        taken += 1;
                    }
                }
            }
        }

        Ok(output)
    }
}

pub struct CompositeExtractor {
    extractors: Vec<Box<dyn Extractor>>,
}

impl CompositeExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self {
            extractors: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_extractor(mut self, extractor: Box<dyn Extractor>) -> Self {
        self.extractors.push(extractor);
        self
    }

    /// Axiom, concept and guideline extraction.
    pub fn standard() -> ExtractionResult<Self> {
        Ok(Self::new()
            .with_extractor(Box::new(AxiomExtractor::new()))
            .with_extractor(Box::new(ConceptExtractor::new()))
            .with_extractor(Box::new(RuleBasedExtractor::guideline()?)))
    }

    pub fn extract_document(
        &self,
        document: &ParsedDocument,
        vocabulary: &Vocabulary,
    ) -> ExtractionResult<ExtractionOutput> {
        self.extract(&ExtractionContext::new(document, vocabulary))
    }
}

impl Default for CompositeExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for CompositeExtractor {
    fn name(&self) -> &'static str {
        "composite"
    }

    fn applies_to(&self, role: DocumentRole) -> bool {
        self.extractors.iter().any(|e| e.applies_to(role))
    }

    fn extract(&self, context: &ExtractionContext<'_>) -> ExtractionResult<ExtractionOutput> {
        let mut combined = ExtractionOutput::new();

        for extractor in self.extractors.iter().filter(|e| e.applies_to(context.role)) {
            let output = extractor.extract(context)?;
            tracing::debug!(
                "{} extractor found {} entities in {}",
                extractor.name(),
                output.len(),
                context.document.path.display()
            );
            combined.merge(output);
        }

        Ok(combined)
    }
}
