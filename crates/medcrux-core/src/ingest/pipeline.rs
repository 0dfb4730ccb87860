use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use walkdir::WalkDir;

use super::extractor::{CompositeExtractor, DocumentRole};
use super::normalizer::{NormalizationOutput, Normalizer};
use super::parser::{CompositeParser, DocumentFormat, ParsedDocument, Parser};
use super::relations::RelationExtractor;
use crate::config::Vocabulary;
use crate::entity::KnowledgeEntity;
use crate::relation::KnowledgeRelation;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Parse error: {0}")]
    Parse(#[from] super::parser::ParseError),
    #[error("Extraction error: {0}")]
    Extraction(#[from] super::extractor::ExtractionError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

pub type BuildResult<T> = Result<T, BuildError>;

#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildStats {
    pub documents: usize,
    pub entities: usize,
    pub relations: usize,
    pub sections_processed: usize,
    pub duration_ms: u64,
}

/// Entities and relations drawn from one document.
pub struct BuildOutput {
    pub document: ParsedDocument,
    pub role: DocumentRole,
    pub entities: Vec<KnowledgeEntity>,
    pub relations: Vec<KnowledgeRelation>,
    pub stats: BuildStats,
}

/// Turns source documents into knowledge entities and relations.
pub struct KnowledgeBuilder {
    parser: Box<dyn Parser>,
    extractor: CompositeExtractor,
    relations: RelationExtractor,
    vocabulary: Vocabulary,
}

impl KnowledgeBuilder {
    pub fn new(vocabulary: Vocabulary) -> BuildResult<Self> {
        Ok(Self {
            parser: Box::new(CompositeParser::default()),
            extractor: CompositeExtractor::standard()?,
            relations: RelationExtractor::new(&vocabulary),
            vocabulary,
        })
    }

    #[must_use]
    pub fn with_parser(mut self, parser: Box<dyn Parser>) -> Self {
        self.parser = parser;
        self
    }

    #[must_use]
    pub fn with_extractor(mut self, extractor: CompositeExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn parse(&self, path: &Path) -> BuildResult<ParsedDocument> {
        Ok(self.parser.parse_file(path)?)
    }

    pub fn extract_entities(&self, document: &ParsedDocument) -> BuildResult<Vec<KnowledgeEntity>> {
        Ok(self
            .extractor
            .extract_document(document, &self.vocabulary)?
            .entities)
    }

    /// Relations among the entities of a single document.
    #[must_use]
    pub fn extract_relations(
        &self,
        document: &ParsedDocument,
        entities: &[KnowledgeEntity],
    ) -> Vec<KnowledgeRelation> {
        self.relations.extract(document, entities)
    }

    pub fn build_file(&self, path: &Path) -> BuildResult<BuildOutput> {
        let document = self.parse(path)?;
        self.build_document(document)
    }

    pub fn build_document(&self, document: ParsedDocument) -> BuildResult<BuildOutput> {
        let start = Instant::now();
        let role = DocumentRole::detect(&document);

        let entities = self.extract_entities(&document)?;
        let relations = self.extract_relations(&document, &entities);

        let stats = BuildStats {
            documents: 1,
            entities: entities.len(),
            relations: relations.len(),
            sections_processed: document.sections.len().max(1),
            duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        };

        Ok(BuildOutput {
            document,
            role,
            entities,
            relations,
            stats,
        })
    }

    /// Builds every file named in `paths`, descending into directories, and
    /// merges the results into one knowledge base.
    ///
    /// Directory entries are visited in file-name order and only files with a
    /// known document extension are read. A document that fails is logged and
    /// recorded; the batch carries on.
    pub fn build_paths(&self, paths: &[PathBuf]) -> BatchBuildResult {
        let mut result = BatchBuildResult::new();
        let mut normalizer = Normalizer::new();

        for path in paths {
            if !path.is_dir() {
                self.build_one(path, &mut normalizer, &mut result);
                continue;
            }

            for entry in WalkDir::new(path).sort_by_file_name() {
                match entry {
                    Ok(entry) if entry.file_type().is_file() => {
                        if DocumentFormat::from_path(entry.path()).is_some() {
                            self.build_one(entry.path(), &mut normalizer, &mut result);
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        let at = e
                            .path()
                            .map_or_else(|| path.display().to_string(), |p| p.display().to_string());
                        tracing::warn!("Skipping {}: {}", at, e);
                        result.add_failure(at, e.into());
                    }
                }
            }
        }

        result.finish(normalizer);
        tracing::info!(
            "Built {} documents ({} failed): {} entities, {} relations",
            result.success_count(),
            result.failure_count(),
            result.total_stats.entities,
            result.total_stats.relations
        );
        result
    }

    fn build_one(&self, path: &Path, normalizer: &mut Normalizer, result: &mut BatchBuildResult) {
        match self.build_file(path) {
            Ok(output) => {
                tracing::debug!(
                    "Built {} as {}: {} entities, {} relations",
                    path.display(),
                    output.role.as_str(),
                    output.entities.len(),
                    output.relations.len()
                );
                result.add_success(output, normalizer);
            }
            Err(e) => {
                tracing::warn!("Skipping {}: {}", path.display(), e);
                result.add_failure(path.display().to_string(), e);
            }
        }
    }
}

#[derive(Default)]
pub struct BatchBuildResult {
    pub built: Vec<PathBuf>,
    pub failed: Vec<(String, BuildError)>,
    pub total_stats: BuildStats,
    /// The merged knowledge base, ordered by id.
    pub knowledge: NormalizationOutput,
}

impl BatchBuildResult {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn add_success(&mut self, output: BuildOutput, normalizer: &mut Normalizer) {
        self.total_stats.documents += 1;
        self.total_stats.sections_processed += output.stats.sections_processed;
        self.total_stats.duration_ms += output.stats.duration_ms;
        normalizer.add_entities(output.entities);
        normalizer.add_relations(output.relations);
        self.built.push(output.document.path);
    }

    fn add_failure(&mut self, path: String, error: BuildError) {
        self.failed.push((path, error));
    }

    fn finish(&mut self, normalizer: Normalizer) {
        self.knowledge = normalizer.finish();
        self.total_stats.entities = self.knowledge.entity_count();
        self.total_stats.relations = self.knowledge.relation_count();
    }

    #[must_use]
    pub fn success_count(&self) -> usize {
        self.built.len()
    }

    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.failed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityType;
    use tempfile::TempDir;

    const FIXTURES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

    fn sources() -> TempDir {
        let dir = TempDir::new().unwrap();
        for name in [
            "breast_ultrasound_axioms.md",
            "acr_guideline.txt",
            "guidelines_metadata.json",
        ] {
            std::fs::copy(Path::new(FIXTURES).join(name), dir.path().join(name)).unwrap();
        }
        std::fs::write(dir.path().join("scan.pdf"), b"%PDF-1.4").unwrap();
        dir
    }

    fn builder() -> KnowledgeBuilder {
        KnowledgeBuilder::new(Vocabulary::default()).unwrap()
    }

    #[test]
    fn test_build_file() {
        let output = builder()
            .build_file(&Path::new(FIXTURES).join("breast_ultrasound_axioms.md"))
            .unwrap();

        assert_eq!(output.role, DocumentRole::Axioms);
        assert_eq!(output.stats.documents, 1);
        assert_eq!(output.stats.entities, output.entities.len());
        assert!(output.entities.iter().any(|e| e.entity_type == EntityType::Axiom));
        assert!(!output.relations.is_empty());
    }

    #[test]
    fn test_build_paths_skips_failures() {
        let dir = sources();
        let result = builder().build_paths(&[dir.path().to_path_buf()]);

        assert_eq!(result.success_count(), 2);
        assert_eq!(result.failure_count(), 1);
        assert!(result.failed[0].0.ends_with("scan.pdf"));
        assert!(matches!(result.failed[0].1, BuildError::Parse(_)));
        assert_eq!(result.total_stats.documents, 2);
        assert_eq!(result.total_stats.entities, result.knowledge.entity_count());
    }

    #[test]
    fn test_build_paths_merges_by_priority() {
        let dir = sources();
        let result = builder().build_paths(&[dir.path().to_path_buf()]);

        let label = result
            .knowledge
            .entities
            .iter()
            .find(|e| e.id == "concept_birads_3")
            .unwrap();
        assert_eq!(label.priority, 1);
        assert_eq!(label.source, "ACR BI-RADS v2025");
        assert_eq!(label.metadata.references.len(), 2);
        assert!(label.metadata.references.contains(&"acr_guideline.txt".to_string()));

        let guideline_term = result
            .knowledge
            .entities
            .iter()
            .find(|e| e.id == "term_低回声")
            .unwrap();
        assert_eq!(guideline_term.source, "ACR Ultrasound Guideline");
    }

    #[test]
    fn test_build_is_deterministic() {
        let dir = sources();
        let first = builder().build_paths(&[dir.path().to_path_buf()]);
        let second = builder().build_paths(&[dir.path().to_path_buf()]);

        let ids = |r: &BatchBuildResult| -> Vec<String> {
            r.knowledge
                .entities
                .iter()
                .map(|e| e.id.clone())
                .chain(r.knowledge.relations.iter().map(|r| r.id.clone()))
                .collect()
        };
        assert_eq!(ids(&first), ids(&second));
    }

    #[test]
    fn test_missing_path_is_a_failure() {
        let result = builder().build_paths(&[PathBuf::from("/nonexistent/axioms.md")]);
        assert_eq!(result.success_count(), 0);
        assert_eq!(result.failure_count(), 1);
        assert!(matches!(result.failed[0].1, BuildError::Parse(_)));
    }
}
