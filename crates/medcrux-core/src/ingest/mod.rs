mod extractor;
mod normalizer;
mod parser;
mod pipeline;
mod relations;

pub use extractor::{
    axiom_clauses, label_mentions, AxiomClause, AxiomExtractor, CompositeExtractor,
    ConceptExtractor, DocumentRole, ExtractionContext, ExtractionError, ExtractionOutput,
    ExtractionPattern, ExtractionResult, Extractor, PatternHandler, Provenance,
    RuleBasedExtractor, GUIDELINE_TERM_LIMIT,
};
pub use normalizer::{NormalizationOutput, Normalizer, Resolution};
pub use parser::{
    CompositeParser, DocumentFormat, DocumentMetadata, GuidelineTextParser, MarkdownParser,
    ParseError, ParseResult, ParsedDocument, Parser, Section, GUIDELINE_METADATA_FILE,
};
pub use pipeline::{
    BatchBuildResult, BuildError, BuildOutput, BuildResult, BuildStats, KnowledgeBuilder,
};
pub use relations::RelationExtractor;
