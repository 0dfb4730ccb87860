use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Encoding error: {0}")]
    Encoding(String),
}

pub type ParseResult<T> = Result<T, ParseError>;

pub const GUIDELINE_METADATA_FILE: &str = "guidelines_metadata.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    PlainText,
    Markdown,
    Pdf,
}

impl DocumentFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "txt" => Some(Self::PlainText),
            "md" | "markdown" => Some(Self::Markdown),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlainText => "plain_text",
            Self::Markdown => "markdown",
            Self::Pdf => "pdf",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub title: Option<String>,
    pub level: u8,
    pub content: String,
    pub start_offset: usize,
    pub end_offset: usize,
}

impl Section {
    #[must_use]
    pub fn new(content: String, start_offset: usize, end_offset: usize) -> Self {
        Self {
            title: None,
            level: 0,
            content,
            start_offset,
            end_offset,
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: String, level: u8) -> Self {
        self.title = Some(title);
        self.level = level;
        self
    }
}

/// Header fields of an authored document, or the sidecar entry of a guideline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintainer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedDocument {
    #[serde(rename = "type")]
    pub format: DocumentFormat,
    pub path: PathBuf,
    pub metadata: DocumentMetadata,
    pub sections: Vec<Section>,
    pub raw_content: String,
}

impl ParsedDocument {
    #[must_use]
    pub fn new(format: DocumentFormat, path: impl Into<PathBuf>, raw_content: String) -> Self {
        Self {
            format,
            path: path.into(),
            metadata: DocumentMetadata::default(),
            sections: Vec::new(),
            raw_content,
        }
    }

    #[must_use]
    pub fn with_sections(mut self, sections: Vec<Section>) -> Self {
        self.sections = sections;
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: DocumentMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    #[must_use]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

pub trait Parser: Send + Sync {
    fn supported_formats(&self) -> &[DocumentFormat];

    fn can_parse(&self, format: DocumentFormat) -> bool {
        self.supported_formats().contains(&format)
    }

    fn parse_bytes(
        &self,
        data: &[u8],
        format: DocumentFormat,
        path: &Path,
    ) -> ParseResult<ParsedDocument>;

    fn parse_file(&self, path: &Path) -> ParseResult<ParsedDocument> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| ParseError::UnsupportedFormat("no extension".into()))?;

        let format = DocumentFormat::from_extension(ext)
            .ok_or_else(|| ParseError::UnsupportedFormat(ext.into()))?;

        if !self.can_parse(format) {
            return Err(ParseError::UnsupportedFormat(format.as_str().into()));
        }

        let data = std::fs::read(path)?;
        self.parse_bytes(&data, format, path)
    }
}

fn decode(data: &[u8]) -> ParseResult<String> {
    String::from_utf8(data.to_vec()).map_err(|e| ParseError::Encoding(e.to_string()))
}

/// Authored Markdown: axiom systems and concept notes.
pub struct MarkdownParser;

impl MarkdownParser {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for MarkdownParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for MarkdownParser {
    fn supported_formats(&self) -> &[DocumentFormat] {
        &[DocumentFormat::Markdown]
    }

    fn parse_bytes(
        &self,
        data: &[u8],
        format: DocumentFormat,
        path: &Path,
    ) -> ParseResult<ParsedDocument> {
        let text = decode(data)?;
        let metadata = markdown_metadata(&text);
        let sections = parse_markdown_sections(&text);

        Ok(ParsedDocument::new(format, path, text)
            .with_metadata(metadata)
            .with_sections(sections))
    }
}

static MAINTAINER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)(?:维护者|Maintainer)\s*[：:]\s*(.+)$").expect("maintainer pattern is valid")
});
static CREATED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:创建日期|Created)\s*[：:]\s*(\d{4}-\d{2}-\d{2})").expect("date pattern is valid")
});
static SOURCE_PRIORITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)(?:数据来源优先级|Source priority)\s*[：:]\s*(.+)$")
        .expect("priority pattern is valid")
});

fn markdown_metadata(text: &str) -> DocumentMetadata {
    let capture = |re: &Regex| {
        re.captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().trim_end_matches("**").trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let title = text
        .lines()
        .find_map(|line| line.strip_prefix("# "))
        .map(|t| t.trim().to_string());

    DocumentMetadata {
        title,
        maintainer: capture(&MAINTAINER),
        created_date: capture(&CREATED).and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
        source_priority: capture(&SOURCE_PRIORITY),
        ..Default::default()
    }
}

/// One section per `##` or `###` heading. Text before the first such
/// heading is not a section.
fn parse_markdown_sections(text: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut current: Option<(String, u8, usize)> = None;
    let mut current_content = String::new();
    let mut offset = 0;

    let mut flush = |current: Option<(String, u8, usize)>, content: &str, end: usize| {
        if let Some((title, level, start)) = current {
            sections.push(Section::new(content.trim().to_string(), start, end).with_title(title, level));
        }
    };

    for line in text.split_inclusive('\n') {
        let bare = line.trim_end_matches(['\r', '\n']);
        match heading_level(bare) {
            Some(level @ 2..=3) => {
                flush(current.take(), &current_content, offset);
                let title = bare.trim_start().trim_start_matches('#').trim().to_string();
                current = Some((title, level, offset));
                current_content.clear();
            }
            _ => {
                if current.is_some() {
                    current_content.push_str(line);
                }
            }
        }
        offset += line.len();
    }
    flush(current, &current_content, text.len());

    sections
}

pub(crate) fn heading_level(line: &str) -> Option<u8> {
    let trimmed = line.trim_start();
    if !trimmed.starts_with('#') {
        return None;
    }

    let level = trimmed.chars().take_while(|c| *c == '#').count();
    if level <= 6 && trimmed.chars().nth(level) == Some(' ') {
        u8::try_from(level).ok()
    } else {
        None
    }
}

/// Guideline text, usually extracted from a PDF elsewhere.
pub struct GuidelineTextParser;

impl GuidelineTextParser {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for GuidelineTextParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for GuidelineTextParser {
    fn supported_formats(&self) -> &[DocumentFormat] {
        &[DocumentFormat::PlainText]
    }

    fn parse_bytes(
        &self,
        data: &[u8],
        format: DocumentFormat,
        path: &Path,
    ) -> ParseResult<ParsedDocument> {
        let text = decode(data)?;
        let metadata = guideline_metadata(path);
        let sections = parse_numbered_sections(&text);

        Ok(ParsedDocument::new(format, path, text)
            .with_metadata(metadata)
            .with_sections(sections))
    }
}

static NUMBERED_HEADINGS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^(\d+[.、])\s*(.+)$",
        r"^([一二三四五六七八九十]+[、．])\s*(.+)$",
        r"^第([一二三四五六七八九十]+)章\s*(.+)$",
        r"^第(\d+)章\s*(.+)$",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

fn numbered_heading(line: &str) -> Option<String> {
    NUMBERED_HEADINGS
        .iter()
        .find_map(|re| re.captures(line))
        .and_then(|c| c.get(2))
        .map(|m| m.as_str().trim().to_string())
}

fn parse_numbered_sections(text: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut current: Option<(String, usize)> = None;
    let mut body: Vec<&str> = Vec::new();
    let mut offset = 0;

    for raw in text.split_inclusive('\n') {
        let line = raw.trim();
        if let Some(title) = numbered_heading(line) {
            if let Some((prev, start)) = current.take() {
                sections.push(Section::new(body.join("\n"), start, offset).with_title(prev, 1));
            }
            current = Some((title, offset));
            body.clear();
        } else if current.is_some() && !line.is_empty() {
            body.push(line);
        }
        offset += raw.len();
    }
    if let Some((title, start)) = current {
        sections.push(Section::new(body.join("\n"), start, text.len()).with_title(title, 1));
    }

    sections
}

#[derive(Debug, Deserialize)]
struct GuidelineIndex {
    #[serde(default)]
    guidelines: Vec<GuidelineEntry>,
}

#[derive(Debug, Deserialize)]
struct GuidelineEntry {
    filename: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    organization: Option<String>,
    #[serde(default)]
    publish_date: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    language: Option<String>,
}

/// Reads the sidecar next to `path`. An entry matches on the exact file name
/// or on the file stem, so `acr.txt` picks up the entry for `acr.pdf`.
fn guideline_metadata(path: &Path) -> DocumentMetadata {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let fallback = DocumentMetadata {
        filename: Some(filename.clone()),
        ..Default::default()
    };

    let sidecar = path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(GUIDELINE_METADATA_FILE);
    if !sidecar.exists() {
        return fallback;
    }

    let index: GuidelineIndex = match std::fs::read_to_string(&sidecar)
        .map_err(|e| e.to_string())
        .and_then(|text| serde_json::from_str(&text).map_err(|e| e.to_string()))
    {
        Ok(index) => index,
        Err(e) => {
            tracing::warn!("Skipping unreadable {}: {}", sidecar.display(), e);
            return fallback;
        }
    };

    let stem = path.file_stem().map(|s| s.to_string_lossy().to_string());
    let entry = index.guidelines.into_iter().find(|g| {
        g.filename == filename
            || Path::new(&g.filename)
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                == stem
    });

    match entry {
        Some(g) => DocumentMetadata {
            title: g.title.filter(|t| !t.is_empty()),
            filename: Some(filename),
            organization: g.organization,
            publish_date: g.publish_date,
            source: g.source,
            country: g.country,
            language: g.language,
            ..Default::default()
        },
        None => fallback,
    }
}

pub struct CompositeParser {
    parsers: Vec<Box<dyn Parser>>,
}

impl CompositeParser {
    #[must_use]
    pub fn new() -> Self {
        Self {
            parsers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_parser(mut self, parser: Box<dyn Parser>) -> Self {
        self.parsers.push(parser);
        self
    }

    fn find_parser(&self, format: DocumentFormat) -> Option<&dyn Parser> {
        self.parsers
            .iter()
            .find(|p| p.can_parse(format))
            .map(|p| p.as_ref())
    }
}

/// Markdown and guideline text. No PDF backend is registered, so PDFs are
/// reported as unsupported.
impl Default for CompositeParser {
    fn default() -> Self {
        Self::new()
            .with_parser(Box::new(MarkdownParser::new()))
            .with_parser(Box::new(GuidelineTextParser::new()))
    }
}

impl Parser for CompositeParser {
    fn supported_formats(&self) -> &[DocumentFormat] {
        &[
            DocumentFormat::PlainText,
            DocumentFormat::Markdown,
            DocumentFormat::Pdf,
        ]
    }

    fn can_parse(&self, format: DocumentFormat) -> bool {
        self.find_parser(format).is_some()
    }

    fn parse_bytes(
        &self,
        data: &[u8],
        format: DocumentFormat,
        path: &Path,
    ) -> ParseResult<ParsedDocument> {
        let parser = self
            .find_parser(format)
            .ok_or_else(|| ParseError::UnsupportedFormat(format.as_str().into()))?;

        parser.parse_bytes(data, format, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AXIOMS: &str = "# Breast Ultrasound Axioms\n\n维护者：MD\n创建日期：2025-01-15\n\n## 公理3: BI-RADS classification\n\n**公理3.1 BI-RADS 3类定级依据**\nOval, circumscribed.\n\n### Notes\n\nextra\n\n#### deep\n\n## 公理5: Terminology\n\n- 椭圆形（oval）\n";

    #[test]
    fn test_markdown_metadata() {
        let doc = MarkdownParser::new()
            .parse_bytes(AXIOMS.as_bytes(), DocumentFormat::Markdown, Path::new("axioms.md"))
            .unwrap();

        assert_eq!(doc.metadata.title.as_deref(), Some("Breast Ultrasound Axioms"));
        assert_eq!(doc.metadata.maintainer.as_deref(), Some("MD"));
        assert_eq!(doc.metadata.created_date, NaiveDate::from_ymd_opt(2025, 1, 15));
        assert_eq!(doc.file_name(), "axioms.md");
    }

    #[test]
    fn test_markdown_sections() {
        let doc = MarkdownParser::new()
            .parse_bytes(AXIOMS.as_bytes(), DocumentFormat::Markdown, Path::new("axioms.md"))
            .unwrap();

        let titles: Vec<_> = doc.sections.iter().map(|s| s.title.as_deref().unwrap()).collect();
        assert_eq!(titles, vec!["公理3: BI-RADS classification", "Notes", "公理5: Terminology"]);
        assert_eq!(doc.sections[1].level, 3);
        assert!(doc.sections[1].content.contains("#### deep"));
        assert!(doc.sections[0].content.starts_with("**公理3.1"));
        assert_eq!(&AXIOMS[doc.sections[0].start_offset..doc.sections[0].start_offset + 3], "## ");
    }

    #[test]
    fn test_numbered_sections() {
        let text = "Preamble\n1. Scope\nThis guideline covers breast ultrasound.\n\n二、术语\n低回声（hypoechoic）\n第3章 Follow-up\nBI-RADS: 3\n";
        let sections = parse_numbered_sections(text);

        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0].title.as_deref(), Some("Scope"));
        assert_eq!(sections[0].content, "This guideline covers breast ultrasound.");
        assert_eq!(sections[1].title.as_deref(), Some("术语"));
        assert_eq!(sections[2].title.as_deref(), Some("Follow-up"));
        assert_eq!(sections[2].content, "BI-RADS: 3");
    }

    #[test]
    fn test_guideline_sidecar() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(GUIDELINE_METADATA_FILE),
            r#"{"guidelines": [{"filename": "acr.pdf", "title": "ACR Guideline", "organization": "ACR"}]}"#,
        )
        .unwrap();
        let path = dir.path().join("acr.txt");
        std::fs::write(&path, "1. Scope\nText").unwrap();

        let doc = CompositeParser::default().parse_file(&path).unwrap();
        assert_eq!(doc.format, DocumentFormat::PlainText);
        assert_eq!(doc.metadata.title.as_deref(), Some("ACR Guideline"));
        assert_eq!(doc.metadata.organization.as_deref(), Some("ACR"));
        assert_eq!(doc.metadata.filename.as_deref(), Some("acr.txt"));
    }

    #[test]
    fn test_missing_sidecar_keeps_filename() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "text").unwrap();

        let doc = GuidelineTextParser::new().parse_file(&path).unwrap();
        assert_eq!(doc.metadata.filename.as_deref(), Some("notes.txt"));
        assert_eq!(doc.metadata.title, None);
    }

    #[test]
    fn test_pdf_is_unsupported() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("guideline.pdf");
        std::fs::write(&path, b"%PDF-1.7").unwrap();

        let err = CompositeParser::default().parse_file(&path).unwrap_err();
        assert!(matches!(err, ParseError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(DocumentFormat::from_extension("PDF"), Some(DocumentFormat::Pdf));
        assert_eq!(DocumentFormat::from_extension("markdown"), Some(DocumentFormat::Markdown));
        assert_eq!(DocumentFormat::from_extension("docx"), None);
    }
}
