use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::findings::Dimension;
use crate::{Error, Result};

const DEFAULT_VOCABULARY: &str = include_str!("../data/vocabulary.toml");

/// Canonical descriptor terms per term dimension, in match order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalTerms {
    pub shape: Vec<String>,
    pub boundary: Vec<String>,
    pub echo: Vec<String>,
    pub orientation: Vec<String>,
}

impl CanonicalTerms {
    #[must_use]
    pub fn for_dimension(&self, dimension: Dimension) -> &[String] {
        match dimension {
            Dimension::Shape => &self.shape,
            Dimension::Boundary => &self.boundary,
            Dimension::Echo => &self.echo,
            Dimension::Orientation => &self.orientation,
            Dimension::AspectRatio | Dimension::MalignantSigns => &[],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Synonym {
    pub dimension: Dimension,
    pub variant: String,
    pub term: String,
}

/// A plain-language phrase paired with a classification label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelDescriptor {
    pub label: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptVocabulary {
    pub malignant_sign: String,
    #[serde(default)]
    pub risk_signs: Vec<String>,
    #[serde(default)]
    pub descriptors: Vec<LabelDescriptor>,
}

/// Which numbered axioms carry which kind of knowledge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AxiomRoles {
    pub source: String,
    pub author: String,
    pub classification: u32,
    pub terminology: u32,
    pub rules: u32,
    #[serde(default)]
    pub advice_keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceSample {
    pub sign: String,
    pub evidence_source: String,
    pub suggestion: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvidenceSamples {
    #[serde(default)]
    pub strong: Vec<EvidenceSample>,
    #[serde(default)]
    pub weak: Vec<EvidenceSample>,
}

/// Everything the builder, standardizer and risk-sign identifier need to know
/// about the domain language. Loaded once and shared read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vocabulary {
    pub terms: CanonicalTerms,
    #[serde(default)]
    pub synonyms: Vec<Synonym>,
    pub concepts: ConceptVocabulary,
    pub axioms: AxiomRoles,
    #[serde(default)]
    pub evidence: EvidenceSamples,
}

impl Vocabulary {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let vocabulary: Self = toml::from_str(text)?;
        vocabulary.validate()?;
        Ok(vocabulary)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<()> {
        for dimension in Dimension::TERMS {
            if self.terms.for_dimension(dimension).is_empty() {
                return Err(Error::InvalidVocabulary(format!(
                    "no canonical terms for {dimension}"
                )));
            }
        }

        for synonym in &self.synonyms {
            if !synonym.dimension.is_term() {
                return Err(Error::InvalidVocabulary(format!(
                    "synonym '{}' targets non-term dimension {}",
                    synonym.variant, synonym.dimension
                )));
            }
            if !self
                .terms
                .for_dimension(synonym.dimension)
                .contains(&synonym.term)
            {
                return Err(Error::InvalidVocabulary(format!(
                    "synonym '{}' maps to unknown {} term '{}'",
                    synonym.variant, synonym.dimension, synonym.term
                )));
            }
        }

        let mut seen = HashSet::new();
        for descriptor in &self.concepts.descriptors {
            if !seen.insert(descriptor.label.as_str()) {
                return Err(Error::InvalidVocabulary(format!(
                    "label {} has more than one descriptor",
                    descriptor.label
                )));
            }
        }

        Ok(())
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::from_toml_str(DEFAULT_VOCABULARY).expect("embedded vocabulary is valid")
    }
}

/// Runtime locations, read from the environment.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub kb_dir: Option<PathBuf>,
    pub conditions_path: Option<PathBuf>,
    pub vocabulary_path: Option<PathBuf>,
}

impl Settings {
    pub const KB_DIR_VAR: &'static str = "MEDCRUX_KB_DIR";
    pub const CONDITIONS_VAR: &'static str = "MEDCRUX_CONDITIONS";
    pub const VOCABULARY_VAR: &'static str = "MEDCRUX_VOCABULARY";

    pub fn from_env() -> Self {
        let path_var = |name: &str| {
            std::env::var_os(name)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        };

        Self {
            kb_dir: path_var(Self::KB_DIR_VAR),
            conditions_path: path_var(Self::CONDITIONS_VAR),
            vocabulary_path: path_var(Self::VOCABULARY_VAR),
        }
    }

    pub fn vocabulary(&self) -> Result<Vocabulary> {
        match &self.vocabulary_path {
            Some(path) => Vocabulary::load(path),
            None => Ok(Vocabulary::default()),
        }
    }

    pub fn conditions(&self) -> Result<crate::ConditionTable> {
        match &self.conditions_path {
            Some(path) => crate::ConditionTable::load(path),
            None => Ok(crate::ConditionTable::default()),
        }
    }
}
