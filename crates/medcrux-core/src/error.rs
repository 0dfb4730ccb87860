use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Knowledge base not found: {0}")]
    KnowledgeBaseMissing(PathBuf),

    #[error("Knowledge base file missing: {0}")]
    MissingFile(PathBuf),

    #[error("Invalid entity type: {0}")]
    InvalidEntityType(String),

    #[error("Invalid relation type: {0}")]
    InvalidRelationType(String),

    #[error("Invalid dimension: {0}")]
    InvalidDimension(String),

    #[error("Invalid risk level: {0}")]
    InvalidRiskLevel(String),

    #[error("Invalid urgency comparison: {0}")]
    InvalidUrgencyComparison(String),

    #[error("Invalid condition for label {label}: {reason}")]
    InvalidCondition { label: String, reason: String },

    #[error("Invalid vocabulary: {0}")]
    InvalidVocabulary(String),

    #[error("Non-finite value for {0}")]
    NonFinite(&'static str),

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt knowledge base file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn corrupt(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Corrupt {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
