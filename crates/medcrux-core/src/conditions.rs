//! Necessary and sufficient conditions per classification label.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::findings::Dimension;
use crate::{Error, Result};

const DEFAULT_CONDITIONS: &str = include_str!("../data/conditions.toml");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    #[serde(rename = "<")]
    Less,
    #[serde(rename = "<=")]
    LessOrEqual,
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = ">=")]
    GreaterOrEqual,
}

impl Comparison {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Less => "<",
            Self::LessOrEqual => "<=",
            Self::Greater => ">",
            Self::GreaterOrEqual => ">=",
        }
    }

    #[must_use]
    pub fn holds(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            Self::Less => lhs < rhs,
            Self::LessOrEqual => lhs <= rhs,
            Self::Greater => lhs > rhs,
            Self::GreaterOrEqual => lhs >= rhs,
        }
    }
}

impl std::fmt::Display for Comparison {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one dimension of a finding must look like for a label to hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Requirement {
    /// Standardized value is one of `values`, ignoring case.
    OneOf { values: Vec<String> },
    /// Standardized value equals one of `values` character for character.
    Exact { values: Vec<String> },
    Numeric { op: Comparison, value: f64 },
    /// `expected = false` requires an empty list.
    Boolean { expected: bool },
}

impl Requirement {
    #[must_use]
    pub fn accepts_term(&self, standardized: &str) -> bool {
        match self {
            Self::OneOf { values } => values.iter().any(|v| v.eq_ignore_ascii_case(standardized)),
            Self::Exact { values } => values.iter().any(|v| v == standardized),
            Self::Numeric { .. } | Self::Boolean { .. } => false,
        }
    }

    #[must_use]
    pub fn accepts_number(&self, number: f64) -> bool {
        match self {
            Self::Numeric { op, value } => op.holds(number, *value),
            _ => false,
        }
    }

    #[must_use]
    pub fn accepts_presence(&self, present: bool) -> bool {
        match self {
            Self::Boolean { expected } => *expected == present,
            _ => false,
        }
    }

    /// The requirement as it appears in violation messages.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::OneOf { values } | Self::Exact { values } => values.join(" or "),
            Self::Numeric { op, value } => format!("{op} {value}"),
            Self::Boolean { expected: false } => "none".to_string(),
            Self::Boolean { expected: true } => "at least one".to_string(),
        }
    }

    fn validate(&self, label: &str, dimension: Dimension) -> Result<()> {
        let invalid = |reason: String| Error::InvalidCondition {
            label: label.to_string(),
            reason,
        };

        match self {
            Self::OneOf { values } | Self::Exact { values } => {
                if !dimension.is_term() {
                    return Err(invalid(format!("{dimension} does not take term values")));
                }
                if values.iter().all(|v| v.trim().is_empty()) {
                    return Err(invalid(format!("{dimension} lists no values")));
                }
            }
            Self::Numeric { value, .. } => {
                if dimension != Dimension::AspectRatio {
                    return Err(invalid(format!("{dimension} is not numeric")));
                }
                if !value.is_finite() {
                    return Err(invalid(format!("{dimension} threshold is not finite")));
                }
            }
            Self::Boolean { .. } => {
                if dimension != Dimension::MalignantSigns {
                    return Err(invalid(format!("{dimension} is not a presence check")));
                }
            }
        }
        Ok(())
    }
}

pub type LabelConditions = BTreeMap<Dimension, Requirement>;

#[derive(Deserialize)]
struct RawTable {
    #[serde(default)]
    labels: BTreeMap<String, BTreeMap<String, Requirement>>,
}

/// The hand-authored rule table. Loaded once and read-only afterwards.
#[derive(Debug, Clone)]
pub struct ConditionTable {
    labels: BTreeMap<String, LabelConditions>,
}

impl ConditionTable {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let raw: RawTable = toml::from_str(text)?;

        let mut labels = BTreeMap::new();
        for (label, entries) in raw.labels {
            let label = label.trim().to_string();
            let mut conditions = LabelConditions::new();
            for (name, requirement) in entries {
                let dimension: Dimension = name.parse().map_err(|_| Error::InvalidCondition {
                    label: label.clone(),
                    reason: format!("unknown dimension '{name}'"),
                })?;
                requirement.validate(&label, dimension)?;
                conditions.insert(dimension, requirement);
            }
            labels.insert(label, conditions);
        }

        Ok(Self { labels })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let table = Self::from_toml_str(&text)?;
        tracing::info!("Loaded {} condition labels from {}", table.len(), path.display());
        Ok(table)
    }

    /// Conditions for `label`, or `None` when the label is not registered.
    /// `None` means unchecked, not satisfied.
    #[must_use]
    pub fn lookup(&self, label: &str) -> Option<&LabelConditions> {
        self.labels.get(label.trim())
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.labels.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl Default for ConditionTable {
    fn default() -> Self {
        Self::from_toml_str(DEFAULT_CONDITIONS).expect("embedded condition table is valid")
    }
}
