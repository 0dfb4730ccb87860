//! Reconciles the classification labels asserted by a report with labels
//! derived independently from its findings.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::verifier::RiskLevel;

/// `BI-RADS 3类`, `BI-RADS: 4A`, and elided runs such as `BI-RADS 3类、4类`.
static LABEL_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)BI-RADS\s*[：:]?\s*(\d+[ABC]?)\s*类?((?:\s*(?:[、，,/]|和|及|或|\band\b|\bor\b)\s*\d+[ABC]?\s*类?)*)",
    )
    .expect("label pattern is valid")
});

static LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\d+[ABC]?").expect("label pattern is valid"));

/// Urgency escalates to High once the derived label reaches this numeral.
pub const HIGH_URGENCY_NUMERAL: u32 = 4;

/// Numeric part of a label, ignoring any letter suffix.
#[must_use]
pub fn label_numeral(label: &str) -> Option<u32> {
    label
        .trim()
        .trim_end_matches(|c: char| c.is_ascii_alphabetic())
        .parse()
        .ok()
}

/// First label with the largest numeral. Suffixes do not break ties.
fn highest_label<'a>(labels: impl IntoIterator<Item = &'a String>) -> Option<&'a String> {
    let mut best: Option<(&String, u32)> = None;
    for label in labels {
        let Some(numeral) = label_numeral(label) else {
            continue;
        };
        match best {
            Some((_, n)) if numeral <= n => {}
            _ => best = Some((label, numeral)),
        }
    }
    best.map(|(label, _)| label)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSet {
    pub set: BTreeSet<String>,
    /// Every occurrence in text order, repeats included.
    pub ordered: Vec<String>,
    pub highest: Option<String>,
    pub raw_text: String,
}

impl LabelSet {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}

/// Pulls every classification label out of free text. Text without labels
/// yields an empty set.
#[must_use]
pub fn extract_label_set(text: &str) -> LabelSet {
    let mut ordered = Vec::new();

    for caps in LABEL_RUN.captures_iter(text) {
        let head = caps.get(1).map(|m| m.as_str());
        let tail = caps
            .get(2)
            .map(|m| LABEL.find_iter(m.as_str()).map(|l| l.as_str()).collect::<Vec<_>>())
            .unwrap_or_default();

        for raw in head.into_iter().chain(tail) {
            if label_numeral(raw).is_none() {
                tracing::warn!("Skipping label with unparsable numeral: {}", raw);
                continue;
            }
            ordered.push(raw.to_uppercase());
        }
    }

    if ordered.is_empty() && !text.trim().is_empty() {
        tracing::debug!("No classification labels found in {} chars of text", text.len());
    }

    let highest = highest_label(&ordered).cloned();
    LabelSet {
        set: ordered.iter().cloned().collect(),
        ordered,
        highest,
        raw_text: text.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetComparison {
    pub consistent: bool,
    pub missing_in_ai: BTreeSet<String>,
    pub extra_in_ai: BTreeSet<String>,
    pub description: String,
}

/// Compares the report's labels with the independently derived ones.
///
/// Extra derived labels are tolerated when none exceeds the highest report
/// numeral. A report label missing from the derived set is always
/// inconsistent.
#[must_use]
pub fn compare_sets(report: &BTreeSet<String>, derived: &BTreeSet<String>) -> SetComparison {
    let missing_in_ai: BTreeSet<String> = report.difference(derived).cloned().collect();
    let extra_in_ai: BTreeSet<String> = derived.difference(report).cloned().collect();

    let (consistent, description) = if report.is_empty() && derived.is_empty() {
        (true, "No classification labels on either side".to_string())
    } else if report.is_empty() {
        (
            false,
            "Derived labels have no basis in the report".to_string(),
        )
    } else if derived.is_empty() {
        (
            false,
            "Independent derivation reproduced no labels".to_string(),
        )
    } else if !missing_in_ai.is_empty() {
        (
            false,
            format!("Report labels not reproduced: {}", join(&missing_in_ai)),
        )
    } else {
        let report_max = report.iter().filter_map(|l| label_numeral(l)).max();
        let higher: Vec<&String> = extra_in_ai
            .iter()
            .filter(|l| matches!((label_numeral(l), report_max), (Some(n), Some(max)) if n > max))
            .collect();

        if higher.is_empty() {
            let description = if extra_in_ai.is_empty() {
                "Label sets match".to_string()
            } else {
                format!(
                    "Extra labels at or below the report's highest: {}",
                    join(&extra_in_ai)
                )
            };
            (true, description)
        } else {
            let names: Vec<&str> = higher.iter().map(|l| l.as_str()).collect();
            (
                false,
                format!("Higher-risk labels without report basis: {}", names.join(", ")),
            )
        }
    };

    SetComparison {
        consistent,
        missing_in_ai,
        extra_in_ai,
        description,
    }
}

fn join(labels: &BTreeSet<String>) -> String {
    labels.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyComparison {
    DerivedExceeds,
    DerivedEqualOrLower,
    Unknown,
}

impl UrgencyComparison {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DerivedExceeds => "derived_exceeds",
            Self::DerivedEqualOrLower => "derived_equal_or_lower",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for UrgencyComparison {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UrgencyComparison {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "derived_exceeds" => Ok(Self::DerivedExceeds),
            "derived_equal_or_lower" => Ok(Self::DerivedEqualOrLower),
            "unknown" => Ok(Self::Unknown),
            _ => Err(crate::Error::InvalidUrgencyComparison(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrgencyAssessment {
    pub urgency_level: RiskLevel,
    pub reason: String,
    pub comparison: UrgencyComparison,
    pub report_highest: Option<String>,
    pub derived_highest: Option<String>,
}

#[must_use]
pub fn compute_urgency(report_highest: Option<&str>, derived_highest: Option<&str>) -> UrgencyAssessment {
    fn clean(label: Option<&str>) -> Option<&str> {
        label.map(str::trim).filter(|l| !l.is_empty())
    }

    let report = clean(report_highest);
    let derived = clean(derived_highest);

    let unknown = |reason: &str| UrgencyAssessment {
        urgency_level: RiskLevel::Low,
        reason: reason.to_string(),
        comparison: UrgencyComparison::Unknown,
        report_highest: report.map(str::to_string),
        derived_highest: derived.map(str::to_string),
    };

    let (Some(report_label), Some(derived_label)) = (report, derived) else {
        return unknown("A highest label is missing, the two cannot be compared");
    };
    let (Some(report_n), Some(derived_n)) = (label_numeral(report_label), label_numeral(derived_label))
    else {
        tracing::warn!(
            "Skipping urgency comparison of unparsable labels: {} / {}",
            report_label,
            derived_label
        );
        return unknown("A highest label has no numeral, the two cannot be compared");
    };

    let (urgency_level, comparison, reason) = if derived_n > report_n {
        let level = if derived_n >= HIGH_URGENCY_NUMERAL {
            RiskLevel::High
        } else {
            RiskLevel::Medium
        };
        (
            level,
            UrgencyComparison::DerivedExceeds,
            format!("Derived label {derived_label} exceeds report label {report_label}"),
        )
    } else {
        (
            RiskLevel::Low,
            UrgencyComparison::DerivedEqualOrLower,
            format!("Derived label {derived_label} does not exceed report label {report_label}"),
        )
    };

    UrgencyAssessment {
        urgency_level,
        reason,
        comparison,
        report_highest: Some(report_label.to_string()),
        derived_highest: Some(derived_label.to_string()),
    }
}
