//! Keyword matching of morphology against known risk signs.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::config::{EvidenceSample, Vocabulary};
use crate::findings::ExtractedFindings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceLevel {
    Strong,
    Weak,
}

impl EvidenceLevel {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strong => "strong",
            Self::Weak => "weak",
        }
    }
}

impl std::fmt::Display for EvidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskSign {
    pub sign: String,
    pub evidence_level: EvidenceLevel,
    pub evidence_source: String,
    pub suggestion: String,
}

/// One lesion: its structured morphology plus the free-text findings it came from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Observation {
    #[serde(default)]
    pub morphology: ExtractedFindings,
    #[serde(default)]
    pub findings_text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskSignSummary {
    pub strong_evidence: Vec<RiskSign>,
    pub weak_evidence: Vec<RiskSign>,
}

impl RiskSignSummary {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strong_evidence.is_empty() && self.weak_evidence.is_empty()
    }
}

pub struct RiskSignIdentifier {
    strong: Vec<EvidenceSample>,
    weak: Vec<EvidenceSample>,
}

impl RiskSignIdentifier {
    #[must_use]
    pub fn new(vocabulary: &Vocabulary) -> Self {
        Self {
            strong: vocabulary.evidence.strong.clone(),
            weak: vocabulary.evidence.weak.clone(),
        }
    }

    /// Signs whose keywords occur in the morphology or the findings text.
    /// Strong evidence comes first; each sign is reported once.
    #[must_use]
    pub fn identify(&self, findings: &ExtractedFindings, findings_text: &str) -> Vec<RiskSign> {
        let mut haystack = findings.morphology_text();
        if !findings_text.trim().is_empty() {
            haystack.push(' ');
            haystack.push_str(&findings_text.to_lowercase());
        }

        let mut signs: Vec<RiskSign> = Vec::new();
        let samples = self
            .strong
            .iter()
            .map(|s| (s, EvidenceLevel::Strong))
            .chain(self.weak.iter().map(|s| (s, EvidenceLevel::Weak)));

        for (sample, level) in samples {
            let hit = sample
                .keywords
                .iter()
                .any(|k| haystack.contains(&k.to_lowercase()));
            if hit && !signs.iter().any(|s| s.sign == sample.sign) {
                signs.push(RiskSign {
                    sign: sample.sign.clone(),
                    evidence_level: level,
                    evidence_source: sample.evidence_source.clone(),
                    suggestion: sample.suggestion.clone(),
                });
            }
        }

        signs
    }

    /// Combines the signs of several lesions, dropping repeats.
    #[must_use]
    pub fn aggregate(&self, observations: &[Observation]) -> RiskSignSummary {
        let mut summary = RiskSignSummary::default();
        let mut seen = HashSet::new();

        for observation in observations {
            for sign in self.identify(&observation.morphology, &observation.findings_text) {
                if !seen.insert(sign.sign.clone()) {
                    continue;
                }
                match sign.evidence_level {
                    EvidenceLevel::Strong => summary.strong_evidence.push(sign),
                    EvidenceLevel::Weak => summary.weak_evidence.push(sign),
                }
            }
        }

        summary
    }
}

impl Default for RiskSignIdentifier {
    fn default() -> Self {
        Self::new(&Vocabulary::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_benign_morphology_has_no_signs() {
        let identifier = RiskSignIdentifier::default();
        let findings = ExtractedFindings::new()
            .with_shape("oval")
            .with_boundary("circumscribed")
            .with_echo("homogeneous hypoechoic")
            .with_orientation("parallel");
        assert!(identifier.identify(&findings, "").is_empty());
    }

    #[test]
    fn test_strong_signs_before_weak() {
        let identifier = RiskSignIdentifier::default();
        let findings = ExtractedFindings::new()
            .with_shape("band-like")
            .with_boundary("Spiculated");
        let signs = identifier.identify(&findings, "");

        assert_eq!(signs.len(), 2);
        assert_eq!(signs[0].sign, "partially spiculated margin");
        assert_eq!(signs[0].evidence_level, EvidenceLevel::Strong);
        assert_eq!(signs[1].sign, "cord-like hypoechoic");
        assert_eq!(signs[1].evidence_level, EvidenceLevel::Weak);
    }

    #[test]
    fn test_findings_text_is_searched() {
        let identifier = RiskSignIdentifier::default();
        let signs = identifier.identify(&ExtractedFindings::new(), "CDFI：血流信号丰富");
        assert_eq!(signs.len(), 1);
        assert_eq!(signs[0].sign, "rich blood flow signal");
    }

    #[test]
    fn test_aggregate_deduplicates() {
        let identifier = RiskSignIdentifier::default();
        let spiculated = Observation {
            morphology: ExtractedFindings::new().with_boundary("spiculated"),
            findings_text: String::new(),
        };
        let distorted = Observation {
            morphology: ExtractedFindings::new().with_boundary("毛刺"),
            findings_text: "architectural distortion".to_string(),
        };

        let summary = identifier.aggregate(&[spiculated, distorted]);
        assert_eq!(summary.strong_evidence.len(), 1);
        assert_eq!(summary.weak_evidence.len(), 1);
        assert_eq!(summary.weak_evidence[0].sign, "architectural distortion");
        assert!(identifier.aggregate(&[]).is_empty());
    }
}
