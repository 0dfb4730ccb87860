//! Checks extracted findings against the conditions registered for a label.
//!
//! The verifier is advisory. It never overrides the primary classification,
//! it only reports where the findings and the claimed label disagree.

use serde::{Deserialize, Serialize};

use crate::advisory::fail_open;
use crate::conditions::{ConditionTable, Requirement};
use crate::findings::{Dimension, ExtractedFindings};
use crate::terminology::Standardizer;
use crate::{Error, Result};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl RiskLevel {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(Error::InvalidRiskLevel(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViolationKind {
    /// A vocabulary term the label does not allow.
    Mismatch { required: String, found: String },
    /// A descriptor outside the vocabulary, reported verbatim.
    NonStandard { required: String, found: String },
    OutOfRange { required: String, found: f64 },
    UnexpectedSigns { signs: Vec<String> },
    MissingSigns,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub dimension: Dimension,
    #[serde(flatten)]
    pub kind: ViolationKind,
    pub message: String,
}

impl Violation {
    fn new(dimension: Dimension, kind: ViolationKind) -> Self {
        let label = dimension.label();
        let message = match &kind {
            ViolationKind::Mismatch { required, found } => {
                format!("{label} mismatch: required {required}, got {found}")
            }
            ViolationKind::NonStandard { required, found } => {
                format!("{label} mismatch: required {required}, got {found} (non-standard term)")
            }
            ViolationKind::OutOfRange { required, found } => {
                format!("{label} mismatch: required {required}, got {found}")
            }
            ViolationKind::UnexpectedSigns { signs } => {
                format!("{label} mismatch: required none, got {}", signs.join(", "))
            }
            ViolationKind::MissingSigns => format!("{label} mismatch: required at least one, got none"),
        };
        Self {
            dimension,
            kind,
            message,
        }
    }

    /// Violations that contradict a defining feature of the label.
    #[must_use]
    pub fn is_critical(&self) -> bool {
        match self.kind {
            ViolationKind::Mismatch { .. } => {
                matches!(self.dimension, Dimension::Shape | Dimension::Boundary)
            }
            ViolationKind::UnexpectedSigns { .. } => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionCheck {
    pub satisfies: bool,
    pub violations: Vec<Violation>,
    pub inconsistency: bool,
    /// False when the label has no registered conditions.
    pub checked: bool,
}

impl ConditionCheck {
    fn unchecked() -> Self {
        Self {
            satisfies: true,
            violations: Vec::new(),
            inconsistency: false,
            checked: false,
        }
    }

    fn from_violations(violations: Vec<Violation>) -> Self {
        let inconsistency = !violations.is_empty();
        Self {
            satisfies: !inconsistency,
            violations,
            inconsistency,
            checked: true,
        }
    }
}

impl Default for ConditionCheck {
    fn default() -> Self {
        Self::unchecked()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConsistencyReport {
    pub inconsistency: bool,
    pub violations: Vec<Violation>,
    pub risk_assessment: RiskLevel,
    pub checked: bool,
}

impl ConsistencyReport {
    /// The higher of `primary` and this report's assessment, when the report
    /// found an inconsistency. Otherwise `primary` stands.
    #[must_use]
    pub fn escalate(&self, primary: RiskLevel) -> RiskLevel {
        if self.inconsistency {
            primary.max(self.risk_assessment)
        } else {
            primary
        }
    }

    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.violations.iter().map(ToString::to_string).collect()
    }
}

pub struct ConsistencyVerifier {
    table: ConditionTable,
    standardizer: Standardizer,
}

impl ConsistencyVerifier {
    #[must_use]
    pub fn new(table: ConditionTable, standardizer: Standardizer) -> Self {
        Self {
            table,
            standardizer,
        }
    }

    #[must_use]
    pub fn table(&self) -> &ConditionTable {
        &self.table
    }

    pub fn try_check_necessary_sufficient_condition(
        &self,
        findings: &ExtractedFindings,
        label: &str,
    ) -> Result<ConditionCheck> {
        let Some(conditions) = self.table.lookup(label) else {
            tracing::debug!("No conditions registered for label {}", label);
            return Ok(ConditionCheck::unchecked());
        };

        let violations = conditions
            .iter()
            .filter_map(|(dimension, requirement)| self.evaluate(findings, *dimension, requirement))
            .collect();

        Ok(ConditionCheck::from_violations(violations))
    }

    #[must_use]
    pub fn check_necessary_sufficient_condition(
        &self,
        findings: &ExtractedFindings,
        label: &str,
    ) -> ConditionCheck {
        fail_open(
            self.try_check_necessary_sufficient_condition(findings, label),
            "Condition check",
        )
    }

    pub fn try_check_consistency(
        &self,
        findings: &ExtractedFindings,
        label: &str,
    ) -> Result<ConsistencyReport> {
        let check = self.try_check_necessary_sufficient_condition(findings, label)?;
        let risk_assessment = assess_risk(&check, findings);

        Ok(ConsistencyReport {
            inconsistency: check.inconsistency,
            violations: check.violations,
            risk_assessment,
            checked: check.checked,
        })
    }

    #[must_use]
    pub fn check_consistency(&self, findings: &ExtractedFindings, label: &str) -> ConsistencyReport {
        fail_open(self.try_check_consistency(findings, label), "Consistency check")
    }

    // Absent values are not violations; only what was reported is checked.
    fn evaluate(
        &self,
        findings: &ExtractedFindings,
        dimension: Dimension,
        requirement: &Requirement,
    ) -> Option<Violation> {
        match dimension {
            Dimension::AspectRatio => {
                let ratio = findings.aspect_ratio?;
                // A non-finite ratio satisfies no numeric requirement.
                (!ratio.is_finite() || !requirement.accepts_number(ratio)).then(|| {
                    Violation::new(
                        dimension,
                        ViolationKind::OutOfRange {
                            required: requirement.describe(),
                            found: ratio,
                        },
                    )
                })
            }
            Dimension::MalignantSigns => {
                let signs: Vec<String> = findings
                    .malignant_signs
                    .iter()
                    .map(|s| s.trim())
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
                if requirement.accepts_presence(!signs.is_empty()) {
                    None
                } else if signs.is_empty() {
                    Some(Violation::new(dimension, ViolationKind::MissingSigns))
                } else {
                    Some(Violation::new(dimension, ViolationKind::UnexpectedSigns { signs }))
                }
            }
            _ => {
                let raw = findings.term(dimension)?;
                let check = self.standardizer.check_terminology(raw, dimension);
                let Some(standard) = check.standard_term else {
                    return Some(Violation::new(
                        dimension,
                        ViolationKind::NonStandard {
                            required: requirement.describe(),
                            found: raw.to_string(),
                        },
                    ));
                };
                (!requirement.accepts_term(&standard)).then(|| {
                    Violation::new(
                        dimension,
                        ViolationKind::Mismatch {
                            required: requirement.describe(),
                            found: standard,
                        },
                    )
                })
            }
        }
    }
}

impl Default for ConsistencyVerifier {
    fn default() -> Self {
        Self::new(ConditionTable::default(), Standardizer::default())
    }
}

fn assess_risk(check: &ConditionCheck, findings: &ExtractedFindings) -> RiskLevel {
    if !check.inconsistency {
        return RiskLevel::Low;
    }
    if findings.has_malignant_signs() || check.violations.iter().any(Violation::is_critical) {
        return RiskLevel::High;
    }
    RiskLevel::Medium
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_a() -> ExtractedFindings {
        ExtractedFindings::new()
            .with_shape("oval")
            .with_boundary("circumscribed")
            .with_echo("homogeneous hypoechoic")
            .with_orientation("parallel")
            .with_aspect_ratio(0.8)
    }

    #[test]
    fn test_scenario_a_is_consistent() {
        let verifier = ConsistencyVerifier::default();
        let report = verifier.check_consistency(&scenario_a(), "3");
        assert!(!report.inconsistency);
        assert!(report.violations.is_empty());
        assert_eq!(report.risk_assessment, RiskLevel::Low);
        assert!(report.checked);
    }

    #[test]
    fn test_chinese_descriptors_are_standardized() {
        let verifier = ConsistencyVerifier::default();
        let findings = ExtractedFindings::new()
            .with_shape("椭圆形")
            .with_boundary("清晰")
            .with_echo("均匀低回声")
            .with_orientation("平行")
            .with_aspect_ratio(0.8);
        let report = verifier.check_consistency(&findings, "3");
        assert!(!report.inconsistency, "{:?}", report.messages());
    }

    #[test]
    fn test_scenario_b_non_standard_shape_is_medium() {
        let verifier = ConsistencyVerifier::default();
        let findings = scenario_a().with_shape("band-like");
        let report = verifier.check_consistency(&findings, "3");

        assert!(report.inconsistency);
        assert_eq!(report.risk_assessment, RiskLevel::Medium);
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].dimension, Dimension::Shape);
        assert!(report.violations[0].message.starts_with("shape mismatch"));
        assert!(report.violations[0].message.contains("band-like"));
    }

    #[test]
    fn test_standard_shape_mismatch_is_high() {
        let verifier = ConsistencyVerifier::default();
        let findings = scenario_a().with_shape("irregular");
        let report = verifier.check_consistency(&findings, "3");
        assert!(report.inconsistency);
        assert_eq!(report.risk_assessment, RiskLevel::High);
        assert_eq!(
            report.violations[0].message,
            "shape mismatch: required oval, got irregular"
        );
    }

    #[test]
    fn test_echo_requires_exact_match() {
        let verifier = ConsistencyVerifier::default();
        let findings = scenario_a().with_echo("hypoechoic");
        let report = verifier.check_consistency(&findings, "3");
        assert!(report.inconsistency);
        assert_eq!(report.violations[0].dimension, Dimension::Echo);
        assert_eq!(report.risk_assessment, RiskLevel::Medium);

        let findings = scenario_a().with_echo("heterogeneous");
        let report = verifier.check_consistency(&findings, "3");
        assert!(report.inconsistency);
        assert_eq!(report.risk_assessment, RiskLevel::Medium);
    }

    #[test]
    fn test_malignant_signs_are_high() {
        let verifier = ConsistencyVerifier::default();
        for label in ["2", "3"] {
            let findings = scenario_a().with_malignant_sign("microcalcification");
            let report = verifier.check_consistency(&findings, label);
            assert!(report.inconsistency);
            assert_eq!(report.risk_assessment, RiskLevel::High);
            assert!(report
                .violations
                .iter()
                .any(|v| v.dimension == Dimension::MalignantSigns));
        }
    }

    #[test]
    fn test_aspect_ratio_predicate() {
        let verifier = ConsistencyVerifier::default();
        let findings = scenario_a().with_aspect_ratio(1.2);
        let report = verifier.check_consistency(&findings, "3");
        assert!(report.inconsistency);
        assert_eq!(
            report.violations[0].message,
            "aspect ratio mismatch: required < 1, got 1.2"
        );
        assert_eq!(report.risk_assessment, RiskLevel::Medium);
    }

    #[test]
    fn test_unregistered_label_is_unchecked() {
        let verifier = ConsistencyVerifier::default();
        let findings = ExtractedFindings::new()
            .with_shape("irregular")
            .with_malignant_sign("spiculated margin");
        for label in ["4A", "5", "", "nonsense"] {
            let report = verifier.check_consistency(&findings, label);
            assert!(!report.inconsistency);
            assert!(!report.checked);
            assert_eq!(report.risk_assessment, RiskLevel::Low);

            let check = verifier.check_necessary_sufficient_condition(&findings, label);
            assert!(check.satisfies);
            assert!(!check.checked);
        }
    }

    #[test]
    fn test_absent_values_are_not_violations() {
        let verifier = ConsistencyVerifier::default();
        let report = verifier.check_consistency(&ExtractedFindings::new(), "3");
        assert!(!report.inconsistency);
        assert!(report.checked);
    }

    #[test]
    fn test_non_finite_aspect_ratio_is_out_of_range() {
        let verifier = ConsistencyVerifier::default();
        for ratio in [f64::NAN, f64::NEG_INFINITY, f64::INFINITY] {
            let report = verifier.check_consistency(&scenario_a().with_aspect_ratio(ratio), "3");
            assert!(report.inconsistency);
            assert_eq!(report.risk_assessment, RiskLevel::Medium);
            assert_eq!(report.violations.len(), 1);
            assert_eq!(report.violations[0].dimension, Dimension::AspectRatio);
        }
    }

    #[test]
    fn test_non_finite_aspect_ratio_keeps_other_violations() {
        let verifier = ConsistencyVerifier::default();
        let findings = ExtractedFindings::new()
            .with_shape("oval")
            .with_aspect_ratio(f64::NAN)
            .with_malignant_sign("microcalcification");

        let report = verifier.check_consistency(&findings, "3");
        assert!(report.inconsistency);
        assert_eq!(report.risk_assessment, RiskLevel::High);
        assert!(report
            .violations
            .iter()
            .any(|v| v.dimension == Dimension::MalignantSigns));
        assert!(report
            .violations
            .iter()
            .any(|v| v.dimension == Dimension::AspectRatio));
    }

    #[test]
    fn test_negated_boundary_is_inconsistent_with_label_3() {
        let verifier = ConsistencyVerifier::default();
        for boundary in ["not well-defined", "not clear", "边界欠清晰"] {
            let report = verifier.check_consistency(&scenario_a().with_boundary(boundary), "3");
            assert!(report.inconsistency, "{boundary}");
            assert_eq!(report.risk_assessment, RiskLevel::High, "{boundary}");
            assert_eq!(report.violations[0].dimension, Dimension::Boundary);
        }
    }

    #[test]
    fn test_escalate() {
        let verifier = ConsistencyVerifier::default();
        let report = verifier.check_consistency(&scenario_a().with_shape("round"), "3");
        assert_eq!(report.escalate(RiskLevel::Low), RiskLevel::High);

        let clean = verifier.check_consistency(&scenario_a(), "3");
        assert_eq!(clean.escalate(RiskLevel::Medium), RiskLevel::Medium);
    }

    #[test]
    fn test_risk_level_parsing() {
        assert_eq!("high".parse::<RiskLevel>().unwrap(), RiskLevel::High);
        assert_eq!("Medium".parse::<RiskLevel>().unwrap(), RiskLevel::Medium);
        assert!("severe".parse::<RiskLevel>().is_err());
        assert!(RiskLevel::High > RiskLevel::Medium);
        assert_eq!(serde_json::to_string(&RiskLevel::Low).unwrap(), "\"Low\"");
    }

    #[test]
    fn test_violation_serializes_with_kind() {
        let verifier = ConsistencyVerifier::default();
        let report = verifier.check_consistency(&scenario_a().with_shape("band-like"), "3");
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["violations"][0]["kind"], "non_standard");
        assert_eq!(json["violations"][0]["dimension"], "shape");
        assert_eq!(json["risk_assessment"], "Medium");
    }
}
