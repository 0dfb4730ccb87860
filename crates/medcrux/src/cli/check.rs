use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use medcrux_core::terminology::Standardizer;
use medcrux_core::{ConsistencyReport, ConsistencyVerifier, ExtractedFindings, RiskLevel, Settings};

use super::print_json;

#[derive(Serialize)]
struct CheckOutput<'a> {
    label: &'a str,
    #[serde(flatten)]
    report: &'a ConsistencyReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    escalated_risk: Option<RiskLevel>,
}

pub fn run(
    settings: &Settings,
    label: &str,
    findings: Option<&Path>,
    primary: Option<&str>,
) -> Result<()> {
    let primary = primary.map(str::parse::<RiskLevel>).transpose()?;
    let findings = read_findings(findings)?;

    let verifier = ConsistencyVerifier::new(
        settings.conditions()?,
        Standardizer::new(&settings.vocabulary()?),
    );
    let report = verifier.check_consistency(&findings, label);

    print_json(&CheckOutput {
        label,
        report: &report,
        escalated_risk: primary.map(|p| report.escalate(p)),
    })
}

fn read_findings(path: Option<&Path>) -> Result<ExtractedFindings> {
    let text = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read findings from {}", path.display()))?,
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("failed to read findings from stdin")?;
            text
        }
    };

    serde_json::from_str(&text).context("findings must be a JSON object")
}
