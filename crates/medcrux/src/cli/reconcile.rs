use anyhow::Result;
use serde::Serialize;

use medcrux_core::{
    compare_sets, compute_urgency, extract_label_set, LabelSet, SetComparison, UrgencyAssessment,
};

use super::print_json;

#[derive(Serialize)]
struct Reconciliation {
    report: LabelSet,
    derived: LabelSet,
    comparison: SetComparison,
    urgency: UrgencyAssessment,
}

pub fn run(report: &str, derived: &str) -> Result<()> {
    let report = extract_label_set(report);
    let derived = extract_label_set(derived);
    let comparison = compare_sets(&report.set, &derived.set);
    let urgency = compute_urgency(report.highest.as_deref(), derived.highest.as_deref());

    if !comparison.consistent {
        tracing::info!("Label sets disagree: {}", comparison.description);
    }

    print_json(&Reconciliation {
        report,
        derived,
        comparison,
        urgency,
    })
}
