use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const FIXTURES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../medcrux-core/tests/fixtures");

fn medcrux() -> Command {
    let mut cmd: Command = cargo_bin_cmd!("medcrux").into();
    cmd.env_remove("MEDCRUX_KB_DIR");
    cmd.env_remove("MEDCRUX_CONDITIONS");
    cmd.env_remove("MEDCRUX_VOCABULARY");
    cmd
}

fn stdout_json(cmd: &mut Command) -> serde_json::Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).unwrap()
}

/// Build a knowledge base from the shared fixtures. The tempdir guard must be kept alive.
fn built_kb() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let kb = tmp.path().join("kb");
    medcrux()
        .args(["build", FIXTURES, "--out"])
        .arg(&kb)
        .assert()
        .success();
    (tmp, kb)
}

fn write_findings(dir: &Path, json: &str) -> PathBuf {
    let path = dir.join("findings.json");
    fs::write(&path, json).unwrap();
    path
}

// --- Binary startup ---

#[test]
fn binary_runs() {
    medcrux()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("medcrux"));
}

// --- Build ---

#[test]
fn build_writes_store() {
    let tmp = TempDir::new().unwrap();
    let kb = tmp.path().join("kb");
    let stats = stdout_json(medcrux().args(["build", FIXTURES, "--out"]).arg(&kb));

    assert_eq!(stats["stats"]["documents"], 2);
    assert!(stats["out"].as_str().unwrap().ends_with("kb"));
    assert!(stats["stats"]["entities"].as_u64().unwrap() > 0);
    assert!(stats["failed"].as_array().unwrap().is_empty());
    assert!(kb.join("entity_index.json").is_file());
    assert!(kb.join("relation_index.json").is_file());
}

#[test]
fn build_reports_unreadable_sources() {
    let tmp = TempDir::new().unwrap();
    let scan = tmp.path().join("scan.pdf");
    fs::write(&scan, b"%PDF-1.4").unwrap();

    let stats = stdout_json(
        medcrux()
            .arg("build")
            .arg(&scan)
            .arg(Path::new(FIXTURES).join("breast_ultrasound_axioms.md"))
            .arg("--out")
            .arg(tmp.path().join("kb")),
    );

    assert_eq!(stats["stats"]["documents"], 1);
    assert_eq!(stats["failed"].as_array().unwrap().len(), 1);
}

#[test]
fn build_requires_sources() {
    medcrux().args(["build", "--out", "kb"]).assert().failure();
}

// --- Retrieve ---

#[test]
fn retrieve_from_built_store() {
    let (_tmp, kb) = built_kb();
    let result = stdout_json(medcrux().args(["retrieve", "malignant", "--kb"]).arg(&kb));

    let ids: Vec<&str> = result["entities"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids[0], "concept_malignant_sign");
    assert!(ids.contains(&"concept_malignant_microcalcification"));
    assert!(result["relations"]
        .as_array()
        .unwrap()
        .iter()
        .any(|r| r["target_entity_id"] == "concept_malignant_sign"));
    assert!(result["confidence"].as_f64().unwrap() > 0.0);
}

#[test]
fn retrieve_reads_kb_from_env() {
    let (_tmp, kb) = built_kb();
    medcrux()
        .args(["retrieve", "BI-RADS 3", "--context"])
        .env("MEDCRUX_KB_DIR", &kb)
        .assert()
        .success()
        .stdout(predicate::str::contains("## Relevant knowledge"));
}

#[test]
fn retrieve_without_kb_fails() {
    medcrux()
        .args(["retrieve", "oval"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("MEDCRUX_KB_DIR"));
}

#[test]
fn retrieve_missing_store_fails() {
    let tmp = TempDir::new().unwrap();
    medcrux()
        .args(["retrieve", "oval", "--kb"])
        .arg(tmp.path().join("nowhere"))
        .assert()
        .failure();
}

// --- Check ---

#[test]
fn check_consistent_findings() {
    let tmp = TempDir::new().unwrap();
    let findings = write_findings(
        tmp.path(),
        r#"{"shape": "oval", "boundary": "circumscribed", "echo": "homogeneous hypoechoic",
            "orientation": "parallel", "aspect_ratio": 0.6, "malignant_signs": []}"#,
    );

    let report = stdout_json(
        medcrux()
            .args(["check", "--label", "3", "--findings"])
            .arg(&findings),
    );

    assert_eq!(report["label"], "3");
    assert_eq!(report["checked"], true);
    assert_eq!(report["inconsistency"], false);
    assert!(report["violations"].as_array().unwrap().is_empty());
    assert!(report.get("escalated_risk").is_none());
}

#[test]
fn check_escalates_primary_risk() {
    let report = stdout_json(
        medcrux()
            .args(["check", "--label", "3", "--primary", "low"])
            .write_stdin(r#"{"shape": "irregular", "malignant_signs": []}"#),
    );

    assert_eq!(report["inconsistency"], true);
    assert_eq!(report["risk_assessment"], "High");
    assert_eq!(report["escalated_risk"], "High");
    assert_eq!(report["violations"][0]["dimension"], "shape");
}

#[test]
fn check_unregistered_label_is_unchecked() {
    let report = stdout_json(
        medcrux()
            .args(["check", "--label", "5"])
            .write_stdin("{}"),
    );

    assert_eq!(report["checked"], false);
    assert_eq!(report["inconsistency"], false);
}

#[test]
fn check_rejects_bad_input() {
    medcrux()
        .args(["check", "--label", "3"])
        .write_stdin("not json")
        .assert()
        .failure()
        .stderr(predicate::str::contains("JSON"));

    medcrux()
        .args(["check", "--label", "3", "--primary", "severe"])
        .write_stdin("{}")
        .assert()
        .failure();
}

// --- Labels and reconcile ---

#[test]
fn labels_extracts_set() {
    let labels = stdout_json(medcrux().args(["labels", "BI-RADS 3类、4A类"]));

    assert_eq!(labels["ordered"], serde_json::json!(["3", "4A"]));
    assert_eq!(labels["highest"], "4A");
}

#[test]
fn reconcile_flags_higher_derived_label() {
    let result = stdout_json(medcrux().args([
        "reconcile",
        "--report",
        "BI-RADS 3类",
        "--derived",
        "BI-RADS 4A类",
    ]));

    assert_eq!(result["comparison"]["consistent"], false);
    assert_eq!(result["urgency"]["urgency_level"], "High");
    assert_eq!(result["urgency"]["comparison"], "derived_exceeds");
}

#[test]
fn reconcile_matching_labels() {
    let result = stdout_json(medcrux().args([
        "reconcile",
        "--report",
        "BI-RADS 3类",
        "--derived",
        "BI-RADS: 3",
    ]));

    assert_eq!(result["comparison"]["consistent"], true);
    assert_eq!(result["urgency"]["urgency_level"], "Low");
}
