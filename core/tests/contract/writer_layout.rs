//! Artifact layout, report purity, and count consistency.

use pretty_assertions::assert_eq;
use verax_common::TimeProvider;
use verax_core::ledger::FailureLedger;
use verax_core::writer::{self, RunArtifacts, RunStats};

fn ledger() -> FailureLedger {
    FailureLedger::new(
        "run-writer",
        TimeProvider::fixed(10, "2024-01-01T00:00:00+00:00"),
    )
}

fn empty_artifacts() -> RunArtifacts {
    RunArtifacts {
        url: "https://app.test/".to_string(),
        src: "./app".to_string(),
        detected_at_iso: "2024-01-01T00:00:00+00:00".to_string(),
        findings: vec![],
        coverage_gaps: vec![],
        stats: RunStats {
            total_expectations: 4,
            attempted: 4,
            observed: 4,
            not_observed: 0,
            skipped: 0,
            blocked_writes: 1,
            coverage_ratio: 1.0,
        },
        version: "0.4.1".to_string(),
        debug_payload: None,
    }
}

#[test]
fn test_flat_layout_written() {
    let out = tempfile::tempdir().unwrap();
    let mut ledger = ledger();
    writer::write_artifacts(out.path(), empty_artifacts(), &mut ledger).unwrap();

    for name in ["REPORT.json", "META.json", "SUMMARY.md", "failure.ledger.json"] {
        assert!(out.path().join(name).is_file(), "{name} must exist");
    }
    assert!(out.path().join("EVIDENCE").is_dir());
    // No debug log unless requested.
    assert!(!out.path().join("EVIDENCE/logs/debug.json").exists());
}

#[test]
fn test_debug_log_only_with_flag() {
    let out = tempfile::tempdir().unwrap();
    let mut ledger = ledger();
    let mut artifacts = empty_artifacts();
    artifacts.debug_payload = Some(serde_json::json!({ "traces": [] }));
    writer::write_artifacts(out.path(), artifacts, &mut ledger).unwrap();
    assert!(out.path().join("EVIDENCE/logs/debug.json").is_file());
}

#[test]
fn test_report_purity_and_key_order() {
    let out = tempfile::tempdir().unwrap();
    let mut ledger = ledger();
    writer::write_artifacts(out.path(), empty_artifacts(), &mut ledger).unwrap();

    let report = std::fs::read_to_string(out.path().join("REPORT.json")).unwrap();
    for forbidden in ["diagnostics", "enforcement", "internalErrors", "debug"] {
        assert!(
            !report.contains(&format!("\"{forbidden}\"")),
            "REPORT.json must not contain {forbidden}"
        );
    }
    // Canonical encoding: keys sorted, trailing newline.
    assert!(report.ends_with('\n'));
    let parsed: serde_json::Value = serde_json::from_str(&report).unwrap();
    let keys: Vec<&String> = parsed.as_object().unwrap().keys().collect();
    let mut sorted = keys.clone();
    sorted.sort_unstable();
    assert_eq!(keys, sorted);
    assert_eq!(parsed["schemaVersion"], 1);
}

#[test]
fn test_meta_stats_match_inputs() {
    let out = tempfile::tempdir().unwrap();
    let mut ledger = ledger();
    writer::write_artifacts(out.path(), empty_artifacts(), &mut ledger).unwrap();

    let meta: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.path().join("META.json")).unwrap())
            .unwrap();
    assert_eq!(meta["status"], "SUCCESS");
    assert_eq!(meta["veraxVersion"], "0.4.1");
    assert_eq!(meta["stats"]["totalExpectations"], 4);
    assert_eq!(meta["stats"]["blockedWrites"], 1);
    assert_eq!(meta["stats"]["coverageRatio"], 1.0);
}

#[test]
fn test_ledger_artifact_shape() {
    let out = tempfile::tempdir().unwrap();
    let mut ledger = ledger();
    writer::write_artifacts(out.path(), empty_artifacts(), &mut ledger).unwrap();

    let artifact: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(out.path().join("failure.ledger.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(artifact["runId"], "run-writer");
    assert_eq!(artifact["summary"]["total"], 0);
    assert!(artifact["failures"].as_array().unwrap().is_empty());
}

#[test]
fn test_writes_are_idempotent_for_identical_inputs() {
    let out = tempfile::tempdir().unwrap();
    let mut ledger_a = ledger();
    writer::write_artifacts(out.path(), empty_artifacts(), &mut ledger_a).unwrap();
    let first = std::fs::read_to_string(out.path().join("REPORT.json")).unwrap();

    let mut ledger_b = ledger();
    writer::write_artifacts(out.path(), empty_artifacts(), &mut ledger_b).unwrap();
    let second = std::fs::read_to_string(out.path().join("REPORT.json")).unwrap();
    assert_eq!(first, second, "identical inputs must produce identical bytes");
}
