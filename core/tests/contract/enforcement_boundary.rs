//! Evidence-Law enforcement at the write boundary.
//!
//! A CONFIRMED finding without evidence files must persist as SUSPECTED
//! with the enforcement reason, and the run exits with the findings code,
//! not an invariant violation.

use pretty_assertions::assert_eq;
use verax_common::TimeProvider;
use verax_core::confidence::ConfidenceLevel;
use verax_core::findings::{Finding, FindingEvidence, FindingPolicy, FindingStatus, Severity};
use verax_core::ledger::FailureLedger;
use verax_core::writer::{self, ExitCode, RunArtifacts, RunStats};

fn ledger() -> FailureLedger {
    FailureLedger::new(
        "run-enforcement",
        TimeProvider::fixed(10, "2024-01-01T00:00:00+00:00"),
    )
}

fn confirmed_finding(files: Vec<String>) -> Finding {
    Finding {
        id: "finding-e2e".to_string(),
        finding_type: "silent_failure".to_string(),
        status: FindingStatus::Confirmed,
        severity: Severity::Medium,
        confidence: 0.8,
        confidence_level: ConfidenceLevel::Medium,
        confidence_reasons: vec![
            "explicit-intent".to_string(),
            "dom-stable-comparison".to_string(),
        ],
        evidence: FindingEvidence {
            evidence_files: files,
            categories: vec!["meaningful_dom".to_string()],
            ambiguity_reasons: vec![],
        },
        policy: FindingPolicy::default(),
    }
}

fn artifacts(findings: Vec<Finding>) -> RunArtifacts {
    RunArtifacts {
        url: "https://app.test/".to_string(),
        src: "./app".to_string(),
        detected_at_iso: "2024-01-01T00:00:00+00:00".to_string(),
        findings,
        coverage_gaps: vec![],
        stats: RunStats {
            total_expectations: 1,
            attempted: 1,
            observed: 0,
            not_observed: 1,
            skipped: 0,
            blocked_writes: 0,
            coverage_ratio: 0.0,
        },
        version: "0.4.1".to_string(),
        debug_payload: None,
    }
}

#[test]
fn test_confirmed_without_evidence_is_downgraded_and_exits_findings() {
    let out = tempfile::tempdir().unwrap();
    let mut ledger = ledger();

    let enforced = writer::write_artifacts(
        out.path(),
        artifacts(vec![confirmed_finding(vec![])]),
        &mut ledger,
    )
    .unwrap();

    assert_eq!(enforced.len(), 1);
    assert_eq!(enforced[0].status, FindingStatus::Suspected);
    assert!(enforced[0].policy.downgraded);

    // The persisted report carries the enforcement reason.
    let report = std::fs::read_to_string(out.path().join("REPORT.json")).unwrap();
    assert!(report.contains("SUSPECTED"));
    assert!(report.contains("Evidence Law enforced"));

    // Downgrade is the remedy, not a violation: exit 20, not 50.
    let exit = writer::decide_exit(false, &ledger, enforced.len());
    assert_eq!(exit, ExitCode::Findings);
    assert!(!ledger.has_contract_or_internal());
}

#[test]
fn test_confirmed_with_real_evidence_survives() {
    let out = tempfile::tempdir().unwrap();
    let evidence_dir = out.path().join("EVIDENCE/exp-1");
    std::fs::create_dir_all(&evidence_dir).unwrap();
    std::fs::write(evidence_dir.join("before.json"), b"{}\n").unwrap();
    std::fs::write(evidence_dir.join("after.json"), b"{}\n").unwrap();

    let mut ledger = ledger();
    let enforced = writer::write_artifacts(
        out.path(),
        artifacts(vec![confirmed_finding(vec![
            "exp-1/before.json".to_string(),
            "exp-1/after.json".to_string(),
        ])]),
        &mut ledger,
    )
    .unwrap();

    assert_eq!(enforced[0].status, FindingStatus::Confirmed);
    assert!(!enforced[0].policy.downgraded);

    let report = std::fs::read_to_string(out.path().join("REPORT.json")).unwrap();
    assert!(report.contains("CONFIRMED"));
    assert!(!report.contains("Evidence Law enforced"));
}

#[test]
fn test_dangling_evidence_reference_is_downgraded() {
    let out = tempfile::tempdir().unwrap();
    let mut ledger = ledger();

    let enforced = writer::write_artifacts(
        out.path(),
        artifacts(vec![confirmed_finding(vec![
            "exp-1/never-written.json".to_string(),
        ])]),
        &mut ledger,
    )
    .unwrap();

    assert_eq!(enforced[0].status, FindingStatus::Suspected);
    assert_eq!(
        writer::decide_exit(false, &ledger, enforced.len()),
        ExitCode::Findings
    );
}
