//! Deterministic artifact writer and exit-code contract.
//!
//! Writes the flat `.verax/` layout atomically with canonical key order.
//! The Evidence Law is enforced here, at the write boundary, as the
//! authoritative last line of defense; redaction runs exactly once over
//! the full payload before persistence. REPORT.json never carries
//! diagnostics, enforcement, internal errors, or debug payloads.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use tracing::info;
use verax_common::atomic::write_json_atomic;
use verax_common::redact::redact_body;

use crate::enforcement;
use crate::error::{Result, VeraxError};
use crate::findings::{Finding, FindingStatus};
use crate::ledger::{FailureCategory, FailureLedger, FailureSeverity, RunPhase};

/// The closed exit-code set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success,
    Findings,
    Incomplete,
    InvariantViolation,
    UsageError,
}

impl ExitCode {
    pub fn code(&self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Findings => 20,
            Self::Incomplete => 30,
            Self::InvariantViolation => 50,
            Self::UsageError => 64,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Findings => "FINDINGS",
            Self::Incomplete => "INCOMPLETE",
            Self::InvariantViolation => "INVARIANT_VIOLATION",
            Self::UsageError => "USAGE_ERROR",
        }
    }
}

/// Run status persisted in META.json.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Success,
    Findings,
    Incomplete,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Findings => "FINDINGS",
            Self::Incomplete => "INCOMPLETE",
        }
    }
}

/// Observation statistics persisted in META.json.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    pub total_expectations: u64,
    pub attempted: u64,
    pub observed: u64,
    pub not_observed: u64,
    pub skipped: u64,
    pub blocked_writes: u64,
    pub coverage_ratio: f64,
}

/// Everything the writer persists for one run.
#[derive(Debug)]
pub struct RunArtifacts {
    pub url: String,
    pub src: String,
    pub detected_at_iso: String,
    pub findings: Vec<Finding>,
    pub coverage_gaps: Vec<serde_json::Value>,
    pub stats: RunStats,
    pub version: String,
    /// State-machine traces, written only with `debug`.
    pub debug_payload: Option<serde_json::Value>,
}

/// Decide the run status from the ledger and the (enforced) findings.
pub fn run_status(ledger: &FailureLedger, findings_count: usize) -> RunStatus {
    if ledger.has_blocking_or_degraded() {
        RunStatus::Incomplete
    } else if findings_count > 0 {
        RunStatus::Findings
    } else {
        RunStatus::Success
    }
}

/// Exit-code decision, highest precedence first.
pub fn decide_exit(usage_error: bool, ledger: &FailureLedger, findings_count: usize) -> ExitCode {
    if usage_error {
        ExitCode::UsageError
    } else if ledger.has_contract_or_internal() {
        ExitCode::InvariantViolation
    } else if ledger.has_blocking_or_degraded() {
        ExitCode::Incomplete
    } else if findings_count > 0 {
        ExitCode::Findings
    } else {
        ExitCode::Success
    }
}

/// Per-severity histogram over findings; I4 requires SUMMARY counts to be
/// derived from the findings list itself.
pub fn severity_counts(findings: &[Finding]) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for finding in findings {
        *counts
            .entry(finding.severity.as_str().to_string())
            .or_default() += 1;
    }
    counts
}

/// Write all artifacts. Enforcement runs here on the final findings list;
/// the caller receives the enforced findings back for exit-code decisions.
pub fn write_artifacts(
    out_dir: &Path,
    mut artifacts: RunArtifacts,
    ledger: &mut FailureLedger,
) -> Result<Vec<Finding>> {
    let evidence_dir = out_dir.join("EVIDENCE");
    std::fs::create_dir_all(&evidence_dir).map_err(|e| VeraxError::ArtifactWrite {
        path: evidence_dir.clone(),
        source: e,
    })?;

    // Evidence Law: the write boundary is authoritative.
    artifacts.findings = enforcement::enforce(artifacts.findings, &evidence_dir);

    // A CONFIRMED finding surviving enforcement without files would be a
    // contract violation; record it rather than persisting it silently.
    for finding in &artifacts.findings {
        if finding.status == FindingStatus::Confirmed
            && finding.evidence.evidence_files.is_empty()
        {
            ledger.record(
                "evidence_law_violated",
                FailureCategory::Contract,
                FailureSeverity::Blocking,
                RunPhase::Write,
                "writer",
                &format!("finding {} is CONFIRMED without evidence", finding.id),
                serde_json::json!({ "finding": finding.id }),
                false,
            );
        }
    }

    let status = run_status(ledger, artifacts.findings.len());

    let report = build_report(&artifacts)?;
    write_value(out_dir, "REPORT.json", &report)?;

    let meta = serde_json::json!({
        "timestamp": artifacts.detected_at_iso,
        "url": artifacts.url,
        "src": artifacts.src,
        "status": status.as_str(),
        "veraxVersion": artifacts.version,
        "stats": serde_json::to_value(&artifacts.stats)?,
    });
    write_value(out_dir, "META.json", &meta)?;

    write_value(out_dir, "failure.ledger.json", &ledger.to_artifact())?;

    let summary = summary_markdown(&artifacts, status);
    verax_common::atomic::write_atomic(&out_dir.join("SUMMARY.md"), summary.as_bytes()).map_err(
        |e| VeraxError::ArtifactWrite {
            path: out_dir.join("SUMMARY.md"),
            source: e,
        },
    )?;

    if let Some(debug) = &artifacts.debug_payload {
        write_value(out_dir, "EVIDENCE/logs/debug.json", debug)?;
    }

    info!(
        out = %out_dir.display(),
        findings = artifacts.findings.len(),
        status = status.as_str(),
        "artifacts written"
    );
    Ok(artifacts.findings)
}

/// Build REPORT.json: findings only, schema-pure by construction, redacted
/// exactly once as a whole payload.
fn build_report(artifacts: &RunArtifacts) -> Result<serde_json::Value> {
    let report = serde_json::json!({
        "schemaVersion": 1,
        "url": artifacts.url,
        "detectedAt": artifacts.detected_at_iso,
        "findings": serde_json::to_value(&artifacts.findings)?,
        "coverageGaps": artifacts.coverage_gaps,
    });
    let report = redact_body(&report);
    debug_assert!(report_is_pure(&report));
    Ok(report)
}

/// Keys REPORT.json must never contain, at any depth of its top level.
const FORBIDDEN_REPORT_KEYS: &[&str] = &["diagnostics", "enforcement", "internalErrors", "debug"];

fn report_is_pure(report: &serde_json::Value) -> bool {
    report
        .as_object()
        .is_some_and(|map| FORBIDDEN_REPORT_KEYS.iter().all(|k| !map.contains_key(*k)))
}

fn write_value(out_dir: &Path, name: &str, value: &serde_json::Value) -> Result<()> {
    let path = out_dir.join(name);
    write_json_atomic(&path, value).map_err(|e| VeraxError::ArtifactWrite { path, source: e })
}

fn summary_markdown(artifacts: &RunArtifacts, status: RunStatus) -> String {
    let mut out = String::new();
    out.push_str("# VERAX Run Summary\n\n");
    out.push_str(&format!("- **Status**: {}\n", status.as_str()));
    out.push_str(&format!("- **URL**: {}\n", artifacts.url));
    out.push_str(&format!("- **Findings**: {}\n", artifacts.findings.len()));
    out.push_str(&format!(
        "- **Coverage**: {:.0}% ({}/{} expectations observed)\n",
        artifacts.stats.coverage_ratio * 100.0,
        artifacts.stats.observed,
        artifacts.stats.total_expectations
    ));
    out.push_str(&format!(
        "- **Blocked writes**: {}\n",
        artifacts.stats.blocked_writes
    ));

    let counts = severity_counts(&artifacts.findings);
    if !counts.is_empty() {
        out.push_str("\n## Findings by severity\n\n");
        out.push_str("| Severity | Count |\n|----------|-------|\n");
        for (severity, count) in &counts {
            out.push_str(&format!("| {severity} | {count} |\n"));
        }
    }

    if !artifacts.findings.is_empty() {
        out.push_str("\n## Findings\n\n");
        out.push_str("| ID | Type | Status | Severity | Confidence |\n");
        out.push_str("|----|------|--------|----------|------------|\n");
        for finding in &artifacts.findings {
            out.push_str(&format!(
                "| {} | {} | {} | {} | {} ({:.0}%) |\n",
                finding.id,
                finding.finding_type,
                finding.status.as_str(),
                finding.severity.as_str(),
                finding.confidence_level.as_str(),
                finding.confidence * 100.0,
            ));
        }
    }

    out.push('\n');
    out
}
