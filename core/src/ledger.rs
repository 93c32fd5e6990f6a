//! Failure ledger.
//!
//! Append-only, classified failures with a monotonically increasing
//! sequence. The ledger is written exactly once at end-of-run; its highest
//! severity and categories drive the exit code.

use std::collections::BTreeMap;

use serde::Serialize;
use verax_common::TimeProvider;

/// Failure category (what subsystem contract broke).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCategory {
    Evidence,
    Determinism,
    Observe,
    Detect,
    Verify,
    Report,
    Contract,
    Policy,
    Io,
    Internal,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Evidence => "EVIDENCE",
            Self::Determinism => "DETERMINISM",
            Self::Observe => "OBSERVE",
            Self::Detect => "DETECT",
            Self::Verify => "VERIFY",
            Self::Report => "REPORT",
            Self::Contract => "CONTRACT",
            Self::Policy => "POLICY",
            Self::Io => "IO",
            Self::Internal => "INTERNAL",
        }
    }
}

/// How badly the run is compromised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureSeverity {
    Warning,
    Degraded,
    Blocking,
}

impl FailureSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warning => "WARNING",
            Self::Degraded => "DEGRADED",
            Self::Blocking => "BLOCKING",
        }
    }
}

/// Which run phase recorded the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunPhase {
    Learn,
    Observe,
    Detect,
    Write,
    Verify,
    Verdict,
    Report,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Learn => "LEARN",
            Self::Observe => "OBSERVE",
            Self::Detect => "DETECT",
            Self::Write => "WRITE",
            Self::Verify => "VERIFY",
            Self::Verdict => "VERDICT",
            Self::Report => "REPORT",
        }
    }
}

/// One classified failure.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntry {
    pub sequence: u64,
    pub relative_time_ms: u64,
    pub code: String,
    pub category: FailureCategory,
    pub severity: FailureSeverity,
    pub phase: RunPhase,
    pub is_recoverable: bool,
    pub message: String,
    pub component: String,
    pub context: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub impact: Option<String>,
}

/// Append-only failure ledger for one run.
#[derive(Debug)]
pub struct FailureLedger {
    time: TimeProvider,
    run_id: String,
    start_iso: String,
    start_ms: u64,
    entries: Vec<LedgerEntry>,
}

impl FailureLedger {
    pub fn new(run_id: &str, time: TimeProvider) -> Self {
        let start_iso = time.iso_now();
        let start_ms = time.now_ms();
        Self {
            time,
            run_id: run_id.to_string(),
            start_iso,
            start_ms,
            entries: Vec::new(),
        }
    }

    /// Append a classified failure. The sequence is assigned here and never
    /// reused.
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        &mut self,
        code: &str,
        category: FailureCategory,
        severity: FailureSeverity,
        phase: RunPhase,
        component: &str,
        message: &str,
        context: serde_json::Value,
        is_recoverable: bool,
    ) {
        let entry = LedgerEntry {
            sequence: self.entries.len() as u64,
            relative_time_ms: self.time.now_ms().saturating_sub(self.start_ms),
            code: code.to_string(),
            category,
            severity,
            phase,
            is_recoverable,
            message: message.to_string(),
            component: component.to_string(),
            context,
            impact: None,
        };
        tracing::warn!(
            code = entry.code,
            category = category.as_str(),
            severity = severity.as_str(),
            "ledger entry recorded"
        );
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Any entry that makes the run INCOMPLETE.
    pub fn has_blocking_or_degraded(&self) -> bool {
        self.entries
            .iter()
            .any(|e| e.severity >= FailureSeverity::Degraded)
    }

    /// Any entry that makes the run an invariant violation.
    pub fn has_contract_or_internal(&self) -> bool {
        self.entries.iter().any(|e| {
            e.category == FailureCategory::Contract || e.category == FailureCategory::Internal
        })
    }

    /// Serialize to the ledger artifact shape.
    pub fn to_artifact(&self) -> serde_json::Value {
        let end_iso = self.time.iso_now();
        let duration = self.time.now_ms().saturating_sub(self.start_ms);

        let mut by_severity: BTreeMap<&str, u64> = BTreeMap::new();
        let mut by_category: BTreeMap<&str, u64> = BTreeMap::new();
        let mut by_phase: BTreeMap<&str, u64> = BTreeMap::new();
        for entry in &self.entries {
            *by_severity.entry(entry.severity.as_str()).or_default() += 1;
            *by_category.entry(entry.category.as_str()).or_default() += 1;
            *by_phase.entry(entry.phase.as_str()).or_default() += 1;
        }
        let highest = self
            .entries
            .iter()
            .map(|e| e.severity)
            .max()
            .map(|s| s.as_str().to_string());

        serde_json::json!({
            "runId": self.run_id,
            "startTime": self.start_iso,
            "endTime": end_iso,
            "duration": duration,
            "summary": {
                "total": self.entries.len(),
                "bySeverity": by_severity,
                "byCategory": by_category,
                "byPhase": by_phase,
                "highestSeverity": highest,
            },
            "failures": self.entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ledger() -> FailureLedger {
        FailureLedger::new("run-test", TimeProvider::fixed(50, "2024-01-01T00:00:00+00:00"))
    }

    #[test]
    fn test_sequence_is_monotonic() {
        let mut ledger = ledger();
        for i in 0..3 {
            ledger.record(
                &format!("code-{i}"),
                FailureCategory::Observe,
                FailureSeverity::Warning,
                RunPhase::Observe,
                "test",
                "m",
                serde_json::json!({}),
                true,
            );
        }
        let sequences: Vec<u64> = ledger.entries().iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, [0, 1, 2]);
    }

    #[test]
    fn test_blocking_detection() {
        let mut ledger = ledger();
        assert!(!ledger.has_blocking_or_degraded());
        ledger.record(
            "navigation_unreachable",
            FailureCategory::Observe,
            FailureSeverity::Blocking,
            RunPhase::Observe,
            "orchestrator",
            "connection refused",
            serde_json::json!({}),
            false,
        );
        assert!(ledger.has_blocking_or_degraded());
        assert!(!ledger.has_contract_or_internal());
    }

    #[test]
    fn test_contract_detection_and_summary() {
        let mut ledger = ledger();
        ledger.record(
            "evidence_law_violated",
            FailureCategory::Contract,
            FailureSeverity::Blocking,
            RunPhase::Write,
            "writer",
            "confirmed finding without evidence",
            serde_json::json!({}),
            false,
        );
        assert!(ledger.has_contract_or_internal());

        let artifact = ledger.to_artifact();
        assert_eq!(artifact["summary"]["total"], 1);
        assert_eq!(artifact["summary"]["byCategory"]["CONTRACT"], 1);
        assert_eq!(artifact["summary"]["highestSeverity"], "BLOCKING");
        assert_eq!(artifact["failures"][0]["sequence"], 0);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(FailureSeverity::Blocking > FailureSeverity::Degraded);
        assert!(FailureSeverity::Degraded > FailureSeverity::Warning);
    }
}
