//! Evidence-Law enforcement.
//!
//! The pure last line of defense before persistence: a CONFIRMED finding
//! whose evidence files are missing — or that lists none — is downgraded
//! to SUSPECTED. The writer calls this on the final payload; nothing
//! upstream can bypass it.

use std::path::Path;

use tracing::warn;

use crate::findings::{Finding, FindingStatus};

/// The downgrade reason recorded on enforced findings.
pub const ENFORCEMENT_REASON: &str = "Evidence Law enforced";

/// Apply the Evidence Law to every finding. Pure function of the findings
/// and the on-disk evidence tree; the returned list is the canonical
/// report payload.
pub fn enforce(findings: Vec<Finding>, evidence_dir: &Path) -> Vec<Finding> {
    findings
        .into_iter()
        .map(|finding| enforce_one(finding, evidence_dir))
        .collect()
}

fn enforce_one(mut finding: Finding, evidence_dir: &Path) -> Finding {
    if finding.status != FindingStatus::Confirmed {
        return finding;
    }

    let violation = if finding.evidence.evidence_files.is_empty() {
        Some("no evidence files referenced")
    } else if let Some(missing) = first_missing(&finding.evidence.evidence_files, evidence_dir) {
        warn!(finding = %finding.id, file = %missing, "referenced evidence file missing");
        Some("referenced evidence file missing")
    } else {
        None
    };

    if let Some(detail) = violation {
        finding.status = FindingStatus::Suspected;
        finding.policy.downgraded = true;
        finding.policy.rule = Some(serde_json::json!({
            "reason": ENFORCEMENT_REASON,
            "detail": detail,
        }));
        finding
            .evidence
            .ambiguity_reasons
            .push("evidence-law-enforced".to_string());
    }
    finding
}

/// First referenced file that does not exist under the evidence tree.
/// Paths escaping the tree count as missing.
fn first_missing(files: &[String], evidence_dir: &Path) -> Option<String> {
    files
        .iter()
        .find(|file| {
            if file.split('/').any(|segment| segment == "..") || Path::new(file).is_absolute() {
                return true;
            }
            !evidence_dir.join(file).is_file()
        })
        .cloned()
}
