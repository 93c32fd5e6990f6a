//! Findings detector.
//!
//! Turns observations into typed findings, gated on intent: a broken
//! navigation claim needs an explicit navigation intent whose observable
//! contract failed; weak evidence alone never reaches CONFIRMED. The
//! writer applies the Evidence Law again before anything persists — the
//! detector is the first gate, not the last.

use serde::Serialize;
use tracing::debug;
use verax_common::ids::stable_hash16;

use crate::attempt::{Attempt, Cause};
use crate::confidence::{self, ConfidenceInputs, ConfidenceLevel};
use crate::expectation::{Expectation, ExpectationKind};
use crate::intent::{
    evaluate_navigation_observables, navigation_intent, ElementSnapshot, NavigationIntent,
    RouteData,
};

/// Finding status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingStatus {
    Confirmed,
    Suspected,
    Informational,
}

impl FindingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmed => "CONFIRMED",
            Self::Suspected => "SUSPECTED",
            Self::Informational => "INFORMATIONAL",
        }
    }
}

/// Finding severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    High,
    Medium,
    Low,
    Unknown,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// Evidence backing a finding.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FindingEvidence {
    pub evidence_files: Vec<String>,
    pub categories: Vec<String>,
    pub ambiguity_reasons: Vec<String>,
}

/// Policy decisions applied to a finding.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FindingPolicy {
    pub suppressed: bool,
    pub downgraded: bool,
    pub rule: Option<serde_json::Value>,
}

/// A typed finding.
#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub id: String,
    #[serde(rename = "type")]
    pub finding_type: String,
    pub status: FindingStatus,
    pub severity: Severity,
    pub confidence: f64,
    #[serde(rename = "confidenceLevel")]
    pub confidence_level: ConfidenceLevel,
    #[serde(rename = "confidenceReasons")]
    pub confidence_reasons: Vec<String>,
    pub evidence: FindingEvidence,
    pub policy: FindingPolicy,
}

/// Strong evidence categories; at least one is required for CONFIRMED.
pub const STRONG_CATEGORIES: &[&str] = &["navigation", "meaningful_dom", "feedback", "network"];

/// Detect findings from the final observations.
pub fn detect(expectations: &[Expectation], observations: &[Attempt]) -> Vec<Finding> {
    let mut findings = Vec::new();
    for attempt in observations {
        let Some(expectation) = expectations.iter().find(|e| e.id == attempt.id) else {
            continue;
        };
        if !attempt.attempted || attempt.observed {
            continue;
        }
        // Only unacknowledged outcomes become findings; action failures
        // (not-found, blocked, prevented) are coverage gaps, not claims
        // about the app.
        if attempt.cause != Some(Cause::NoChange) {
            continue;
        }

        if let Some(finding) = detect_broken_navigation(expectation, attempt) {
            findings.push(finding);
            continue;
        }
        if let Some(finding) = detect_flow_silent_failure(expectation, attempt) {
            findings.push(finding);
            continue;
        }
        if let Some(finding) = detect_silent_failure(expectation, attempt) {
            findings.push(finding);
        }
    }
    debug!(count = findings.len(), "detection complete");
    findings
}

fn detect_broken_navigation(expectation: &Expectation, attempt: &Attempt) -> Option<Finding> {
    if expectation.kind != ExpectationKind::Navigation {
        return None;
    }
    let snapshot = navigation_snapshot(expectation);
    let intent = navigation_intent(
        &snapshot,
        attempt.url_before.as_deref(),
        attempt.url_after.as_deref(),
    );
    if intent == NavigationIntent::Unknown {
        return None;
    }
    let route = RouteData {
        before_url: attempt.url_before.clone(),
        after_url: attempt.url_after.clone(),
        transitions: 0,
    };
    let observation = evaluate_navigation_observables(intent, &attempt.signals, &route);
    if observation.effect_observed {
        return None;
    }
    Some(build_finding(
        "broken_navigation_promise",
        Severity::High,
        expectation,
        attempt,
        true,
    ))
}

fn detect_flow_silent_failure(expectation: &Expectation, attempt: &Attempt) -> Option<Finding> {
    // Requires explicit flow-step state; without it this type is never
    // produced.
    let flow = expectation.flow_step.as_ref()?;
    if flow.step + 1 < flow.total {
        return None;
    }
    Some(build_finding(
        "flow_silent_failure",
        Severity::High,
        expectation,
        attempt,
        true,
    ))
}

fn detect_silent_failure(expectation: &Expectation, attempt: &Attempt) -> Option<Finding> {
    if attempt.signals.any() {
        // Weak or partial signals: out-of-scope feedback, not a failure.
        return None;
    }
    let explicit = matches!(
        expectation.kind,
        ExpectationKind::Button | ExpectationKind::Form | ExpectationKind::Validation
    );
    if !explicit {
        return None;
    }
    Some(build_finding(
        "silent_failure",
        Severity::Medium,
        expectation,
        attempt,
        true,
    ))
}

fn build_finding(
    finding_type: &str,
    severity: Severity,
    expectation: &Expectation,
    attempt: &Attempt,
    explicit: bool,
) -> Finding {
    let categories = evidence_categories(finding_type, attempt);
    let mut ambiguity = Vec::new();
    if let Some(kind) = attempt.silence {
        ambiguity.push(format!(
            "silence-{}",
            kind.as_str().to_lowercase().replace('_', "-")
        ));
    }

    let evidence_present = !attempt.evidence_files.is_empty();
    let score = confidence::score(&ConfidenceInputs {
        finding_type,
        explicit_expectation: explicit,
        dom_compared: attempt
            .evidence_files
            .iter()
            .any(|f| f.ends_with("before.json"))
            && attempt
                .evidence_files
                .iter()
                .any(|f| f.ends_with("after.json")),
        url_compared: attempt.url_before.is_some() && attempt.url_after.is_some(),
        network_window_empty: !attempt.signals.network_activity,
        evidence_present,
    });

    let strong = categories
        .iter()
        .any(|c| STRONG_CATEGORIES.contains(&c.as_str()));
    let status = if evidence_present && strong {
        FindingStatus::Confirmed
    } else {
        FindingStatus::Suspected
    };

    Finding {
        id: format!(
            "finding-{}",
            stable_hash16(&[finding_type, &expectation.id])
        ),
        finding_type: finding_type.to_string(),
        status,
        severity,
        confidence: score.score01,
        confidence_level: score.level,
        confidence_reasons: score.reasons,
        evidence: FindingEvidence {
            evidence_files: attempt.evidence_files.clone(),
            categories,
            ambiguity_reasons: ambiguity,
        },
        policy: FindingPolicy::default(),
    }
}

/// Derive evidence categories from what was actually captured.
fn evidence_categories(finding_type: &str, attempt: &Attempt) -> Vec<String> {
    let mut categories = Vec::new();
    let has = |suffix: &str| attempt.evidence_files.iter().any(|f| f.ends_with(suffix));

    if finding_type == "broken_navigation_promise" && has("before.json") && has("after.json") {
        categories.push("navigation".to_string());
    }
    if has("before.json") && has("after.json") {
        categories.push("meaningful_dom".to_string());
    }
    if has("network.json") {
        categories.push("network".to_string());
    }
    categories
}

/// Recover the href from a learn-pass selector like `a[href="/x"]`.
fn href_from_selector(selector: &str) -> Option<String> {
    let inner = selector.strip_prefix("a[href=\"")?.strip_suffix("\"]")?;
    Some(inner.to_string())
}

fn navigation_snapshot(expectation: &Expectation) -> ElementSnapshot {
    let href = expectation
        .runtime_nav
        .as_ref()
        .map(|t| t.href.clone())
        .or_else(|| {
            expectation
                .selector
                .as_deref()
                .and_then(href_from_selector)
        })
        .or_else(|| expectation.selector.clone());
    ElementSnapshot {
        tag_name: "a".to_string(),
        href,
        role: expectation
            .runtime_nav
            .as_ref()
            .filter(|t| !t.role.is_empty())
            .map(|t| t.role.clone()),
        ..ElementSnapshot::default()
    }
}
