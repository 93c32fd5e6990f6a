//! Unified confidence engine.
//!
//! A deterministic function from finding context to a 0..1 score, a
//! derived level, and 2..4 stable reason codes. Thresholds and codes never
//! vary across runs; nothing here reads the clock.

use serde::Serialize;

/// Derived confidence level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
    Unproven,
}

impl ConfidenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
            Self::Unproven => "UNPROVEN",
        }
    }
}

/// Inputs to the confidence computation.
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceInputs<'a> {
    pub finding_type: &'a str,
    /// The expectation was explicit (declared source or inferred intent),
    /// not a guess from weak signals.
    pub explicit_expectation: bool,
    /// Before/after DOM snapshots were both captured and comparable.
    pub dom_compared: bool,
    /// Before/after URLs were both captured.
    pub url_compared: bool,
    /// The correlation window contained no app-initiated network activity.
    pub network_window_empty: bool,
    /// At least one evidence file backs the finding.
    pub evidence_present: bool,
}

/// Computed confidence.
#[derive(Debug, Clone, Serialize)]
pub struct Score {
    pub score01: f64,
    pub score100: u8,
    pub level: ConfidenceLevel,
    pub reasons: Vec<String>,
}

const HIGH_THRESHOLD: f64 = 0.85;
const MEDIUM_THRESHOLD: f64 = 0.60;

fn base_weight(finding_type: &str) -> f64 {
    match finding_type {
        "broken_navigation_promise" => 0.55,
        "flow_silent_failure" => 0.50,
        "silent_failure" => 0.45,
        _ => 0.40,
    }
}

/// Compute the unified confidence score.
pub fn score(inputs: &ConfidenceInputs<'_>) -> Score {
    let mut value = base_weight(inputs.finding_type);
    let mut reasons = Vec::new();

    if inputs.explicit_expectation {
        value += 0.20;
        reasons.push("explicit-intent".to_string());
    }
    if inputs.dom_compared {
        value += 0.15;
        reasons.push("dom-stable-comparison".to_string());
    }
    if inputs.network_window_empty {
        value += 0.10;
        reasons.push("no-network-activity".to_string());
    }
    if inputs.url_compared {
        value += 0.10;
        reasons.push("url-comparison-available".to_string());
    }
    if inputs.evidence_present {
        reasons.push("evidence-captured".to_string());
    } else {
        reasons.push("no-evidence-files".to_string());
    }
    if reasons.len() < 2 {
        reasons.push("weak-signals-only".to_string());
    }
    reasons.truncate(4);

    let score01 = value.clamp(0.0, 1.0);
    let level = if !inputs.evidence_present {
        ConfidenceLevel::Unproven
    } else if score01 >= HIGH_THRESHOLD {
        ConfidenceLevel::High
    } else if score01 >= MEDIUM_THRESHOLD {
        ConfidenceLevel::Medium
    } else {
        ConfidenceLevel::Low
    };

    Score {
        score01,
        score100: (score01 * 100.0).round() as u8,
        level,
        reasons,
    }
}
