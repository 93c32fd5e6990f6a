//! Expectations: predictions that an interaction produces a named
//! observable outcome.
//!
//! Created during discovery (static learn pass or runtime extraction),
//! immutable thereafter. IDs are deterministic hashes of the expectation's
//! identity; two runs over the same inputs produce byte-identical IDs.

use serde::{Deserialize, Serialize};
use verax_browser::discovery::RuntimeTarget;
use verax_common::ids::stable_hash16;

/// What kind of locus the expectation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectationKind {
    Navigation,
    Button,
    Form,
    Validation,
    State,
    Network,
}

impl ExpectationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Navigation => "navigation",
            Self::Button => "button",
            Self::Form => "form",
            Self::Validation => "validation",
            Self::State => "state",
            Self::Network => "network",
        }
    }
}

/// The outcome the interaction is expected to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedOutcome {
    Navigation,
    Feedback,
    Network,
    UiChange,
}

impl ExpectedOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Navigation => "navigation",
            Self::Feedback => "feedback",
            Self::Network => "network",
            Self::UiChange => "ui_change",
        }
    }
}

/// Where the expectation came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectationSource {
    pub file: String,
    pub line: u32,
    /// `learn` for static extraction, `observe` for runtime discovery.
    pub discovered_at_phase: String,
}

/// Marker tying an expectation into a multi-step flow. Only expectations
/// carrying this can ever produce a `flow_silent_failure` finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowStep {
    pub flow_id: String,
    pub step: u32,
    pub total: u32,
}

/// A prediction that interacting with some locus of the app will produce a
/// named observable outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expectation {
    pub id: String,
    pub kind: ExpectationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    pub expected_outcome: ExpectedOutcome,
    pub source: ExpectationSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_nav: Option<RuntimeTarget>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow_step: Option<FlowStep>,
    /// URL a network expectation promises to hit; correlation requires an
    /// app-initiated event matching this path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promise_url: Option<String>,
}

impl Expectation {
    /// A static expectation from the learn pass. The ID hashes the
    /// expectation's identity; no timestamps, no randomness.
    pub fn from_static(
        kind: ExpectationKind,
        selector: Option<String>,
        expected_outcome: ExpectedOutcome,
        source: ExpectationSource,
    ) -> Self {
        let id = format!(
            "exp-{}",
            stable_hash16(&[
                kind.as_str(),
                selector.as_deref().unwrap_or(""),
                expected_outcome.as_str(),
                &source.file,
                &source.line.to_string(),
            ])
        );
        Self {
            id,
            kind,
            selector,
            expected_outcome,
            source,
            runtime_nav: None,
            flow_step: None,
            promise_url: None,
        }
    }

    /// Attach the URL a network promise is expected to hit.
    pub fn with_promise_url(mut self, url: impl Into<String>) -> Self {
        self.promise_url = Some(url.into());
        self
    }

    /// An expectation wrapping a runtime-discovered navigation target. The
    /// target's own deterministic ID becomes the expectation ID.
    pub fn from_runtime_target(target: RuntimeTarget, page_url: &str) -> Self {
        Self {
            id: target.id.clone(),
            kind: ExpectationKind::Navigation,
            selector: Some(target.selector_path.clone()),
            expected_outcome: ExpectedOutcome::Navigation,
            source: ExpectationSource {
                file: page_url.to_string(),
                line: 0,
                discovered_at_phase: "observe".to_string(),
            },
            runtime_nav: Some(target),
            flow_step: None,
            promise_url: None,
        }
    }

    /// Whether this expectation came from runtime discovery.
    pub fn is_runtime_nav(&self) -> bool {
        self.runtime_nav.is_some()
    }
}
