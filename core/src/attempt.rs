//! Attempt rows: one executed-or-skipped record per expectation.

use serde::{Deserialize, Serialize};

use crate::outcome::SilenceKind;
use crate::signals::Signals;

/// The action the dispatcher took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Click,
    Submit,
    Observe,
    Unsupported,
    Error,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::Submit => "submit",
            Self::Observe => "observe",
            Self::Unsupported => "unsupported",
            Self::Error => "error",
        }
    }
}

/// Closed failure-cause taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cause {
    NotFound,
    Blocked,
    PreventedSubmit,
    Timeout,
    NoChange,
    Error,
}

impl Cause {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not-found",
            Self::Blocked => "blocked",
            Self::PreventedSubmit => "prevented-submit",
            Self::Timeout => "timeout",
            Self::NoChange => "no-change",
            Self::Error => "error",
        }
    }
}

/// The single record corresponding to one expectation in the plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    /// Expectation ID this attempt belongs to.
    pub id: String,
    /// Expectation kind, denormalized for artifact readers.
    pub kind: String,
    pub attempted: bool,
    pub observed: bool,
    pub action: ActionKind,
    /// Stable reason code; `None` when the expectation was observed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<Cause>,
    pub signals: Signals,
    /// Relative path (under the evidence dir) of this attempt's artifacts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence_ref: Option<String>,
    /// Evidence files written for this attempt, relative to the evidence dir.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence_files: Vec<String>,
    /// Silence classification when nothing at all was observed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub silence: Option<SilenceKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_before: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_after: Option<String>,
}

impl Attempt {
    /// A skipped attempt (never reached the action).
    pub fn skipped(id: &str, kind: &str, reason: &str, cause: Cause) -> Self {
        Self {
            id: id.to_string(),
            kind: kind.to_string(),
            attempted: false,
            observed: false,
            action: ActionKind::Unsupported,
            reason: Some(reason.to_string()),
            cause: Some(cause),
            signals: Signals::default(),
            evidence_ref: None,
            evidence_files: Vec::new(),
            silence: None,
            url_before: None,
            url_after: None,
        }
    }
}
