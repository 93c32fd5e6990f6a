//! Browser error taxonomy.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias for browser operations.
pub type Result<T> = std::result::Result<T, BrowserError>;

/// Errors raised by browser plumbing.
///
/// Variant messages deliberately carry the cause keywords the planner's
/// classifier keys on (`not-found`, `not-interactable`, `prevented`,
/// `timeout`) so a stringified error still classifies correctly.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// No usable browser executable was found.
    #[error("Browser runtime not ready: {reason}")]
    NotReady { reason: String },

    /// Bootstrap installer was requested but failed or was unavailable.
    #[error("browser_bootstrap_failed: {detail}")]
    BootstrapFailed { detail: String },

    /// Launching the browser process failed.
    #[error("Failed to launch browser: {detail}")]
    Launch { detail: String },

    /// The CDP connection dropped or a command failed.
    #[error("Browser command failed: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),

    /// Navigation did not complete within its bound.
    #[error("Navigation timeout after {timeout_ms} ms for {url}")]
    NavigationTimeout { url: String, timeout_ms: u64 },

    /// A selector matched no element.
    #[error("Element not-found for selector {selector}")]
    SelectorNotFound { selector: String },

    /// An element exists but cannot receive the interaction.
    #[error("Element not-interactable (blocked) for selector {selector}")]
    NotInteractable { selector: String },

    /// A form refused submission (prevented by the page).
    #[error("Form submit prevented for selector {selector}")]
    SubmitPrevented { selector: String },

    /// The in-page route sensor is missing or failed to install.
    #[error("Route sensor failure: {detail}")]
    SensorFailure { detail: String },

    /// In-page script evaluation produced an unusable result.
    #[error("Script evaluation failed: {detail}")]
    Evaluation { detail: String },

    /// Profile directory management failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl BrowserError {
    /// Stable reason token used in ledger entries and attempt rows.
    pub fn reason_token(&self) -> &'static str {
        match self {
            Self::NotReady { .. } => "runtime_not_ready",
            Self::BootstrapFailed { .. } => "browser_bootstrap_failed",
            Self::Launch { .. } => "browser_launch_failed",
            Self::Cdp(_) => "browser_command_failed",
            Self::NavigationTimeout { .. } => "navigation_timeout",
            Self::SelectorNotFound { .. } => "selector-not-found",
            Self::NotInteractable { .. } => "element-not-interactable",
            Self::SubmitPrevented { .. } => "form-submit-prevented",
            Self::SensorFailure { .. } => "sensor-failure",
            Self::Evaluation { .. } => "script-evaluation-failed",
            Self::Io { .. } => "io-error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_classifier_keywords() {
        let not_found = BrowserError::SelectorNotFound {
            selector: "#go".to_string(),
        };
        assert!(not_found.to_string().contains("not-found"));

        let blocked = BrowserError::NotInteractable {
            selector: "#go".to_string(),
        };
        assert!(blocked.to_string().contains("not-interactable"));

        let prevented = BrowserError::SubmitPrevented {
            selector: "form".to_string(),
        };
        assert!(prevented.to_string().contains("prevented"));

        let timeout = BrowserError::NavigationTimeout {
            url: "http://x.test".to_string(),
            timeout_ms: 10,
        };
        assert!(timeout.to_string().to_lowercase().contains("timeout"));
    }
}
