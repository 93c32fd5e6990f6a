//! Action dispatcher.
//!
//! One visitor over the expectation union routes each kind to its
//! executor. Executors always return a structured outcome; errors from the
//! browser layer are folded into cause hints here and never cross the
//! planner boundary as exceptions.

use tracing::debug;
use verax_browser::actions::{self, SubmitResult};
use verax_browser::error::BrowserError;
use verax_browser::session::Session;

use crate::attempt::ActionKind;
use crate::expectation::{Expectation, ExpectationKind};

/// Structured result of an action. `success=false` with a hint classifies
/// deterministically; `error` marks an unexpected executor failure.
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub success: bool,
    pub action: ActionKind,
    /// Keyword hint consumed by the classifier (`not-found`, `blocked`,
    /// `prevented`, `timeout`).
    pub cause_hint: Option<String>,
    /// Error text for unexpected failures.
    pub error: Option<String>,
}

impl ActionOutcome {
    fn ok(action: ActionKind) -> Self {
        Self {
            success: true,
            action,
            cause_hint: None,
            error: None,
        }
    }

    fn failed(action: ActionKind, hint: &str) -> Self {
        Self {
            success: false,
            action,
            cause_hint: Some(hint.to_string()),
            error: None,
        }
    }

    fn errored(action: ActionKind, message: String) -> Self {
        Self {
            success: false,
            action,
            cause_hint: None,
            error: Some(message),
        }
    }
}

/// Execute the expectation's action. Never returns an error.
pub async fn dispatch(session: &Session, expectation: &Expectation) -> ActionOutcome {
    match expectation.kind {
        ExpectationKind::Navigation => {
            if let Some(target) = &expectation.runtime_nav {
                click_outcome(
                    actions::click_path(session, &target.selector_path).await,
                )
            } else {
                click_static(session, expectation).await
            }
        }
        ExpectationKind::Button => click_static(session, expectation).await,
        ExpectationKind::Form => submit_flow(session, expectation, true).await,
        ExpectationKind::Validation => submit_flow(session, expectation, false).await,
        ExpectationKind::State => {
            // Wait + diff: the watcher's before/after capture is the whole
            // action.
            debug!(id = %expectation.id, "state expectation, wait and diff");
            ActionOutcome::ok(ActionKind::Observe)
        }
        ExpectationKind::Network => {
            // Wait for network events; correlation is narrowed to the
            // expectation's promise URL by the evidence bundle.
            debug!(id = %expectation.id, "network expectation, wait for promised activity");
            ActionOutcome::ok(ActionKind::Observe)
        }
    }
}

async fn click_static(session: &Session, expectation: &Expectation) -> ActionOutcome {
    let Some(selector) = &expectation.selector else {
        return ActionOutcome::failed(ActionKind::Click, "selector not-found");
    };
    click_outcome(actions::click_selector(session, selector).await)
}

fn click_outcome(result: Result<(), BrowserError>) -> ActionOutcome {
    match result {
        Ok(()) => ActionOutcome::ok(ActionKind::Click),
        Err(e) => browser_failure(ActionKind::Click, e),
    }
}

/// Form executors: fill (optionally) then submit, reporting prevention.
async fn submit_flow(session: &Session, expectation: &Expectation, fill: bool) -> ActionOutcome {
    let Some(selector) = &expectation.selector else {
        return ActionOutcome::failed(ActionKind::Submit, "selector not-found");
    };
    if fill {
        if let Err(e) = actions::fill_form(session, selector).await {
            return browser_failure(ActionKind::Submit, e);
        }
    }
    match actions::submit_form(session, selector).await {
        Ok(SubmitResult::Submitted) => ActionOutcome::ok(ActionKind::Submit),
        Ok(SubmitResult::Prevented) => {
            if expectation.kind == ExpectationKind::Validation {
                // Prevented default is the expected path for validation
                // probes; the watcher decides whether validation UI showed.
                ActionOutcome::ok(ActionKind::Submit)
            } else {
                ActionOutcome::failed(ActionKind::Submit, "prevented")
            }
        }
        Err(e) => browser_failure(ActionKind::Submit, e),
    }
}

fn browser_failure(action: ActionKind, error: BrowserError) -> ActionOutcome {
    match &error {
        BrowserError::SelectorNotFound { .. } => ActionOutcome::failed(action, "not-found"),
        BrowserError::NotInteractable { .. } => {
            ActionOutcome::failed(action, "not-interactable blocked")
        }
        BrowserError::SubmitPrevented { .. } => ActionOutcome::failed(action, "prevented"),
        BrowserError::NavigationTimeout { .. } => ActionOutcome::failed(action, "timeout"),
        _ => ActionOutcome::errored(ActionKind::Error, error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_browser_failures_map_to_hints() {
        let outcome = browser_failure(
            ActionKind::Click,
            BrowserError::SelectorNotFound {
                selector: "#x".to_string(),
            },
        );
        assert!(!outcome.success);
        assert_eq!(outcome.cause_hint.as_deref(), Some("not-found"));

        let outcome = browser_failure(
            ActionKind::Click,
            BrowserError::NotInteractable {
                selector: "#x".to_string(),
            },
        );
        assert_eq!(
            outcome.cause_hint.as_deref(),
            Some("not-interactable blocked")
        );

        let outcome = browser_failure(
            ActionKind::Submit,
            BrowserError::NavigationTimeout {
                url: "u".to_string(),
                timeout_ms: 1,
            },
        );
        assert_eq!(outcome.cause_hint.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_unexpected_failure_becomes_error_outcome() {
        let outcome = browser_failure(
            ActionKind::Click,
            BrowserError::Evaluation {
                detail: "boom".to_string(),
            },
        );
        assert!(!outcome.success);
        assert_eq!(outcome.action, ActionKind::Error);
        assert!(outcome.error.as_deref().unwrap_or_default().contains("boom"));
        assert!(outcome.cause_hint.is_none());
    }
}
