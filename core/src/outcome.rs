//! Outcome evaluation and silence classification.
//!
//! `meets_expectation` is the canonical satisfaction table; the silence
//! classifier assigns exactly one kind from a closed set by deterministic
//! precedence. Neither reads the clock.

use serde::{Deserialize, Serialize};

use crate::expectation::ExpectedOutcome;
use crate::signals::Signals;

/// Whether the observed signals satisfy the expected outcome.
pub fn meets_expectation(expected: ExpectedOutcome, signals: &Signals) -> bool {
    match expected {
        ExpectedOutcome::Navigation => signals.navigation_changed || signals.route_changed,
        ExpectedOutcome::Feedback => signals.feedback_seen,
        ExpectedOutcome::Network => {
            signals.correlated_network_activity || signals.network_activity
        }
        ExpectedOutcome::UiChange => {
            signals.navigation_changed
                || signals.meaningful_dom_change
                || signals.feedback_seen
                || signals.correlated_network_activity
        }
    }
}

/// Closed set of silence kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SilenceKind {
    TrueSilence,
    SlowAcknowledgment,
    BlockedByAuth,
    ServerSideOnly,
    UiRenderFailure,
    NetworkTimeout,
    UserNavigation,
}

impl SilenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TrueSilence => "TRUE_SILENCE",
            Self::SlowAcknowledgment => "SLOW_ACKNOWLEDGMENT",
            Self::BlockedByAuth => "BLOCKED_BY_AUTH",
            Self::ServerSideOnly => "SERVER_SIDE_ONLY",
            Self::UiRenderFailure => "UI_RENDER_FAILURE",
            Self::NetworkTimeout => "NETWORK_TIMEOUT",
            Self::UserNavigation => "USER_NAVIGATION",
        }
    }
}

/// Inputs to silence classification, extracted from the attempt's evidence
/// window.
#[derive(Debug, Clone, Default)]
pub struct SilenceInputs {
    /// The page navigated for a reason unrelated to the attempt.
    pub user_navigation: bool,
    /// HTTP statuses received within the correlation window.
    pub statuses: Vec<u16>,
    /// Requests sent that never received a response.
    pub requests_without_response: usize,
    /// Console texts captured within the window.
    pub console: Vec<String>,
    /// Whether the DOM changed at all (weak changes included).
    pub dom_changed: bool,
    /// Acknowledgment signals that arrived only after the watcher window.
    pub signals_after_deadline: bool,
}

/// Assign exactly one silence kind by deterministic precedence.
pub fn classify_silence(inputs: &SilenceInputs) -> SilenceKind {
    if inputs.user_navigation {
        return SilenceKind::UserNavigation;
    }

    let console_lower: Vec<String> = inputs.console.iter().map(|s| s.to_lowercase()).collect();
    let console_has = |needle: &str| console_lower.iter().any(|s| s.contains(needle));

    if inputs.statuses.iter().any(|s| *s == 401 || *s == 403)
        || console_has("unauthorized")
        || console_has("login required")
    {
        return SilenceKind::BlockedByAuth;
    }

    if inputs.requests_without_response > 0 || console_has("timeout") {
        return SilenceKind::NetworkTimeout;
    }

    let any_2xx = inputs.statuses.iter().any(|s| (200..300).contains(s));
    if any_2xx {
        let render_error = console_has("render") || console_has("hydration");
        if render_error && !inputs.dom_changed {
            return SilenceKind::UiRenderFailure;
        }
        if !inputs.dom_changed {
            return SilenceKind::ServerSideOnly;
        }
    }

    if inputs.signals_after_deadline {
        return SilenceKind::SlowAcknowledgment;
    }

    SilenceKind::TrueSilence
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_navigation_satisfied_by_url_or_route() {
        let url = Signals {
            navigation_changed: true,
            ..Signals::default()
        };
        let route = Signals {
            route_changed: true,
            ..Signals::default()
        };
        assert!(meets_expectation(ExpectedOutcome::Navigation, &url));
        assert!(meets_expectation(ExpectedOutcome::Navigation, &route));
        assert!(!meets_expectation(
            ExpectedOutcome::Navigation,
            &Signals::default()
        ));
    }

    #[test]
    fn test_feedback_requires_feedback_signal() {
        let dom_only = Signals {
            meaningful_dom_change: true,
            ..Signals::default()
        };
        assert!(!meets_expectation(ExpectedOutcome::Feedback, &dom_only));
        let feedback = Signals {
            feedback_seen: true,
            ..Signals::default()
        };
        assert!(meets_expectation(ExpectedOutcome::Feedback, &feedback));
    }

    #[test]
    fn test_network_satisfied_by_either_network_signal() {
        let raw = Signals {
            network_activity: true,
            ..Signals::default()
        };
        let correlated = Signals {
            correlated_network_activity: true,
            ..Signals::default()
        };
        assert!(meets_expectation(ExpectedOutcome::Network, &raw));
        assert!(meets_expectation(ExpectedOutcome::Network, &correlated));
    }

    #[test]
    fn test_ui_change_union() {
        for signals in [
            Signals {
                navigation_changed: true,
                ..Signals::default()
            },
            Signals {
                meaningful_dom_change: true,
                ..Signals::default()
            },
            Signals {
                feedback_seen: true,
                ..Signals::default()
            },
            Signals {
                correlated_network_activity: true,
                ..Signals::default()
            },
        ] {
            assert!(meets_expectation(ExpectedOutcome::UiChange, &signals));
        }
        // Raw network activity alone does not prove a UI change.
        let raw_network = Signals {
            network_activity: true,
            ..Signals::default()
        };
        assert!(!meets_expectation(ExpectedOutcome::UiChange, &raw_network));
    }

    #[test]
    fn test_silence_precedence_user_navigation_first() {
        let inputs = SilenceInputs {
            user_navigation: true,
            statuses: vec![401],
            requests_without_response: 3,
            ..SilenceInputs::default()
        };
        assert_eq!(classify_silence(&inputs), SilenceKind::UserNavigation);
    }

    #[test]
    fn test_silence_auth_beats_timeout() {
        let inputs = SilenceInputs {
            statuses: vec![403],
            requests_without_response: 2,
            ..SilenceInputs::default()
        };
        assert_eq!(classify_silence(&inputs), SilenceKind::BlockedByAuth);
    }

    #[test]
    fn test_silence_auth_from_console() {
        let inputs = SilenceInputs {
            console: vec!["Error: login required to continue".to_string()],
            ..SilenceInputs::default()
        };
        assert_eq!(classify_silence(&inputs), SilenceKind::BlockedByAuth);
    }

    #[test]
    fn test_silence_network_timeout() {
        let inputs = SilenceInputs {
            requests_without_response: 1,
            ..SilenceInputs::default()
        };
        assert_eq!(classify_silence(&inputs), SilenceKind::NetworkTimeout);
    }

    #[test]
    fn test_silence_render_failure_vs_server_side_only() {
        let render = SilenceInputs {
            statuses: vec![200],
            console: vec!["hydration mismatch".to_string()],
            ..SilenceInputs::default()
        };
        assert_eq!(classify_silence(&render), SilenceKind::UiRenderFailure);

        let server_only = SilenceInputs {
            statuses: vec![204],
            ..SilenceInputs::default()
        };
        assert_eq!(classify_silence(&server_only), SilenceKind::ServerSideOnly);
    }

    #[test]
    fn test_silence_slow_acknowledgment_then_true_silence() {
        let slow = SilenceInputs {
            signals_after_deadline: true,
            ..SilenceInputs::default()
        };
        assert_eq!(classify_silence(&slow), SilenceKind::SlowAcknowledgment);
        assert_eq!(
            classify_silence(&SilenceInputs::default()),
            SilenceKind::TrueSilence
        );
    }

    #[test]
    fn test_silence_kind_wire_strings() {
        assert_eq!(SilenceKind::TrueSilence.as_str(), "TRUE_SILENCE");
        assert_eq!(
            serde_json::to_string(&SilenceKind::BlockedByAuth).unwrap_or_default(),
            "\"BLOCKED_BY_AUTH\""
        );
    }
}
