//! Interaction planner.
//!
//! Runs one expectation through the linear state machine
//! `Budgeted → BeforeCapture → ActDispatch → WaitEffect → AfterCapture →
//! Classify → Recorded`. Every expectation yields exactly one attempt; any
//! error inside the machine is folded into the attempt rather than thrown.
//! The only error that escapes is a missing route sensor, which poisons the
//! whole run.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, warn};
use verax_browser::session::Session;
use verax_browser::{probe, sensor};
use verax_common::TimeProvider;

use crate::attempt::{ActionKind, Attempt, Cause};
use crate::dispatch::{self, ActionOutcome};
use crate::error::VeraxError;
use crate::evidence::EvidenceBundle;
use crate::expectation::Expectation;
use crate::outcome::{classify_silence, meets_expectation, SilenceInputs};
use crate::signals::Signals;

/// Planner timing and retry policy.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    pub global_budget_ms: u64,
    pub attempt_budget_ms: u64,
    pub max_wait_ms: u64,
    pub poll_interval_ms: u64,
    pub stability_window_ms: u64,
    pub early_exit_ms: u64,
    pub post_action_wait_ms: u64,
    pub max_retries_per_interaction: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            global_budget_ms: 300_000,
            attempt_budget_ms: 15_000,
            max_wait_ms: 10_000,
            poll_interval_ms: 250,
            stability_window_ms: 300,
            early_exit_ms: 500,
            post_action_wait_ms: 500,
            max_retries_per_interaction: 2,
        }
    }
}

impl PlannerConfig {
    /// Tightened waits for fast-outcome fixtures.
    pub fn fast_outcome() -> Self {
        Self {
            max_wait_ms: 1_000,
            poll_interval_ms: 25,
            stability_window_ms: 30,
            early_exit_ms: 50,
            post_action_wait_ms: 5,
            ..Self::default()
        }
    }
}

/// One state-machine step, for the debug trace.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StateTrace {
    pub state: &'static str,
    pub at_ms: u64,
}

/// The attempt plus its machine trace.
#[derive(Debug)]
pub struct AttemptRecord {
    pub attempt: Attempt,
    pub trace: Vec<StateTrace>,
}

/// Everything an attempt needs from the surrounding run.
pub struct AttemptContext<'a> {
    pub session: &'a Session,
    pub time: &'a TimeProvider,
    pub config: &'a PlannerConfig,
    pub run_started_ms: u64,
    pub evidence_dir: PathBuf,
}

/// Run the state machine for one expectation.
///
/// Returns `Err` only on a sensor failure, which marks the run INCOMPLETE.
pub async fn run_attempt(
    ctx: &AttemptContext<'_>,
    expectation: &Expectation,
) -> Result<AttemptRecord, VeraxError> {
    let mut trace = vec![StateTrace {
        state: "Budgeted",
        at_ms: ctx.time.now_ms(),
    }];

    // Global budget gate.
    if ctx.time.now_ms().saturating_sub(ctx.run_started_ms) >= ctx.config.global_budget_ms {
        let attempt = Attempt::skipped(
            &expectation.id,
            expectation.kind.as_str(),
            "global-timeout-exceeded",
            Cause::Timeout,
        );
        trace.push(StateTrace {
            state: "Recorded",
            at_ms: ctx.time.now_ms(),
        });
        return Ok(AttemptRecord { attempt, trace });
    }

    if !sensor::is_installed(ctx.session).await {
        return Err(VeraxError::SensorFailure {
            detail: "route sensor missing before attempt".to_string(),
        });
    }

    let mut tries = 0;
    loop {
        let budget = Duration::from_millis(ctx.config.attempt_budget_ms);
        let result = tokio::time::timeout(
            budget,
            execute_once(ctx, expectation, &mut trace),
        )
        .await;

        let (attempt, retryable) = match result {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => return Err(e),
            Err(_elapsed) => {
                // Settle timeout: terminal, never retried.
                let mut attempt = Attempt::skipped(
                    &expectation.id,
                    expectation.kind.as_str(),
                    "outcome-timeout",
                    Cause::Timeout,
                );
                attempt.attempted = true;
                attempt.action = ActionKind::Error;
                (attempt, false)
            }
        };

        if retryable && tries < ctx.config.max_retries_per_interaction {
            tries += 1;
            debug!(id = %expectation.id, tries, "retrying timed-out interaction");
            continue;
        }

        trace.push(StateTrace {
            state: "Recorded",
            at_ms: ctx.time.now_ms(),
        });
        return Ok(AttemptRecord { attempt, trace });
    }
}

/// One pass through BeforeCapture → Classify. The bool is "retryable".
async fn execute_once(
    ctx: &AttemptContext<'_>,
    expectation: &Expectation,
    trace: &mut Vec<StateTrace>,
) -> Result<(Attempt, bool), VeraxError> {
    let push = |trace: &mut Vec<StateTrace>, state: &'static str, time: &TimeProvider| {
        trace.push(StateTrace {
            state,
            at_ms: time.now_ms(),
        });
    };

    // BeforeCapture
    push(trace, "BeforeCapture", ctx.time);
    let mut bundle = EvidenceBundle::new(
        &expectation.id,
        ctx.evidence_dir.clone(),
        ctx.time.clone(),
    );
    bundle.set_promise_url(expectation.promise_url.clone());
    let before = match probe::capture(ctx.session).await {
        Ok(probe) => probe,
        Err(e) => {
            return Ok((
                error_attempt(expectation, format!("error:{e}"), Signals::default()),
                false,
            ));
        }
    };
    let url_before = before.url.clone();
    // Clear any transitions left over from a previous attempt.
    let _ = sensor::drain(ctx.session).await;
    bundle.capture_before(before);
    let watermark = bundle.watermark_ms();

    // ActDispatch
    push(trace, "ActDispatch", ctx.time);
    let blocked_before = ctx.session.events().blocked_writes().len();
    let outcome = dispatch::dispatch(ctx.session, expectation).await;

    // WaitEffect
    push(trace, "WaitEffect", ctx.time);
    let mut window_signals = Signals::default();
    let mut deadline_exited = false;
    if outcome.success {
        tokio::time::sleep(Duration::from_millis(ctx.config.post_action_wait_ms)).await;
        (window_signals, deadline_exited) =
            watch_for_effect(ctx, &mut bundle, watermark).await;
    }

    // AfterCapture
    push(trace, "AfterCapture", ctx.time);
    if let Ok(transitions) = sensor::drain(ctx.session).await {
        bundle.record_route_transitions(transitions);
    }
    let final_signals = match probe::capture(ctx.session).await {
        Ok(after) => {
            bundle.capture_after(after);
            bundle.correlate_network(ctx.session.events().network_since(watermark));
            bundle.record_console(ctx.session.events().console_since(watermark));
            bundle.analyze_changes()
        }
        Err(e) => {
            warn!(id = %expectation.id, error = %e, "after-capture failed");
            window_signals
        }
    };
    let url_after = bundle.after().map(|p| p.url.clone());

    // Classify
    push(trace, "Classify", ctx.time);
    let effective_signals = if window_signals.any() {
        window_signals
    } else if !deadline_exited {
        // The watcher exited quiet before the deadline; the final capture
        // is still inside the observation window.
        final_signals
    } else {
        window_signals
    };
    let expectation_met = outcome.success
        && meets_expectation(expectation.expected_outcome, &effective_signals);
    let (mut reason, mut cause) =
        classify_outcome(&outcome, expectation_met, effective_signals.any());

    // A mutation the firewall aborted is a blocked interaction, not app
    // silence.
    let blocked_during =
        ctx.session.events().blocked_writes().len() > blocked_before;
    if outcome.success && !expectation_met && blocked_during {
        reason = Some("write-blocked-read-only-mode".to_string());
        cause = Some(Cause::Blocked);
    }

    let silence = if outcome.success
        && !expectation_met
        && !blocked_during
        && !effective_signals.any()
    {
        let late_signals = deadline_exited && final_signals.any();
        let inputs = SilenceInputs {
            user_navigation: late_signals && final_signals.navigation_changed,
            statuses: bundle.network().iter().filter_map(|e| e.status).collect(),
            requests_without_response: bundle
                .network()
                .iter()
                .filter(|e| e.status.is_none() && !e.failed)
                .count(),
            console: bundle.console().iter().map(|c| c.text.clone()).collect(),
            dom_changed: final_signals.dom_changed,
            signals_after_deadline: late_signals,
        };
        Some(classify_silence(&inputs))
    } else {
        None
    };

    // Evidence is written even for failed attempts; silence claims need
    // proof as much as findings do.
    let (evidence_ref, evidence_files) = match bundle.finalize() {
        Ok(pair) => (Some(pair.0), pair.1),
        Err(e) => {
            warn!(id = %expectation.id, error = %e, "evidence finalize failed");
            (None, Vec::new())
        }
    };

    let retryable = !outcome.success
        && outcome
            .cause_hint
            .as_deref()
            .is_some_and(|hint| hint.contains("timeout"));

    let attempt = Attempt {
        id: expectation.id.clone(),
        kind: expectation.kind.as_str().to_string(),
        attempted: true,
        observed: expectation_met,
        action: outcome.action,
        reason,
        cause,
        signals: effective_signals,
        evidence_ref,
        evidence_files,
        silence,
        url_before: Some(url_before),
        url_after,
    };
    Ok((attempt, retryable))
}

/// Bounded adaptive watcher: poll until acknowledgment stabilizes, the
/// page goes quiet, or the window closes. Returns the last in-window
/// signals and whether the deadline forced the exit.
async fn watch_for_effect(
    ctx: &AttemptContext<'_>,
    bundle: &mut EvidenceBundle,
    watermark: u64,
) -> (Signals, bool) {
    let deadline = watermark.saturating_add(ctx.config.max_wait_ms);
    let mut signals = Signals::default();
    let mut acknowledged_at: Option<u64> = None;

    loop {
        tokio::time::sleep(Duration::from_millis(ctx.config.poll_interval_ms)).await;
        let now = ctx.time.now_ms();

        if let Ok(transitions) = sensor::drain(ctx.session).await {
            bundle.record_route_transitions(transitions);
        }
        if let Ok(interim) = probe::capture(ctx.session).await {
            bundle.capture_after(interim);
        }
        bundle.correlate_network(ctx.session.events().network_since(watermark));
        signals = bundle.analyze_changes();

        if signals.acknowledged() {
            let since = *acknowledged_at.get_or_insert(now);
            if now.saturating_sub(since) >= ctx.config.stability_window_ms {
                return (signals, false);
            }
        } else {
            let last_network = bundle
                .network()
                .iter()
                .map(|e| e.relative_ms)
                .max()
                .unwrap_or(watermark);
            let quiet_for = now.saturating_sub(last_network.max(watermark));
            if quiet_for >= ctx.config.early_exit_ms && !signals.any() {
                return (signals, false);
            }
        }

        if now >= deadline {
            return (signals, true);
        }
    }
}

fn error_attempt(expectation: &Expectation, reason: String, signals: Signals) -> Attempt {
    Attempt {
        id: expectation.id.clone(),
        kind: expectation.kind.as_str().to_string(),
        attempted: true,
        observed: false,
        action: ActionKind::Error,
        reason: Some(reason),
        cause: Some(Cause::Error),
        signals,
        evidence_ref: None,
        evidence_files: Vec::new(),
        silence: None,
        url_before: None,
        url_after: None,
    }
}

/// Deterministic classification of `(action, expectation_met, signals)`
/// into `(reason, cause)`.
pub fn classify_outcome(
    outcome: &ActionOutcome,
    expectation_met: bool,
    any_signals: bool,
) -> (Option<String>, Option<Cause>) {
    if let Some(message) = &outcome.error {
        return (Some(format!("error:{message}")), Some(Cause::Error));
    }
    if outcome.success {
        if expectation_met {
            return (None, None);
        }
        return if any_signals {
            (Some("outcome-not-met".to_string()), Some(Cause::NoChange))
        } else {
            (Some("no-change".to_string()), Some(Cause::NoChange))
        };
    }
    let hint = outcome.cause_hint.as_deref().unwrap_or_default();
    if hint.contains("not-found") {
        (Some("selector-not-found".to_string()), Some(Cause::NotFound))
    } else if hint.contains("interactable") || hint.contains("blocked") {
        (
            Some("element-not-interactable".to_string()),
            Some(Cause::Blocked),
        )
    } else if hint.contains("prevented") {
        (
            Some("form-submit-prevented".to_string()),
            Some(Cause::PreventedSubmit),
        )
    } else if hint.contains("timeout") {
        (Some("outcome-timeout".to_string()), Some(Cause::Timeout))
    } else {
        (
            Some("error:unclassified-action-failure".to_string()),
            Some(Cause::Error),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn outcome(success: bool, hint: Option<&str>, error: Option<&str>) -> ActionOutcome {
        ActionOutcome {
            success,
            action: ActionKind::Click,
            cause_hint: hint.map(str::to_string),
            error: error.map(str::to_string),
        }
    }

    #[test]
    fn test_observed_has_no_reason() {
        let (reason, cause) = classify_outcome(&outcome(true, None, None), true, true);
        assert_eq!(reason, None);
        assert_eq!(cause, None);
    }

    #[test]
    fn test_unmet_with_signals_is_outcome_not_met() {
        let (reason, cause) = classify_outcome(&outcome(true, None, None), false, true);
        assert_eq!(reason.as_deref(), Some("outcome-not-met"));
        assert_eq!(cause, Some(Cause::NoChange));
    }

    #[test]
    fn test_unmet_without_signals_is_no_change() {
        let (reason, cause) = classify_outcome(&outcome(true, None, None), false, false);
        assert_eq!(reason.as_deref(), Some("no-change"));
        assert_eq!(cause, Some(Cause::NoChange));
    }

    #[test]
    fn test_failure_hints_map_to_reason_codes() {
        let cases = [
            ("selector not-found", "selector-not-found", Cause::NotFound),
            (
                "not-interactable blocked",
                "element-not-interactable",
                Cause::Blocked,
            ),
            ("prevented", "form-submit-prevented", Cause::PreventedSubmit),
            ("timeout", "outcome-timeout", Cause::Timeout),
        ];
        for (hint, expected_reason, expected_cause) in cases {
            let (reason, cause) = classify_outcome(&outcome(false, Some(hint), None), false, false);
            assert_eq!(reason.as_deref(), Some(expected_reason), "hint={hint}");
            assert_eq!(cause, Some(expected_cause));
        }
    }

    #[test]
    fn test_error_wins_over_everything() {
        let (reason, cause) =
            classify_outcome(&outcome(false, Some("timeout"), Some("boom")), true, true);
        assert_eq!(reason.as_deref(), Some("error:boom"));
        assert_eq!(cause, Some(Cause::Error));
    }

    #[test]
    fn test_config_defaults_match_contract() {
        let config = PlannerConfig::default();
        assert_eq!(config.max_wait_ms, 10_000);
        assert_eq!(config.poll_interval_ms, 250);
        assert_eq!(config.stability_window_ms, 300);
        assert_eq!(config.early_exit_ms, 500);
        assert_eq!(config.post_action_wait_ms, 500);
        assert_eq!(config.max_retries_per_interaction, 2);
        let fast = PlannerConfig::fast_outcome();
        assert_eq!(fast.post_action_wait_ms, 5);
    }
}
