//! Observation orchestrator.
//!
//! Owns the whole run: readiness, session, auth, sensor, discovery, the
//! sequential execution loop, stats, and the run digest. The browser
//! session is torn down on every exit path; infra failures land in the
//! ledger instead of propagating as errors.

use std::collections::BTreeMap;

use tracing::{info, warn};
use verax_browser::discovery::{self, DiscoveryConfig};
use verax_browser::events::BlockedWrite;
use verax_browser::session::{Session, SessionConfig};
use verax_browser::{readiness, sensor};
use verax_common::TimeProvider;

use crate::attempt::Attempt;
use crate::auth;
use crate::config::RunConfig;
use crate::digest;
use crate::error::VeraxError;
use crate::expectation::Expectation;
use crate::learn;
use crate::ledger::{FailureCategory, FailureLedger, FailureSeverity, RunPhase};
use crate::planner::{self, AttemptContext, PlannerConfig, StateTrace};
use crate::writer::RunStats;
use crate::VERSION;

/// Everything observation produced.
#[derive(Debug, Default)]
pub struct ObservationOutcome {
    pub expectations: Vec<Expectation>,
    pub observations: Vec<Attempt>,
    pub stats: RunStats,
    pub skipped_reasons: BTreeMap<String, u64>,
    pub digest: String,
    pub blocked_writes: Vec<BlockedWrite>,
    /// Per-attempt state-machine traces, for the debug log.
    pub traces: Vec<(String, Vec<StateTrace>)>,
}

/// Run the observation protocol.
pub async fn run(
    config: &RunConfig,
    time: &TimeProvider,
    ledger: &mut FailureLedger,
) -> ObservationOutcome {
    if config.modes.force_incomplete {
        ledger.record(
            "forced_timeout",
            FailureCategory::Observe,
            FailureSeverity::Blocking,
            RunPhase::Observe,
            "orchestrator",
            "run forced INCOMPLETE by test flag",
            serde_json::json!({}),
            false,
        );
        return finish(config, Vec::new(), Vec::new(), Vec::new(), Vec::new());
    }

    if config.modes.test_mode {
        // Deterministic stub: no browser, no observations.
        info!("test mode: returning stub observation");
        return finish(config, Vec::new(), Vec::new(), Vec::new(), Vec::new());
    }

    // Readiness gate: never launch unless ready.
    let ready = match readiness::ensure_ready(config.browser_path.as_deref(), config.bootstrap) {
        Ok(report) => report,
        Err(e) => {
            ledger.record(
                "runtime_not_ready",
                FailureCategory::Observe,
                FailureSeverity::Blocking,
                RunPhase::Observe,
                "readiness",
                &e.to_string(),
                serde_json::json!({}),
                false,
            );
            return finish(config, Vec::new(), Vec::new(), Vec::new(), Vec::new());
        }
    };
    let Some(executable) = ready.executable else {
        ledger.record(
            "runtime_not_ready",
            FailureCategory::Observe,
            FailureSeverity::Blocking,
            RunPhase::Observe,
            "readiness",
            "readiness reported ready without an executable",
            serde_json::json!({}),
            false,
        );
        return finish(config, Vec::new(), Vec::new(), Vec::new(), Vec::new());
    };

    let session_config = SessionConfig {
        executable,
        ..SessionConfig::default()
    };
    let mut session = match Session::launch(&session_config, time.clone()).await {
        Ok(session) => session,
        Err(e) => {
            ledger.record(
                "browser_launch_failed",
                FailureCategory::Observe,
                FailureSeverity::Blocking,
                RunPhase::Observe,
                "session",
                &e.to_string(),
                serde_json::json!({}),
                false,
            );
            return finish(config, Vec::new(), Vec::new(), Vec::new(), Vec::new());
        }
    };

    let outcome = drive(config, time, ledger, &session, &session_config).await;

    // Guaranteed teardown on every exit path.
    session.close().await;

    let blocked = session.events().blocked_writes();
    if config.modes.security_strict && !blocked.is_empty() {
        // Strict posture: aborted mutations are a policy signal worth a
        // ledger trail, not just a counter.
        ledger.record(
            "mutation_attempts_blocked",
            FailureCategory::Policy,
            FailureSeverity::Warning,
            RunPhase::Verify,
            "firewall",
            &format!(
                "{} mutating request(s) aborted in read-only mode",
                blocked.len()
            ),
            serde_json::json!({ "count": blocked.len() }),
            true,
        );
    }
    match outcome {
        Ok((expectations, observations, traces)) => {
            finish(config, expectations, observations, blocked, traces)
        }
        Err(e) => {
            record_run_error(ledger, &e);
            finish(config, Vec::new(), Vec::new(), blocked, Vec::new())
        }
    }
}

type DriveOutput = (
    Vec<Expectation>,
    Vec<Attempt>,
    Vec<(String, Vec<StateTrace>)>,
);

/// The fallible middle of the run; the caller owns teardown.
async fn drive(
    config: &RunConfig,
    time: &TimeProvider,
    ledger: &mut FailureLedger,
    session: &Session,
    session_config: &SessionConfig,
) -> Result<DriveOutput, VeraxError> {
    let auth_config = config.effective_auth();
    auth::apply(session, &auth_config, &config.url).await?;

    session.navigate(&config.url, session_config).await?;
    auth::verify(session, &auth_config).await?;
    sensor::install(session)
        .await
        .map_err(|e| VeraxError::SensorFailure {
            detail: e.to_string(),
        })?;

    // Static expectations: a missing source tree degrades the run rather
    // than aborting it.
    let static_expectations = match learn::extract(&config.src) {
        Ok(expectations) => expectations,
        Err(e) => {
            ledger.record(
                "learn_source_unreadable",
                FailureCategory::Observe,
                FailureSeverity::Degraded,
                RunPhase::Learn,
                "learn",
                &e.to_string(),
                serde_json::json!({ "src": config.src.display().to_string() }),
                true,
            );
            Vec::new()
        }
    };

    let discovery_config = DiscoveryConfig {
        allow_cross_origin: config.allow_cross_origin,
        max_targets: config.max_targets,
    };
    let discovered = discovery::discover(session, &config.url, &discovery_config).await?;
    info!(
        static_count = static_expectations.len(),
        runtime_count = discovered.targets.len(),
        "execution plan assembled"
    );

    let mut expectations = static_expectations;
    expectations.extend(
        discovered
            .targets
            .into_iter()
            .map(|target| Expectation::from_runtime_target(target, &config.url)),
    );

    let planner_config = if config.modes.fast_outcome {
        PlannerConfig::fast_outcome()
    } else {
        PlannerConfig {
            global_budget_ms: config.global_budget_ms,
            attempt_budget_ms: config.attempt_budget_ms,
            ..PlannerConfig::default()
        }
    };
    let ctx = AttemptContext {
        session,
        time,
        config: &planner_config,
        run_started_ms: time.now_ms(),
        evidence_dir: config.evidence_dir(),
    };

    let mut observations = Vec::with_capacity(expectations.len());
    let mut traces = Vec::new();
    for expectation in &expectations {
        // Runtime-nav attempts always start from the base page; any other
        // attempt re-anchors only if a previous one navigated away.
        let needs_reset = expectation.is_runtime_nav()
            || session.current_url().await.map(|u| u != config.url).unwrap_or(true);
        if needs_reset {
            if let Err(e) = session.navigate(&config.url, session_config).await {
                warn!(error = %e, "reset to base failed");
            }
            sensor::install(session)
                .await
                .map_err(|e| VeraxError::SensorFailure {
                    detail: e.to_string(),
                })?;
        }

        let record = planner::run_attempt(&ctx, expectation).await?;
        traces.push((expectation.id.clone(), record.trace));
        observations.push(record.attempt);
    }

    Ok((expectations, observations, traces))
}

fn record_run_error(ledger: &mut FailureLedger, error: &VeraxError) {
    let (code, message) = match error {
        VeraxError::SensorFailure { .. } => ("sensor_failure", "error:sensor-failure".to_string()),
        VeraxError::AuthIneffective => ("auth_ineffective", error.to_string()),
        VeraxError::Browser(e) => (e.reason_token(), e.to_string()),
        other => ("observation_failed", other.to_string()),
    };
    ledger.record(
        code,
        FailureCategory::Observe,
        FailureSeverity::Blocking,
        RunPhase::Observe,
        "orchestrator",
        &message,
        serde_json::json!({}),
        false,
    );
}

/// Assemble stats + digest; the single place observation results converge.
fn finish(
    config: &RunConfig,
    expectations: Vec<Expectation>,
    observations: Vec<Attempt>,
    blocked_writes: Vec<BlockedWrite>,
    traces: Vec<(String, Vec<StateTrace>)>,
) -> ObservationOutcome {
    let total = observations.len().max(expectations.len()) as u64;
    let attempted = observations.iter().filter(|a| a.attempted).count() as u64;
    let observed = observations.iter().filter(|a| a.observed).count() as u64;
    let skipped = total.saturating_sub(attempted);

    let mut skipped_reasons: BTreeMap<String, u64> = BTreeMap::new();
    for attempt in observations.iter().filter(|a| !a.attempted) {
        let reason = attempt.reason.clone().unwrap_or_else(|| "unknown".to_string());
        *skipped_reasons.entry(reason).or_default() += 1;
    }

    let plan_ids: Vec<String> = expectations.iter().map(|e| e.id.clone()).collect();
    let digest = digest::compute(
        &plan_ids,
        &observations,
        &config.url,
        &config.framework_tag,
        VERSION,
    );

    let stats = RunStats {
        total_expectations: total,
        attempted,
        observed,
        not_observed: attempted.saturating_sub(observed),
        skipped,
        blocked_writes: blocked_writes.len() as u64,
        coverage_ratio: if total == 0 {
            0.0
        } else {
            observed as f64 / total as f64
        },
    };

    ObservationOutcome {
        expectations,
        observations,
        stats,
        skipped_reasons,
        digest,
        blocked_writes,
        traces,
    }
}
