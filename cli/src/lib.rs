//! CLI surface for the VERAX verifier.
//!
//! Flag parsing, the single RESULT/REASON/ACTION block, and exit-code
//! propagation live here. Ambient process state (environment flags) is
//! translated exactly once into the core's `RunConfig`; nothing deeper
//! reads the environment.

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing::debug;
use verax_common::ids::stable_hash16;
use verax_common::TimeProvider;
use verax_core::config::{AuthConfig, AuthMode, RunConfig, TestModes};
use verax_core::ledger::FailureLedger;
use verax_core::writer::{self, ExitCode, RunArtifacts};
use verax_core::{auth, findings, orchestrator};

/// Evidence-first web-app verifier.
#[derive(Debug, Parser)]
#[command(name = "verax", version, about = "Evidence-first web-app verifier")]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Observe a running application and report verified findings.
    Run(RunArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Base URL of the running application.
    #[arg(long)]
    url: String,

    /// Application source directory (static learn pass).
    #[arg(long)]
    src: PathBuf,

    /// Artifact directory (defaults to `.verax` in the working directory).
    #[arg(long)]
    out: Option<PathBuf>,

    /// Write the state-machine debug log under EVIDENCE/logs/.
    #[arg(long)]
    debug: bool,

    /// Storage-state file (cookies + origins JSON).
    #[arg(long, conflicts_with = "auth_cookie")]
    auth_storage: Option<PathBuf>,

    /// Cookie JSON (literal or a file path).
    #[arg(long)]
    auth_cookie: Option<String>,

    /// Extra header "Name: Value" (repeatable).
    #[arg(long)]
    auth_header: Vec<String>,

    /// Auth effectiveness posture.
    #[arg(long, default_value = "auto")]
    auth_mode: String,

    /// Emit the RESULT/REASON/ACTION block as JSON.
    #[arg(long)]
    json: bool,
}

/// The single RESULT/REASON/ACTION block every invocation emits.
#[derive(Debug)]
struct OutputBlock {
    result: String,
    reason: String,
    action: String,
    exit: ExitCode,
}

impl OutputBlock {
    fn emit(&self, json: bool) {
        if json {
            let value = serde_json::json!({
                "result": self.result,
                "reason": self.reason,
                "action": self.action,
                "exitCode": self.exit.code(),
            });
            println!("{value}");
        } else {
            println!("RESULT: {}", self.result);
            println!("REASON: {}", self.reason);
            println!("ACTION: {}", self.action);
        }
    }
}

/// Entry point used by `main`. Returns the process exit code.
pub async fn run_main() -> i32 {
    init_tracing();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            use clap::error::ErrorKind;
            if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
                let _ = e.print();
                return 0;
            }
            // Usage errors never create artifacts.
            let block = OutputBlock {
                result: "USAGE_ERROR".to_string(),
                reason: first_line(&e.to_string()),
                action: "run `verax run --help` for the supported flags".to_string(),
                exit: ExitCode::UsageError,
            };
            block.emit(false);
            return block.exit.code();
        }
    };

    match cli.command {
        Command::Run(args) => {
            let json = args.json;
            let block = execute_run(args).await;
            block.emit(json);
            block.exit.code()
        }
    }
}

async fn execute_run(args: RunArgs) -> OutputBlock {
    // Flag-level validation before anything touches disk.
    let Some(auth_mode) = AuthMode::parse(&args.auth_mode) else {
        return usage_block(format!(
            "--auth-mode must be strict|auto|off, got '{}'",
            args.auth_mode
        ));
    };
    let mut headers = BTreeMap::new();
    for raw in &args.auth_header {
        match auth::parse_header(raw) {
            Ok((name, value)) => {
                headers.insert(name, value);
            }
            Err(e) => return usage_block(e.to_string()),
        }
    }

    let modes = test_modes_from_env();
    let config = RunConfig {
        url: args.url.clone(),
        src: args.src.clone(),
        out_dir: args.out.clone().unwrap_or_else(|| PathBuf::from(".verax")),
        debug: args.debug,
        auth: AuthConfig {
            mode: auth_mode,
            storage_file: args.auth_storage.clone(),
            cookie: args.auth_cookie.clone(),
            headers,
        },
        modes,
        browser_path: std::env::var_os("VERAX_BROWSER_PATH").map(PathBuf::from),
        ..RunConfig::default()
    };

    let time = if config.modes.deterministic_output {
        TimeProvider::fixed(0, "1970-01-01T00:00:00+00:00")
    } else {
        TimeProvider::new()
    };

    let run_id = format!(
        "run-{}",
        stable_hash16(&[
            &config.url,
            &config.src.display().to_string(),
            verax_core::VERSION,
        ])
    );
    let mut ledger = FailureLedger::new(&run_id, time.clone());

    let outcome = orchestrator::run(&config, &time, &mut ledger).await;
    let detected = findings::detect(&outcome.expectations, &outcome.observations);
    debug!(
        observations = outcome.observations.len(),
        findings = detected.len(),
        digest = %outcome.digest,
        "observation complete"
    );

    let debug_payload = config.debug.then(|| {
        serde_json::json!({
            "digest": outcome.digest,
            "skippedReasons": outcome.skipped_reasons,
            "traces": outcome
                .traces
                .iter()
                .map(|(id, trace)| {
                    serde_json::json!({ "id": id, "states": trace })
                })
                .collect::<Vec<_>>(),
        })
    });

    let artifacts = RunArtifacts {
        url: config.url.clone(),
        src: config.src.display().to_string(),
        detected_at_iso: time.iso_now(),
        findings: detected,
        coverage_gaps: coverage_gaps(&outcome),
        stats: outcome.stats.clone(),
        version: verax_core::VERSION.to_string(),
        debug_payload,
    };

    let enforced = match writer::write_artifacts(&config.out_dir, artifacts, &mut ledger) {
        Ok(findings) => findings,
        Err(e) => {
            return OutputBlock {
                result: "INCOMPLETE".to_string(),
                reason: format!("artifact write failed: {e}"),
                action: format!("check permissions on {}", config.out_dir.display()),
                exit: ExitCode::Incomplete,
            };
        }
    };

    let exit = writer::decide_exit(false, &ledger, enforced.len());
    let out_dir = config.out_dir.display().to_string();
    let (result, reason, action) = match exit {
        ExitCode::InvariantViolation => (
            "INVARIANT_VIOLATION".to_string(),
            "a core contract was violated during the run".to_string(),
            format!("inspect {out_dir}/failure.ledger.json"),
        ),
        ExitCode::Incomplete => {
            let reason = ledger
                .entries()
                .iter()
                .find(|e| !e.is_recoverable)
                .or_else(|| ledger.entries().first())
                .map(|e| e.message.clone())
                .unwrap_or_else(|| "observation could not complete".to_string());
            (
                "INCOMPLETE".to_string(),
                reason,
                format!("fix the environment and re-run; details in {out_dir}/failure.ledger.json"),
            )
        }
        ExitCode::Findings => (
            "FINDINGS".to_string(),
            format!("{} finding(s) backed by captured evidence", enforced.len()),
            format!("review {out_dir}/SUMMARY.md and {out_dir}/REPORT.json"),
        ),
        _ => (
            "SUCCESS".to_string(),
            format!(
                "{} expectation(s) observed, no findings",
                outcome.stats.observed
            ),
            format!("artifacts in {out_dir}/"),
        ),
    };

    OutputBlock {
        result,
        reason,
        action,
        exit,
    }
}

/// Coverage gaps: attempts that never reached their outcome for reasons
/// other than the app staying silent.
fn coverage_gaps(outcome: &orchestrator::ObservationOutcome) -> Vec<serde_json::Value> {
    outcome
        .observations
        .iter()
        .filter(|a| !a.attempted || matches!(a.cause, Some(c) if c != verax_core::attempt::Cause::NoChange))
        .map(|a| {
            serde_json::json!({
                "id": a.id,
                "kind": a.kind,
                "reason": a.reason,
                "cause": a.cause,
            })
        })
        .collect()
}

fn usage_block(reason: String) -> OutputBlock {
    OutputBlock {
        result: "USAGE_ERROR".to_string(),
        reason,
        action: "run `verax run --help` for the supported flags".to_string(),
        exit: ExitCode::UsageError,
    }
}

/// Translate the environment into the enumerated test modes, once.
fn test_modes_from_env() -> TestModes {
    let flag = |name: &str| std::env::var(name).map(|v| v == "1").unwrap_or(false);
    TestModes {
        test_mode: flag("VERAX_TEST_MODE"),
        fast_outcome: flag("VERAX_TEST_FAST_OUTCOME"),
        force_incomplete: flag("VERAX_TEST_FORCE_TIMEOUT"),
        deterministic_output: flag("VERAX_DETERMINISTIC_OUTPUT"),
        security_strict: flag("VERAX_SECURITY_STRICT"),
    }
}

fn first_line(text: &str) -> String {
    text.lines()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("invalid usage")
        .trim()
        .to_string()
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_first_line_trims_usage_noise() {
        let text = "error: the following required arguments were not provided:\n  --url <URL>";
        assert_eq!(
            first_line(text),
            "error: the following required arguments were not provided:"
        );
    }

    #[test]
    fn test_cli_parses_run_flags() {
        let cli = Cli::try_parse_from([
            "verax",
            "run",
            "--url",
            "http://127.0.0.1:3000",
            "--src",
            "./app",
            "--auth-header",
            "X-Token: t",
            "--json",
        ])
        .expect("valid invocation");
        let Command::Run(args) = cli.command;
        assert_eq!(args.url, "http://127.0.0.1:3000");
        assert!(args.json);
        assert_eq!(args.auth_header.len(), 1);
    }

    #[test]
    fn test_auth_storage_conflicts_with_cookie() {
        let result = Cli::try_parse_from([
            "verax",
            "run",
            "--url",
            "http://x.test",
            "--src",
            ".",
            "--auth-storage",
            "state.json",
            "--auth-cookie",
            "{}",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_url_is_usage_error() {
        let result = Cli::try_parse_from(["verax", "run", "--src", "."]);
        assert!(result.is_err());
    }
}
