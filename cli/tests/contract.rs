//! CLI contract tests.
//!
//! Exit codes are restricted to the closed set {0, 20, 30, 50, 64}; every
//! invocation emits exactly one RESULT/REASON/ACTION block; usage errors
//! never create artifacts. These run against the stub observation path so
//! no browser is required.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::Path;

use anyhow::Result;
use predicates::prelude::*;
use tempfile::TempDir;

/// A `verax` command with an isolated working directory and scrubbed
/// test-mode environment.
fn verax(cwd: &Path) -> Result<assert_cmd::Command> {
    let mut cmd = assert_cmd::Command::cargo_bin("verax")?;
    cmd.current_dir(cwd);
    for var in [
        "VERAX_TEST_MODE",
        "VERAX_TEST_FORCE_TIMEOUT",
        "VERAX_TEST_FAST_OUTCOME",
        "VERAX_DETERMINISTIC_OUTPUT",
        "VERAX_SECURITY_STRICT",
        "VERAX_BROWSER_PATH",
    ] {
        cmd.env_remove(var);
    }
    Ok(cmd)
}

fn count_blocks(stdout: &str) -> usize {
    stdout.matches("RESULT:").count()
}

#[test]
fn test_missing_url_exits_64_without_artifacts() -> Result<()> {
    let dir = TempDir::new()?;
    let output = verax(dir.path())?.arg("run").output()?;

    assert_eq!(output.status.code(), Some(64));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(count_blocks(&stdout), 1, "exactly one block: {stdout}");
    assert!(stdout.contains("REASON:"));
    assert!(stdout.contains("ACTION:"));
    assert!(!dir.path().join(".verax").exists(), "no artifacts on usage error");
    Ok(())
}

#[test]
fn test_unknown_flag_exits_64() -> Result<()> {
    let dir = TempDir::new()?;
    verax(dir.path())?
        .args(["run", "--url", "http://x.test", "--src", ".", "--frobnicate"])
        .assert()
        .code(64)
        .stdout(predicate::str::contains("RESULT: USAGE_ERROR"));
    Ok(())
}

#[test]
fn test_exclusive_auth_flags_exit_64() -> Result<()> {
    let dir = TempDir::new()?;
    let output = verax(dir.path())?
        .args([
            "run",
            "--url",
            "http://x.test",
            "--src",
            ".",
            "--auth-storage",
            "state.json",
            "--auth-cookie",
            "{}",
        ])
        .output()?;
    assert_eq!(output.status.code(), Some(64));
    assert!(!dir.path().join(".verax").exists());
    Ok(())
}

#[test]
fn test_invalid_auth_mode_exits_64() -> Result<()> {
    let dir = TempDir::new()?;
    verax(dir.path())?
        .args([
            "run",
            "--url",
            "http://x.test",
            "--src",
            ".",
            "--auth-mode",
            "lenient",
        ])
        .assert()
        .code(64)
        .stdout(predicate::str::contains("auth-mode"));
    assert!(!dir.path().join(".verax").exists());
    Ok(())
}

#[test]
fn test_malformed_auth_header_exits_64() -> Result<()> {
    let dir = TempDir::new()?;
    verax(dir.path())?
        .args([
            "run",
            "--url",
            "http://x.test",
            "--src",
            ".",
            "--auth-header",
            "no-colon-here",
        ])
        .assert()
        .code(64);
    Ok(())
}

#[test]
fn test_stub_run_writes_flat_layout_and_exits_0() -> Result<()> {
    let dir = TempDir::new()?;
    std::fs::create_dir(dir.path().join("app"))?;

    let output = verax(dir.path())?
        .env("VERAX_TEST_MODE", "1")
        .args(["run", "--url", "http://127.0.0.1:3000", "--src", "app"])
        .output()?;

    assert_eq!(output.status.code(), Some(0), "{output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(count_blocks(&stdout), 1);
    assert!(stdout.contains("RESULT: SUCCESS"));

    let out_dir = dir.path().join(".verax");
    for name in ["REPORT.json", "META.json", "SUMMARY.md", "failure.ledger.json"] {
        assert!(out_dir.join(name).is_file(), "{name} missing");
    }
    assert!(out_dir.join("EVIDENCE").is_dir());

    let meta: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out_dir.join("META.json"))?)?;
    assert_eq!(meta["status"], "SUCCESS");
    assert_eq!(meta["url"], "http://127.0.0.1:3000");
    Ok(())
}

#[test]
fn test_forced_timeout_exits_30_with_blocking_ledger_entry() -> Result<()> {
    let dir = TempDir::new()?;
    std::fs::create_dir(dir.path().join("app"))?;

    let output = verax(dir.path())?
        .env("VERAX_TEST_MODE", "1")
        .env("VERAX_TEST_FORCE_TIMEOUT", "1")
        .args(["run", "--url", "http://127.0.0.1:3000", "--src", "app"])
        .output()?;

    assert_eq!(output.status.code(), Some(30));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("RESULT: INCOMPLETE"));

    let ledger: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(
        dir.path().join(".verax/failure.ledger.json"),
    )?)?;
    assert_eq!(ledger["summary"]["bySeverity"]["BLOCKING"], 1);
    assert_eq!(ledger["failures"][0]["category"], "OBSERVE");
    Ok(())
}

#[test]
fn test_json_block_carries_exit_code() -> Result<()> {
    let dir = TempDir::new()?;
    std::fs::create_dir(dir.path().join("app"))?;

    let output = verax(dir.path())?
        .env("VERAX_TEST_MODE", "1")
        .args([
            "run",
            "--url",
            "http://127.0.0.1:3000",
            "--src",
            "app",
            "--json",
        ])
        .output()?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let block: serde_json::Value = serde_json::from_str(stdout.trim())?;
    assert_eq!(block["result"], "SUCCESS");
    assert_eq!(block["exitCode"], 0);
    Ok(())
}

#[test]
fn test_deterministic_output_is_byte_stable() -> Result<()> {
    let dir = TempDir::new()?;
    std::fs::create_dir(dir.path().join("app"))?;

    let run = |dir: &Path| -> Result<String> {
        verax(dir)?
            .env("VERAX_TEST_MODE", "1")
            .env("VERAX_DETERMINISTIC_OUTPUT", "1")
            .args(["run", "--url", "http://127.0.0.1:3000", "--src", "app"])
            .output()?;
        Ok(std::fs::read_to_string(dir.join(".verax/REPORT.json"))?)
    };

    let first = run(dir.path())?;
    let second = run(dir.path())?;
    assert_eq!(first, second);
    assert!(first.ends_with('\n'));
    Ok(())
}

#[test]
fn test_report_purity_on_stub_run() -> Result<()> {
    let dir = TempDir::new()?;
    std::fs::create_dir(dir.path().join("app"))?;

    verax(dir.path())?
        .env("VERAX_TEST_MODE", "1")
        .args(["run", "--url", "http://127.0.0.1:3000", "--src", "app"])
        .assert()
        .code(0);

    let report = std::fs::read_to_string(dir.path().join(".verax/REPORT.json"))?;
    for forbidden in ["\"diagnostics\"", "\"enforcement\"", "\"internalErrors\"", "\"debug\""] {
        assert!(!report.contains(forbidden), "{forbidden} leaked into REPORT.json");
    }
    Ok(())
}
