//! Browser runtime readiness.
//!
//! Detection never launches a browser: it resolves an executable through an
//! explicit override, `PATH` lookup, then well-known install locations, and
//! verifies the file exists. `ensure_ready` optionally makes a single
//! bootstrap attempt when asked; it otherwise reports failure without side
//! effects.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{BrowserError, Result};

/// Why the runtime is not ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotReadyReason {
    NotInstalled,
    ImportFailed,
    ExecutableNotFound,
    CheckFailed,
}

impl NotReadyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotInstalled => "not_installed",
            Self::ImportFailed => "import_failed",
            Self::ExecutableNotFound => "executable_not_found",
            Self::CheckFailed => "check_failed",
        }
    }
}

/// Result of a readiness check.
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessReport {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<NotReadyReason>,
    /// Executable that will be launched, when ready.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executable: Option<PathBuf>,
}

/// Binary names probed on `PATH`, in preference order.
const KNOWN_BINARIES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
];

/// Install locations probed after `PATH`.
const KNOWN_LOCATIONS: &[&str] = &[
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/usr/bin/google-chrome",
    "/opt/google/chrome/chrome",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
];

/// Check whether a browser executable is available.
///
/// `override_path` wins when set (config flag or `VERAX_BROWSER_PATH`); a
/// dangling override is a `CheckFailed`, not a silent fallback.
pub fn check(override_path: Option<&Path>) -> ReadinessReport {
    if let Some(path) = override_path {
        if path.is_file() {
            return ready(path.to_path_buf());
        }
        warn!(path = %path.display(), "configured browser executable missing");
        return not_ready(NotReadyReason::ExecutableNotFound);
    }

    for name in KNOWN_BINARIES {
        if let Ok(path) = which::which(name) {
            debug!(binary = name, path = %path.display(), "browser found on PATH");
            return ready(path);
        }
    }

    for location in KNOWN_LOCATIONS {
        let path = Path::new(location);
        if path.is_file() {
            debug!(path = %path.display(), "browser found at known location");
            return ready(path.to_path_buf());
        }
    }

    not_ready(NotReadyReason::NotInstalled)
}

/// Ensure the runtime is ready, optionally bootstrapping it.
///
/// With `bootstrap` set and no executable found, one installer invocation is
/// attempted (`apt-get`-less environments fail fast). Without `bootstrap`
/// the failure is reported with no side effects.
pub fn ensure_ready(override_path: Option<&Path>, bootstrap: bool) -> Result<ReadinessReport> {
    let report = check(override_path);
    if report.ready {
        return Ok(report);
    }

    if !bootstrap {
        return Err(BrowserError::NotReady {
            reason: report
                .reason
                .map(|r| r.as_str().to_string())
                .unwrap_or_else(|| "check_failed".to_string()),
        });
    }

    // Single bootstrap attempt; never retried.
    let status = std::process::Command::new("npx")
        .args(["--yes", "playwright", "install", "chromium"])
        .status()
        .map_err(|e| BrowserError::BootstrapFailed {
            detail: format!("installer unavailable: {e}"),
        })?;
    if !status.success() {
        return Err(BrowserError::BootstrapFailed {
            detail: format!("installer exited with {status}"),
        });
    }

    let after = check(override_path);
    if after.ready {
        Ok(after)
    } else {
        Err(BrowserError::BootstrapFailed {
            detail: "installer completed but no executable was found".to_string(),
        })
    }
}

fn ready(executable: PathBuf) -> ReadinessReport {
    ReadinessReport {
        ready: true,
        reason: None,
        executable: Some(executable),
    }
}

fn not_ready(reason: NotReadyReason) -> ReadinessReport {
    ReadinessReport {
        ready: false,
        reason: Some(reason),
        executable: None,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;

    #[test]
    fn test_missing_override_is_executable_not_found() {
        let report = check(Some(Path::new("/definitely/not/a/browser")));
        assert!(!report.ready);
        assert_eq!(report.reason, Some(NotReadyReason::ExecutableNotFound));
    }

    #[test]
    fn test_existing_override_is_ready() {
        // Any plain file works; the check validates presence, not behavior.
        let file = tempfile::NamedTempFile::new().expect("temp file");
        let report = check(Some(file.path()));
        assert!(report.ready);
        assert_eq!(report.executable.as_deref(), Some(file.path()));
    }

    #[test]
    fn test_ensure_ready_without_bootstrap_has_no_side_effects() {
        let err = ensure_ready(Some(Path::new("/definitely/not/a/browser")), false);
        assert!(matches!(err, Err(BrowserError::NotReady { .. })));
    }

    #[test]
    fn test_reason_tokens_are_stable() {
        assert_eq!(NotReadyReason::NotInstalled.as_str(), "not_installed");
        assert_eq!(NotReadyReason::ImportFailed.as_str(), "import_failed");
        assert_eq!(
            NotReadyReason::ExecutableNotFound.as_str(),
            "executable_not_found"
        );
        assert_eq!(NotReadyReason::CheckFailed.as_str(), "check_failed");
    }
}
