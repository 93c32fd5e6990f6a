//! Run configuration.
//!
//! Plain data, no business logic. Ambient process state (env flags, CLI
//! flags) is translated exactly once at the CLI edge into these structs;
//! nothing below the CLI reads the environment.

use std::collections::BTreeMap;
use std::path::PathBuf;

/// How authentication effectiveness is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    /// Ineffective auth aborts the run with an infra failure.
    Strict,
    /// Ineffective auth degrades to a warning and the run continues.
    #[default]
    Auto,
    /// Auth material is ignored entirely.
    Off,
}

impl AuthMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Auto => "auto",
            Self::Off => "off",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "strict" => Some(Self::Strict),
            "auto" => Some(Self::Auto),
            "off" => Some(Self::Off),
            _ => None,
        }
    }
}

/// Auth material to apply before observation.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub mode: AuthMode,
    /// Storage-state file (cookies + origins JSON).
    pub storage_file: Option<PathBuf>,
    /// Literal cookie JSON or a path to a file containing it.
    pub cookie: Option<String>,
    /// Extra headers attached to every request.
    pub headers: BTreeMap<String, String>,
}

impl AuthConfig {
    /// Whether any auth material was provided.
    pub fn is_configured(&self) -> bool {
        self.storage_file.is_some() || self.cookie.is_some() || !self.headers.is_empty()
    }
}

/// Enumerated test modes, translated once from the environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct TestModes {
    /// Return a deterministic stub without launching a browser.
    pub test_mode: bool,
    /// Tighten waits for fast-outcome fixtures.
    pub fast_outcome: bool,
    /// Force an INCOMPLETE outcome (timeout drill).
    pub force_incomplete: bool,
    /// Lock the writer to deterministic output.
    pub deterministic_output: bool,
    /// Security-strict posture: `auto` auth escalates to `strict`, and
    /// firewall-blocked mutations are recorded as POLICY ledger entries.
    pub security_strict: bool,
}

/// Everything one run needs.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Base URL under observation.
    pub url: String,
    /// Source directory for the static learn pass.
    pub src: PathBuf,
    /// Artifact directory (the flat `.verax/` layout).
    pub out_dir: PathBuf,
    pub debug: bool,
    pub auth: AuthConfig,
    pub modes: TestModes,
    /// Explicit browser executable override.
    pub browser_path: Option<PathBuf>,
    /// Whether a missing browser may be bootstrapped.
    pub bootstrap: bool,
    pub allow_cross_origin: bool,
    pub max_targets: usize,
    /// Whole-run wall-time budget.
    pub global_budget_ms: u64,
    /// Per-attempt budget.
    pub attempt_budget_ms: u64,
    /// Framework tag folded into the run digest.
    pub framework_tag: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            src: PathBuf::from("."),
            out_dir: PathBuf::from(".verax"),
            debug: false,
            auth: AuthConfig::default(),
            modes: TestModes::default(),
            browser_path: None,
            bootstrap: false,
            allow_cross_origin: false,
            max_targets: 25,
            global_budget_ms: 300_000,
            attempt_budget_ms: 15_000,
            framework_tag: "generic".to_string(),
        }
    }
}

impl RunConfig {
    /// Evidence directory under the artifact root.
    pub fn evidence_dir(&self) -> PathBuf {
        self.out_dir.join("EVIDENCE")
    }

    /// Auth posture with the security-strict escalation applied: `auto`
    /// escalates to `strict`, an explicit `off` is respected.
    pub fn effective_auth(&self) -> AuthConfig {
        let mut auth = self.auth.clone();
        if self.modes.security_strict && auth.mode == AuthMode::Auto {
            auth.mode = AuthMode::Strict;
        }
        auth
    }
}
