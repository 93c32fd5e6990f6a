//! Core error taxonomy.
//!
//! Executors never throw across the planner boundary; these errors cover
//! the run-level failure modes the orchestrator and writer surface to the
//! CLI, which maps them to ledger entries and exit codes.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, VeraxError>;

/// Run-level errors.
#[derive(Debug, Error)]
pub enum VeraxError {
    /// The browser runtime was not ready; no launch was attempted.
    #[error("Runtime not ready: {reason}")]
    RuntimeNotReady { reason: String },

    /// Browser plumbing failed mid-run.
    #[error(transparent)]
    Browser(#[from] verax_browser::BrowserError),

    /// The in-page route sensor failed; observation cannot be trusted.
    #[error("error:sensor-failure: {detail}")]
    SensorFailure { detail: String },

    /// Strict auth mode and the applied credentials had no effect.
    #[error("auth_ineffective: authentication was applied but had no effect")]
    AuthIneffective,

    /// Invalid auth material (cookie JSON, header format, storage file).
    #[error("Invalid auth configuration: {detail}")]
    AuthInvalid { detail: String },

    /// Artifact I/O failure.
    #[error("Failed to write artifact {path}: {source}")]
    ArtifactWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failure reading run inputs (source directory, policy file).
    #[error("Failed to read {path}: {source}")]
    InputRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Malformed on-disk policy.
    #[error("Malformed policy file {path}: {detail}")]
    PolicyInvalid { path: PathBuf, detail: String },

    /// JSON encoding failure (internal).
    #[error("Serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}
