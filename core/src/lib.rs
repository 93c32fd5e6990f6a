//! Observation-and-detection core of the VERAX verifier.
//!
//! The orchestrator drives one browser session through a deterministic
//! execution plan; the planner runs each expectation through a strict
//! before/act/after protocol; the detector turns observations into typed
//! findings; and the writer applies the Evidence Law before anything
//! reaches disk. No CONFIRMED finding leaves this crate without pointers
//! to artifact files that exist on disk.

pub mod attempt;
pub mod auth;
pub mod confidence;
pub mod config;
pub mod digest;
pub mod dispatch;
pub mod enforcement;
pub mod error;
pub mod evidence;
pub mod expectation;
pub mod findings;
pub mod intent;
pub mod learn;
pub mod ledger;
pub mod orchestrator;
pub mod outcome;
pub mod planner;
pub mod signals;
pub mod writer;

pub use config::RunConfig;
pub use error::VeraxError;

/// Crate version, surfaced as `veraxVersion` in META.json.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
