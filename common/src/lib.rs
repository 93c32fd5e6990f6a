//! Shared utilities for the VERAX verifier.
//!
//! Everything in this crate is deterministic by construction: the time
//! provider is the only component allowed to touch the clock, the canonical
//! JSON encoder sorts keys at every depth, and stable IDs are pure hashes of
//! their inputs.

pub mod atomic;
pub mod canonical;
pub mod ids;
pub mod redact;
pub mod time;

pub use redact::{RedactionCounters, REDACTED_PLACEHOLDER};
pub use time::TimeProvider;

/// Crate version, surfaced as `veraxVersion` in META.json.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
