//! Process-wide time surface.
//!
//! All timing in the observation pipeline flows through a [`TimeProvider`]:
//! a monotonic millisecond clock anchored at provider creation plus an
//! ISO-8601 wall-clock formatter. Classification logic never reads the
//! clock directly, which keeps outcome decisions reproducible under the
//! fixed provider used in tests.

use std::time::Instant;

#[derive(Debug, Clone)]
enum Source {
    Monotonic { start: Instant },
    Fixed { now_ms: u64, iso: String },
}

/// Monotonic clock + ISO-8601 formatter behind one handle.
#[derive(Debug, Clone)]
pub struct TimeProvider {
    source: Source,
}

impl TimeProvider {
    /// A real provider anchored at the current instant.
    pub fn new() -> Self {
        Self {
            source: Source::Monotonic {
                start: Instant::now(),
            },
        }
    }

    /// A provider that returns constants, for deterministic tests.
    pub fn fixed(now_ms: u64, iso: impl Into<String>) -> Self {
        Self {
            source: Source::Fixed {
                now_ms,
                iso: iso.into(),
            },
        }
    }

    /// Milliseconds elapsed since the provider was created.
    ///
    /// Monotonic: two successive calls never go backwards.
    pub fn now_ms(&self) -> u64 {
        match &self.source {
            Source::Monotonic { start } => start.elapsed().as_millis() as u64,
            Source::Fixed { now_ms, .. } => *now_ms,
        }
    }

    /// Current wall-clock time as an ISO-8601 UTC string.
    pub fn iso_now(&self) -> String {
        match &self.source {
            Source::Monotonic { .. } => chrono::Utc::now().to_rfc3339(),
            Source::Fixed { iso, .. } => iso.clone(),
        }
    }
}

impl Default for TimeProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_never_decreases() {
        let provider = TimeProvider::new();
        let a = provider.now_ms();
        let b = provider.now_ms();
        assert!(b >= a);
    }

    #[test]
    fn test_fixed_provider_returns_constants() {
        let provider = TimeProvider::fixed(1234, "2024-01-01T00:00:00+00:00");
        assert_eq!(provider.now_ms(), 1234);
        assert_eq!(provider.iso_now(), "2024-01-01T00:00:00+00:00");
        assert_eq!(provider.now_ms(), 1234);
    }
}
