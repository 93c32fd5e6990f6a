//! Redacted network and console event capture.
//!
//! The interceptor and the console listener are the only writers of these
//! logs; the planner reads them between captures. Events are appended in
//! wire order and stamped with a monotonic `relative_ms` from the shared
//! time provider, so correlation windows never consult the wall clock.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use verax_common::redact::{redact_body, redact_headers, redact_url, RedactionCounters};
use verax_common::TimeProvider;

/// One observed (non-blocked) network request/response pair.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkEvent {
    pub request_id: String,
    pub method: String,
    /// Redacted at capture time.
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub resource_type: String,
    pub relative_ms: u64,
    pub failed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_text: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

/// One blocked write attempt (read-only firewall).
#[derive(Debug, Clone, Serialize)]
pub struct BlockedWrite {
    pub method: String,
    /// Redacted at capture time.
    pub url: String,
    pub reason: String,
    pub at_ms: u64,
}

/// Console output captured from the page, redacted at capture time.
#[derive(Debug, Clone, Serialize)]
pub struct ConsoleEvent {
    pub level: String,
    pub text: String,
    pub relative_ms: u64,
}

/// Shared event sink for one session.
///
/// Cloning shares the underlying logs; the session's listeners write, the
/// planner reads.
#[derive(Debug, Clone)]
pub struct EventSink {
    time: TimeProvider,
    network: Arc<Mutex<Vec<NetworkEvent>>>,
    blocked: Arc<Mutex<Vec<BlockedWrite>>>,
    console: Arc<Mutex<Vec<ConsoleEvent>>>,
    counters: Arc<Mutex<RedactionCounters>>,
}

impl EventSink {
    pub fn new(time: TimeProvider) -> Self {
        Self {
            time,
            network: Arc::new(Mutex::new(Vec::new())),
            blocked: Arc::new(Mutex::new(Vec::new())),
            console: Arc::new(Mutex::new(Vec::new())),
            counters: Arc::new(Mutex::new(RedactionCounters::default())),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.time.now_ms()
    }

    /// Record a passed-through request. Headers, URL, and body are redacted
    /// before the event enters the log.
    pub fn record_request(
        &self,
        request_id: String,
        method: String,
        url: &str,
        resource_type: String,
        headers: BTreeMap<String, String>,
        body: Option<serde_json::Value>,
    ) {
        let mut headers = headers;
        {
            let mut counters = lock(&self.counters);
            redact_headers(&mut headers, &mut counters);
        }
        let event = NetworkEvent {
            request_id,
            method,
            url: redact_url(url),
            status: None,
            resource_type,
            relative_ms: self.time.now_ms(),
            failed: false,
            failure_text: None,
            headers,
            body: body.as_ref().map(redact_body),
        };
        lock(&self.network).push(event);
    }

    /// Attach a response status to the matching request, in wire order.
    pub fn record_response(&self, request_id: &str, status: u16) {
        let mut log = lock(&self.network);
        if let Some(event) = log.iter_mut().rev().find(|e| e.request_id == request_id) {
            event.status = Some(status);
        }
    }

    /// Mark a request as failed (network-level, not HTTP-level).
    pub fn record_failure(&self, request_id: &str, error_text: String) {
        let mut log = lock(&self.network);
        if let Some(event) = log.iter_mut().rev().find(|e| e.request_id == request_id) {
            event.failed = true;
            event.failure_text = Some(error_text);
        }
    }

    /// Record a blocked mutating request.
    pub fn record_blocked(&self, method: String, url: &str, reason: String) {
        lock(&self.blocked).push(BlockedWrite {
            method,
            url: redact_url(url),
            reason,
            at_ms: self.time.now_ms(),
        });
    }

    /// Record a console message.
    pub fn record_console(&self, level: String, text: &str) {
        lock(&self.console).push(ConsoleEvent {
            level,
            text: redact_url(text),
            relative_ms: self.time.now_ms(),
        });
    }

    /// Network events at or after `since_ms`, in wire order.
    pub fn network_since(&self, since_ms: u64) -> Vec<NetworkEvent> {
        lock(&self.network)
            .iter()
            .filter(|e| e.relative_ms >= since_ms)
            .cloned()
            .collect()
    }

    /// All network events, in wire order.
    pub fn network_all(&self) -> Vec<NetworkEvent> {
        lock(&self.network).clone()
    }

    /// Console events at or after `since_ms`, in emission order.
    pub fn console_since(&self, since_ms: u64) -> Vec<ConsoleEvent> {
        lock(&self.console)
            .iter()
            .filter(|e| e.relative_ms >= since_ms)
            .cloned()
            .collect()
    }

    /// All blocked write attempts.
    pub fn blocked_writes(&self) -> Vec<BlockedWrite> {
        lock(&self.blocked).clone()
    }

    /// Redaction counters accumulated so far.
    pub fn redaction_counters(&self) -> RedactionCounters {
        *lock(&self.counters)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    // A poisoned event log means a listener panicked; the data is still the
    // best record of what happened, so keep serving it.
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
