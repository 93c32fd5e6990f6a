//! Per-interaction evidence bundles.
//!
//! A bundle is created before the action, mutated only during that attempt,
//! and finalized at the end of the attempt. Finalization writes the
//! captured artifacts under the run's evidence directory and returns their
//! relative paths; those paths are the only thing that can later justify a
//! CONFIRMED finding.

use std::collections::BTreeSet;
use std::path::PathBuf;

use tracing::debug;
use verax_browser::events::{ConsoleEvent, NetworkEvent};
use verax_browser::probe::PageProbe;
use verax_browser::sensor::{route_signature_changed, RouteTransition};
use verax_common::atomic::write_json_atomic;
use verax_common::TimeProvider;

use crate::signals::Signals;

/// Node-count drift below this is structural noise, not a meaningful
/// change.
const MEANINGFUL_NODE_DELTA: u64 = 3;

/// Evidence for one attempt.
#[derive(Debug)]
pub struct EvidenceBundle {
    expectation_id: String,
    evidence_dir: PathBuf,
    time: TimeProvider,
    /// Monotonic instant of the action; events at or after it correlate.
    watermark_ms: u64,
    before: Option<PageProbe>,
    after: Option<PageProbe>,
    route_transitions: Vec<RouteTransition>,
    network: Vec<NetworkEvent>,
    console: Vec<ConsoleEvent>,
    /// Weak changes observed but excluded from failure classification.
    out_of_scope_feedback: Vec<String>,
    /// URL a network promise is expected to hit; when set, correlation
    /// requires a matching event, not just any app-initiated activity.
    promise_url: Option<String>,
}

impl EvidenceBundle {
    pub fn new(expectation_id: &str, evidence_dir: PathBuf, time: TimeProvider) -> Self {
        Self {
            expectation_id: expectation_id.to_string(),
            evidence_dir,
            time,
            watermark_ms: 0,
            before: None,
            after: None,
            route_transitions: Vec::new(),
            network: Vec::new(),
            console: Vec::new(),
            out_of_scope_feedback: Vec::new(),
            promise_url: None,
        }
    }

    /// Narrow network correlation to events matching a promised URL.
    pub fn set_promise_url(&mut self, promise_url: Option<String>) {
        self.promise_url = promise_url;
    }

    /// Record the pre-action page state and start the correlation window.
    pub fn capture_before(&mut self, probe: PageProbe) {
        self.watermark_ms = self.time.now_ms();
        self.before = Some(probe);
    }

    /// Record the post-action page state.
    pub fn capture_after(&mut self, probe: PageProbe) {
        self.after = Some(probe);
    }

    pub fn record_route_transitions(&mut self, transitions: Vec<RouteTransition>) {
        self.route_transitions.extend(transitions);
    }

    /// Adopt the network events that fall inside this attempt's window.
    pub fn correlate_network(&mut self, events: Vec<NetworkEvent>) {
        self.network = events;
    }

    pub fn record_console(&mut self, events: Vec<ConsoleEvent>) {
        self.console = events;
    }

    pub fn watermark_ms(&self) -> u64 {
        self.watermark_ms
    }

    pub fn before(&self) -> Option<&PageProbe> {
        self.before.as_ref()
    }

    pub fn after(&self) -> Option<&PageProbe> {
        self.after.as_ref()
    }

    pub fn network(&self) -> &[NetworkEvent] {
        &self.network
    }

    pub fn console(&self) -> &[ConsoleEvent] {
        &self.console
    }

    pub fn route_transitions(&self) -> &[RouteTransition] {
        &self.route_transitions
    }

    pub fn out_of_scope_feedback(&self) -> &[String] {
        &self.out_of_scope_feedback
    }

    /// Derive the closed signal set from the captured evidence.
    pub fn analyze_changes(&mut self) -> Signals {
        let (Some(before), Some(after)) = (&self.before, &self.after) else {
            return Signals::default();
        };

        let navigation_changed = before.url != after.url;
        let route_changed = !self.route_transitions.is_empty()
            || route_signature_changed(&before.url, &after.url);

        let digest_changed = before.dom.text_digest != after.dom.text_digest;
        let node_delta = after.dom.node_count.abs_diff(before.dom.node_count);
        let dom_changed = digest_changed || node_delta > 0;
        let meaningful_dom_change = digest_changed
            || node_delta >= MEANINGFUL_NODE_DELTA
            || before.dom.title != after.dom.title;

        if dom_changed && !meaningful_dom_change {
            // analyze_changes runs once per watcher poll; record the weak
            // change once.
            let marker = "structural-only-dom-change".to_string();
            if !self.out_of_scope_feedback.contains(&marker) {
                self.out_of_scope_feedback.push(marker);
            }
        }

        let before_markers: BTreeSet<&String> = before.dom.feedback_markers.iter().collect();
        let new_marker = after
            .dom
            .feedback_markers
            .iter()
            .any(|m| !before_markers.contains(m));
        let validation_surfaced =
            after.dom.invalid_field_count > before.dom.invalid_field_count;
        let feedback_seen = new_marker || validation_surfaced;

        let network_activity = !self.network.is_empty();
        let correlated_network_activity = self.network.iter().any(|e| {
            let kind = e.resource_type.to_ascii_lowercase();
            let app_initiated = kind == "fetch" || kind == "xhr";
            match &self.promise_url {
                Some(promise) => app_initiated && url_matches_promise(&e.url, promise),
                None => app_initiated,
            }
        });

        Signals {
            navigation_changed,
            route_changed,
            meaningful_dom_change,
            meaningful_ui_change: meaningful_dom_change || feedback_seen,
            feedback_seen,
            correlated_network_activity,
            network_activity,
            dom_changed,
        }
    }

    /// Write the bundle's artifacts and return `(evidence_ref, files)`,
    /// both relative to the evidence directory.
    pub fn finalize(&self) -> std::io::Result<(String, Vec<String>)> {
        let rel_dir = self.expectation_id.clone();
        let dir = self.evidence_dir.join(&rel_dir);
        let mut files = Vec::new();

        let mut write = |name: &str, value: serde_json::Value| -> std::io::Result<()> {
            write_json_atomic(&dir.join(name), &value)?;
            files.push(format!("{rel_dir}/{name}"));
            Ok(())
        };

        if let Some(before) = &self.before {
            write("before.json", serde_json::to_value(before).unwrap_or_default())?;
        }
        if let Some(after) = &self.after {
            write("after.json", serde_json::to_value(after).unwrap_or_default())?;
        }
        if !self.network.is_empty() {
            write(
                "network.json",
                serde_json::to_value(&self.network).unwrap_or_default(),
            )?;
        }
        if !self.console.is_empty() {
            write(
                "console.json",
                serde_json::to_value(&self.console).unwrap_or_default(),
            )?;
        }
        if !self.route_transitions.is_empty() {
            write(
                "routes.json",
                serde_json::to_value(&self.route_transitions).unwrap_or_default(),
            )?;
        }

        debug!(
            expectation = %self.expectation_id,
            files = files.len(),
            "evidence finalized"
        );
        Ok((rel_dir, files))
    }
}

/// Whether an observed (redacted) event URL satisfies a promised URL.
///
/// The comparison is by path: an absolute promise contributes its path, a
/// relative one is stripped of query and fragment. Event URLs keep their
/// paths through redaction, so substring matching on the path is stable.
fn url_matches_promise(event_url: &str, promise: &str) -> bool {
    let needle = match url::Url::parse(promise) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => promise
            .split(['?', '#'])
            .next()
            .unwrap_or(promise)
            .to_string(),
    };
    if needle.is_empty() || needle == "/" {
        return true;
    }
    event_url.contains(&needle)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use pretty_assertions::assert_eq;
    use verax_browser::probe::DomSnapshot;
    use verax_common::ids::sha256_hex;

    fn probe(url: &str, text: &str, nodes: u64, markers: Vec<String>) -> PageProbe {
        PageProbe {
            url: url.to_string(),
            dom: DomSnapshot {
                text_digest: sha256_hex(text.as_bytes()),
                text_len: text.len() as u64,
                node_count: nodes,
                title: "T".to_string(),
                feedback_markers: markers,
                interactive_count: 1,
                invalid_field_count: 0,
            },
        }
    }

    fn bundle() -> EvidenceBundle {
        EvidenceBundle::new(
            "exp-test",
            PathBuf::from("/tmp/unused"),
            TimeProvider::fixed(0, "2024-01-01T00:00:00+00:00"),
        )
    }

    #[test]
    fn test_identical_probes_yield_silence() {
        let mut bundle = bundle();
        bundle.capture_before(probe("https://a.test/", "same", 10, vec![]));
        bundle.capture_after(probe("https://a.test/", "same", 10, vec![]));
        let signals = bundle.analyze_changes();
        assert!(!signals.any());
    }

    #[test]
    fn test_url_change_sets_navigation_and_route() {
        let mut bundle = bundle();
        bundle.capture_before(probe("https://a.test/home", "x", 10, vec![]));
        bundle.capture_after(probe("https://a.test/about", "x", 10, vec![]));
        let signals = bundle.analyze_changes();
        assert!(signals.navigation_changed);
        assert!(signals.route_changed);
    }

    #[test]
    fn test_small_node_drift_is_out_of_scope() {
        let mut bundle = bundle();
        bundle.capture_before(probe("https://a.test/", "same", 10, vec![]));
        bundle.capture_after(probe("https://a.test/", "same", 11, vec![]));
        let signals = bundle.analyze_changes();
        assert!(signals.dom_changed);
        assert!(!signals.meaningful_dom_change);
        assert_eq!(
            bundle.out_of_scope_feedback(),
            ["structural-only-dom-change"]
        );
    }

    #[test]
    fn test_new_feedback_marker_is_feedback_seen() {
        let mut bundle = bundle();
        bundle.capture_before(probe("https://a.test/", "same", 10, vec![]));
        bundle.capture_after(probe(
            "https://a.test/",
            "same",
            10,
            vec!["Saved successfully".to_string()],
        ));
        let signals = bundle.analyze_changes();
        assert!(signals.feedback_seen);
        assert!(signals.meaningful_ui_change);
    }

    #[test]
    fn test_correlated_requires_fetch_or_xhr() {
        let mut bundle = bundle();
        bundle.capture_before(probe("https://a.test/", "a", 10, vec![]));
        bundle.capture_after(probe("https://a.test/", "a", 10, vec![]));
        bundle.correlate_network(vec![NetworkEvent {
            request_id: "r1".to_string(),
            method: "GET".to_string(),
            url: "https://a.test/img.png".to_string(),
            status: Some(200),
            resource_type: "Image".to_string(),
            relative_ms: 5,
            failed: false,
            failure_text: None,
            headers: Default::default(),
            body: None,
        }]);
        let signals = bundle.analyze_changes();
        assert!(signals.network_activity);
        assert!(!signals.correlated_network_activity);
    }

    #[test]
    fn test_promise_url_narrows_correlation() {
        let fetch_event = |url: &str| NetworkEvent {
            request_id: "r1".to_string(),
            method: "GET".to_string(),
            url: url.to_string(),
            status: Some(200),
            resource_type: "Fetch".to_string(),
            relative_ms: 5,
            failed: false,
            failure_text: None,
            headers: Default::default(),
            body: None,
        };

        let mut bundle = bundle();
        bundle.set_promise_url(Some("/api/signup".to_string()));
        bundle.capture_before(probe("https://a.test/", "a", 10, vec![]));
        bundle.capture_after(probe("https://a.test/", "a", 10, vec![]));

        bundle.correlate_network(vec![fetch_event("https://a.test/api/other")]);
        assert!(!bundle.analyze_changes().correlated_network_activity);

        bundle.correlate_network(vec![fetch_event("https://a.test/api/signup")]);
        assert!(bundle.analyze_changes().correlated_network_activity);
    }

    #[test]
    fn test_promise_matching_handles_absolute_and_query_forms() {
        assert!(url_matches_promise(
            "https://a.test/api/save",
            "https://a.test/api/save"
        ));
        assert!(url_matches_promise(
            "https://a.test/api/save",
            "/api/save?draft=1"
        ));
        assert!(!url_matches_promise("https://a.test/api/other", "/api/save"));
    }

    #[test]
    fn test_finalize_writes_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let mut bundle = EvidenceBundle::new(
            "exp-files",
            dir.path().to_path_buf(),
            TimeProvider::fixed(0, "2024-01-01T00:00:00+00:00"),
        );
        bundle.capture_before(probe("https://a.test/", "a", 1, vec![]));
        bundle.capture_after(probe("https://a.test/", "b", 2, vec![]));
        let (evidence_ref, files) = bundle.finalize().unwrap();
        assert_eq!(evidence_ref, "exp-files");
        assert_eq!(files, ["exp-files/before.json", "exp-files/after.json"]);
        for file in &files {
            assert!(dir.path().join(file).is_file(), "{file} must exist");
        }
    }
}
