//! Read-only network firewall.
//!
//! Every outbound request is paused at the request stage. Mutating verbs
//! are aborted and recorded on the blocked list; everything else is
//! recorded (redacted) and continued. No POST/PUT/PATCH/DELETE ever leaves
//! the process while the firewall is installed.

use chromiumoxide::cdp::browser_protocol::fetch;
use chromiumoxide::cdp::browser_protocol::network::ErrorReason;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Result;
use crate::events::EventSink;
use crate::util::{headers_map, wire_string};

/// Abort reason recorded for every blocked mutating request.
pub const BLOCK_REASON: &str = "write-blocked-read-only-mode";

/// HTTP methods that mutate state and are therefore aborted.
const MUTATING_METHODS: &[&str] = &["POST", "PUT", "PATCH", "DELETE"];

/// Whether a method is blocked in read-only mode.
pub fn is_mutating(method: &str) -> bool {
    MUTATING_METHODS.contains(&method.to_ascii_uppercase().as_str())
}

/// Enable fetch interception on `page` and spawn the enforcement loop.
pub async fn install(page: &Page, events: EventSink) -> Result<JoinHandle<()>> {
    let mut paused = page.event_listener::<fetch::EventRequestPaused>().await?;

    page.execute(fetch::EnableParams {
        patterns: Some(vec![fetch::RequestPattern {
            url_pattern: Some("*".to_string()),
            resource_type: None,
            request_stage: Some(fetch::RequestStage::Request),
        }]),
        handle_auth_requests: None,
    })
    .await?;

    let page = page.clone();
    let task = tokio::spawn(async move {
        while let Some(event) = paused.next().await {
            let request_id = wire_string(&event.request_id);
            let method = event.request.method.to_ascii_uppercase();
            let url = event.request.url.clone();

            if is_mutating(&method) {
                events.record_blocked(method.clone(), &url, BLOCK_REASON.to_string());
                debug!(method, "blocked mutating request");
                let fail = fetch::FailRequestParams::new(
                    event.request_id.clone(),
                    ErrorReason::Aborted,
                );
                if let Err(e) = page.execute(fail).await {
                    warn!(error = %e, "failed to abort blocked request");
                }
                continue;
            }

            let body = event
                .request
                .post_data
                .as_ref()
                .and_then(|data| serde_json::from_str(data).ok());
            events.record_request(
                request_id,
                method,
                &url,
                wire_string(&event.resource_type),
                headers_map(&event.request.headers),
                body,
            );

            let proceed = fetch::ContinueRequestParams::new(event.request_id.clone());
            if let Err(e) = page.execute(proceed).await {
                // The page may have navigated away mid-flight; the request
                // is already dead.
                debug!(error = %e, "continue after pause failed");
            }
        }
    });

    Ok(task)
}
