//! Browser session lifecycle.
//!
//! A [`Session`] exclusively owns the browser process, the CDP handler
//! task, and the single page the observer drives. Teardown is idempotent
//! and never raises; a `Drop` backstop aborts the handler task so no CDP
//! plumbing outlives the session on any exit path.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network;
use chromiumoxide::cdp::js_protocol::runtime::{EventConsoleApiCalled, EventExceptionThrown};
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use verax_common::TimeProvider;

use crate::error::{BrowserError, Result};
use crate::events::EventSink;
use crate::firewall;
use crate::util::wire_string;

/// Launch-time settings for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Browser executable resolved by the readiness check.
    pub executable: PathBuf,
    /// Viewport size. Discovery requires visible bounding boxes, so the
    /// window must be large enough for above-the-fold content.
    pub window: (u32, u32),
    /// Bound on initial navigation (domcontentloaded).
    pub nav_timeout_ms: u64,
    /// Bound on the post-navigation network-quiet wait.
    pub idle_timeout_ms: u64,
    /// Window of network silence treated as "quiet".
    pub idle_quiet_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::new(),
            window: (1280, 800),
            nav_timeout_ms: 30_000,
            idle_timeout_ms: 10_000,
            idle_quiet_ms: 500,
        }
    }
}

/// A cookie to inject before first navigation.
#[derive(Debug, Clone)]
pub struct CookieSpec {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
}

/// Owns `(browser, handler, page)` with guaranteed release.
pub struct Session {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    listener_tasks: Vec<JoinHandle<()>>,
    events: EventSink,
    _profile_dir: tempfile::TempDir,
    closed: bool,
}

impl Session {
    /// Launch a browser and open the observer page.
    ///
    /// The read-only firewall and console capture are installed before any
    /// navigation, so nothing escapes observation.
    pub async fn launch(config: &SessionConfig, time: TimeProvider) -> Result<Self> {
        let profile_dir = tempfile::tempdir().map_err(|e| BrowserError::Io {
            path: std::env::temp_dir(),
            source: e,
        })?;

        let browser_config = BrowserConfig::builder()
            .chrome_executable(&config.executable)
            .no_sandbox()
            .window_size(config.window.0, config.window.1)
            .user_data_dir(profile_dir.path())
            .build()
            .map_err(|detail| BrowserError::Launch { detail })?;

        let (browser, mut handler) = Browser::launch(browser_config).await?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser.new_page("about:blank").await?;
        let events = EventSink::new(time);

        let mut listener_tasks = vec![firewall::install(&page, events.clone()).await?];
        listener_tasks.extend(install_network_listeners(&page, events.clone()).await?);
        listener_tasks.extend(install_console_listeners(&page, events.clone()).await?);

        debug!(executable = %config.executable.display(), "browser session ready");

        Ok(Self {
            browser,
            page,
            handler_task,
            listener_tasks,
            events,
            _profile_dir: profile_dir,
            closed: false,
        })
    }

    /// The single observer page.
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// The session's redacted event sink.
    pub fn events(&self) -> &EventSink {
        &self.events
    }

    /// Navigate to `url`, wait for DOM content, then wait for the network
    /// to go quiet within a bounded window.
    pub async fn navigate(&self, url: &str, config: &SessionConfig) -> Result<()> {
        let goto = tokio::time::timeout(
            Duration::from_millis(config.nav_timeout_ms),
            self.page.goto(url),
        )
        .await;
        match goto {
            Err(_) => {
                return Err(BrowserError::NavigationTimeout {
                    url: url.to_string(),
                    timeout_ms: config.nav_timeout_ms,
                });
            }
            Ok(result) => {
                result?;
            }
        }
        // Best-effort load wait; a slow-loading page is not fatal here.
        let _ = tokio::time::timeout(
            Duration::from_millis(config.nav_timeout_ms),
            self.page.wait_for_navigation(),
        )
        .await;

        self.wait_network_quiet(config.idle_quiet_ms, config.idle_timeout_ms)
            .await;
        Ok(())
    }

    /// Wait until no network event has arrived for `quiet_ms`, bounded by
    /// `timeout_ms`. Timeout is not an error: "still chatty" is a valid
    /// observation state.
    pub async fn wait_network_quiet(&self, quiet_ms: u64, timeout_ms: u64) {
        let deadline = self.events.now_ms().saturating_add(timeout_ms);
        loop {
            let now = self.events.now_ms();
            let last = self
                .events
                .network_all()
                .last()
                .map(|e| e.relative_ms)
                .unwrap_or(0);
            if now.saturating_sub(last) >= quiet_ms {
                return;
            }
            if now >= deadline {
                debug!(timeout_ms, "network never went quiet");
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Current page URL.
    pub async fn current_url(&self) -> Result<String> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    /// Evaluate a script that returns `JSON.stringify(...)` output, parsing
    /// the payload on the Rust side.
    pub async fn eval_json(&self, script: &str) -> Result<serde_json::Value> {
        let result = self.page.evaluate(script).await?;
        let text: String = result
            .into_value()
            .map_err(|e| BrowserError::Evaluation {
                detail: format!("non-string evaluation result: {e}"),
            })?;
        serde_json::from_str(&text).map_err(|e| BrowserError::Evaluation {
            detail: format!("malformed script payload: {e}"),
        })
    }

    /// Inject cookies before navigation (auth collaborator).
    pub async fn set_cookies(&self, cookies: &[CookieSpec]) -> Result<()> {
        let mut params = Vec::with_capacity(cookies.len());
        for cookie in cookies {
            let mut builder = network::CookieParam::builder()
                .name(cookie.name.clone())
                .value(cookie.value.clone());
            if let Some(domain) = &cookie.domain {
                builder = builder.domain(domain.clone());
            }
            if let Some(path) = &cookie.path {
                builder = builder.path(path.clone());
            }
            let param = builder.build().map_err(|detail| BrowserError::Launch {
                detail: format!("invalid cookie: {detail}"),
            })?;
            params.push(param);
        }
        self.page
            .execute(network::SetCookiesParams { cookies: params })
            .await?;
        Ok(())
    }

    /// Attach extra headers to every outgoing request (auth collaborator).
    pub async fn set_extra_headers(&self, headers: &BTreeMap<String, String>) -> Result<()> {
        let mut map = serde_json::Map::new();
        for (name, value) in headers {
            map.insert(name.clone(), serde_json::Value::String(value.clone()));
        }
        self.page
            .execute(network::SetExtraHttpHeadersParams {
                headers: network::Headers::new(serde_json::Value::Object(map)),
            })
            .await?;
        Ok(())
    }

    /// Tear down the session. Idempotent; never raises. Errors from an
    /// already-closed browser are swallowed.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        for task in self.listener_tasks.drain(..) {
            task.abort();
        }
        if let Err(e) = self.browser.close().await {
            warn!(error = %e, "browser close reported an error; continuing teardown");
        }
        if let Err(e) = self.browser.wait().await {
            debug!(error = %e, "browser wait after close failed");
        }
        self.handler_task.abort();
    }

    /// Whether teardown has run.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Backstop for exit paths that skipped async close: abort the CDP
        // plumbing so no task outlives the session.
        for task in &self.listener_tasks {
            task.abort();
        }
        self.handler_task.abort();
    }
}

async fn install_network_listeners(
    page: &Page,
    events: EventSink,
) -> Result<Vec<JoinHandle<()>>> {
    page.execute(network::EnableParams::default()).await?;

    let mut responses = page
        .event_listener::<network::EventResponseReceived>()
        .await?;
    let response_events = events.clone();
    let response_task = tokio::spawn(async move {
        while let Some(event) = responses.next().await {
            let request_id = wire_string(&event.request_id);
            response_events.record_response(&request_id, event.response.status as u16);
        }
    });

    let mut failures = page.event_listener::<network::EventLoadingFailed>().await?;
    let failure_events = events;
    let failure_task = tokio::spawn(async move {
        while let Some(event) = failures.next().await {
            let request_id = wire_string(&event.request_id);
            failure_events.record_failure(&request_id, event.error_text.clone());
        }
    });

    Ok(vec![response_task, failure_task])
}

async fn install_console_listeners(
    page: &Page,
    events: EventSink,
) -> Result<Vec<JoinHandle<()>>> {
    let mut console = page.event_listener::<EventConsoleApiCalled>().await?;
    let console_events = events.clone();
    let console_task = tokio::spawn(async move {
        while let Some(event) = console.next().await {
            let level = wire_string(&event.r#type);
            let text = event
                .args
                .iter()
                .map(|arg| match (&arg.value, &arg.description) {
                    (Some(value), _) => match value {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    },
                    (None, Some(description)) => description.clone(),
                    (None, None) => String::new(),
                })
                .collect::<Vec<_>>()
                .join(" ");
            console_events.record_console(level, &text);
        }
    });

    let mut exceptions = page.event_listener::<EventExceptionThrown>().await?;
    let exception_events = events;
    let exception_task = tokio::spawn(async move {
        while let Some(event) = exceptions.next().await {
            let details = &event.exception_details;
            let text = details
                .exception
                .as_ref()
                .and_then(|e| e.description.clone())
                .unwrap_or_else(|| details.text.clone());
            exception_events.record_console("error".to_string(), &text);
        }
    });

    Ok(vec![console_task, exception_task])
}
