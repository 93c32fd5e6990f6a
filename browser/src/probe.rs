//! Deterministic page-state probes.
//!
//! A [`PageProbe`] summarizes the page at one instant: URL plus a DOM
//! snapshot digest. Bundles compare two probes to decide what actually
//! changed; raw page text never leaves the browser crate, only digests and
//! bounded marker strings do.

use serde::{Deserialize, Serialize};
use verax_common::ids::sha256_hex;

use crate::error::{BrowserError, Result};
use crate::session::Session;

/// Bounded summary of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomSnapshot {
    /// SHA-256 of the page's visible text.
    pub text_digest: String,
    /// Visible text length, for cheap magnitude comparison.
    pub text_len: u64,
    pub node_count: u64,
    pub title: String,
    /// Text of alert/status/toast/aria-live regions, bounded per entry.
    pub feedback_markers: Vec<String>,
    pub interactive_count: u64,
    /// `:invalid` form controls currently present.
    pub invalid_field_count: u64,
}

/// Page URL + DOM snapshot at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageProbe {
    pub url: String,
    pub dom: DomSnapshot,
}

#[derive(Debug, Deserialize)]
struct RawSnapshot {
    title: String,
    node_count: u64,
    text: String,
    feedback_markers: Vec<String>,
    interactive_count: u64,
    invalid_field_count: u64,
}

const SNAPSHOT_SCRIPT: &str = r#"
(() => {
  const body = document.body;
  const text = body && body.innerText ? body.innerText : '';
  const markers = [];
  const markerSelector = [
    '[role="alert"]',
    '[role="status"]',
    '[aria-live]',
    '.alert',
    '.toast',
    '.error',
    '.success',
    '.notification',
    'output'
  ].join(', ');
  for (const el of document.querySelectorAll(markerSelector)) {
    const t = (el.textContent || '').trim();
    if (t) markers.push(t.slice(0, 160));
  }
  return JSON.stringify({
    title: document.title || '',
    node_count: document.getElementsByTagName('*').length,
    text: text,
    feedback_markers: markers,
    interactive_count: document.querySelectorAll(
      'a[href], button, input, select, textarea, [role="button"], [role="link"]'
    ).length,
    invalid_field_count: document.querySelectorAll(':invalid').length
  });
})()
"#;

/// Capture the current page state.
pub async fn capture(session: &Session) -> Result<PageProbe> {
    let url = session.current_url().await?;
    let payload = session.eval_json(SNAPSHOT_SCRIPT).await?;
    let raw: RawSnapshot =
        serde_json::from_value(payload).map_err(|e| BrowserError::Evaluation {
            detail: format!("malformed snapshot payload: {e}"),
        })?;

    // Normalize whitespace before digesting so layout-only reflows don't
    // read as content changes.
    let normalized: String = raw.text.split_whitespace().collect::<Vec<_>>().join(" ");

    Ok(PageProbe {
        url,
        dom: DomSnapshot {
            text_digest: sha256_hex(normalized.as_bytes()),
            text_len: normalized.len() as u64,
            node_count: raw.node_count,
            title: raw.title,
            feedback_markers: raw.feedback_markers,
            interactive_count: raw.interactive_count,
            invalid_field_count: raw.invalid_field_count,
        },
    })
}
