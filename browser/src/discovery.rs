//! Runtime navigation discovery.
//!
//! An injected collector walks the live DOM depth-first in document order,
//! descending into open shadow roots (marked with a `::shadow` path
//! segment) and same-origin iframes; cross-origin frames are skipped and
//! counted. The Rust side then runs a pure, deterministic pipeline:
//! normalize, filter, dedupe, sort, truncate, assign stable IDs. Two runs
//! against the same DOM produce byte-identical target lists.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;
use verax_common::ids::stable_hash16;

use crate::error::{BrowserError, Result};
use crate::session::Session;

/// Where a target was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum NavContext {
    Dom,
    ShadowDom { host_tag: String },
    Iframe { frame_url: String },
}

/// A concrete navigation target extracted from the live DOM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeTarget {
    pub id: String,
    pub tag_name: String,
    pub href: String,
    pub normalized_href: String,
    pub selector_path: String,
    pub role: String,
    pub text_content: String,
    pub context: NavContext,
}

/// Discovery tuning.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub allow_cross_origin: bool,
    pub max_targets: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            allow_cross_origin: false,
            max_targets: 25,
        }
    }
}

/// Result of a discovery pass.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOutcome {
    pub targets: Vec<RuntimeTarget>,
    pub cross_origin_frames_skipped: u64,
    pub rejected: u64,
    pub truncated: u64,
}

/// Raw candidate as emitted by the in-page collector.
#[derive(Debug, Clone, Deserialize)]
pub struct RawCandidate {
    pub tag_name: String,
    pub href: String,
    pub selector_path: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub text_content: String,
    pub source_kind: String,
    #[serde(default)]
    pub host_tag: Option<String>,
    #[serde(default)]
    pub frame_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CollectorPayload {
    candidates: Vec<RawCandidate>,
    #[serde(default)]
    cross_origin_frames: u64,
}

/// Schemes (and pseudo-hrefs) that are never navigation targets.
const REJECTED_SCHEMES: &[&str] = &["javascript:", "mailto:", "tel:", "sms:", "data:"];

const COLLECT_SCRIPT: &str = r#"
(() => {
  const out = { candidates: [], cross_origin_frames: 0 };
  const seg = (el) => {
    const tag = el.tagName.toLowerCase();
    if (el.id) return tag + '#' + el.id;
    let n = 1;
    let sib = el;
    while ((sib = sib.previousElementSibling)) {
      if (sib.tagName === el.tagName) n += 1;
    }
    return tag + ':nth-of-type(' + n + ')';
  };
  const visible = (el) => {
    const rect = el.getBoundingClientRect();
    return rect.width > 0 && rect.height > 0;
  };
  const hrefOf = (el) => {
    const raw = el.getAttribute('href');
    if (raw !== null && raw !== undefined) return raw;
    const child = el.querySelector('a[href]');
    return child ? child.getAttribute('href') : null;
  };
  const consider = (el, path, source, hostTag, frameUrl) => {
    const tag = el.tagName.toLowerCase();
    const role = el.getAttribute('role') || '';
    const isAnchor = tag === 'a' && el.getAttribute('href') !== null;
    const isRoleLink = role === 'link';
    if (!isAnchor && !isRoleLink) return;
    const raw = hrefOf(el);
    if (raw === null || raw === undefined) return;
    if (!visible(el)) return;
    out.candidates.push({
      tag_name: tag,
      href: raw,
      selector_path: path,
      role: role,
      text_content: (el.textContent || '').trim().slice(0, 120),
      source_kind: source,
      host_tag: hostTag,
      frame_url: frameUrl,
    });
  };
  const walkEl = (el, path, source, hostTag, frameUrl) => {
    consider(el, path, source, hostTag, frameUrl);
    if (el.shadowRoot) {
      walkChildren(
        el.shadowRoot,
        path + ' > ::shadow',
        source === 'iframe' ? 'iframe' : 'shadow-dom',
        el.tagName.toLowerCase(),
        frameUrl
      );
    }
    if (el.tagName === 'IFRAME') {
      try {
        const doc = el.contentDocument;
        if (doc && doc.documentElement) {
          walkChildren(
            doc.documentElement,
            path + ' > ::iframe',
            'iframe',
            hostTag,
            el.contentWindow.location.href
          );
        } else {
          out.cross_origin_frames += 1;
        }
      } catch (err) {
        out.cross_origin_frames += 1;
      }
    }
    walkChildren(el, path, source, hostTag, frameUrl);
  };
  const walkChildren = (root, prefix, source, hostTag, frameUrl) => {
    for (const el of root.children) {
      walkEl(el, prefix ? prefix + ' > ' + seg(el) : seg(el), source, hostTag, frameUrl);
    }
  };
  walkChildren(document.body || document.documentElement, '', 'dom', null, null);
  return JSON.stringify(out);
})()
"#;

/// Run discovery against the session's current page.
pub async fn discover(
    session: &Session,
    base_url: &str,
    config: &DiscoveryConfig,
) -> Result<DiscoveryOutcome> {
    let payload = session.eval_json(COLLECT_SCRIPT).await?;
    let collected: CollectorPayload =
        serde_json::from_value(payload).map_err(|e| BrowserError::Evaluation {
            detail: format!("malformed collector payload: {e}"),
        })?;
    let base = Url::parse(base_url).map_err(|e| BrowserError::Evaluation {
        detail: format!("invalid base url {base_url}: {e}"),
    })?;

    let mut outcome = normalize_candidates(collected.candidates, &base, config);
    outcome.cross_origin_frames_skipped = collected.cross_origin_frames;
    debug!(
        targets = outcome.targets.len(),
        rejected = outcome.rejected,
        skipped_frames = outcome.cross_origin_frames_skipped,
        "runtime discovery complete"
    );
    Ok(outcome)
}

/// Pure pipeline: normalize → filter → dedupe → sort → truncate → id.
///
/// Separated from the page so determinism is testable without a browser.
pub fn normalize_candidates(
    candidates: Vec<RawCandidate>,
    base: &Url,
    config: &DiscoveryConfig,
) -> DiscoveryOutcome {
    let mut outcome = DiscoveryOutcome::default();
    let mut seen = BTreeSet::new();
    let mut targets = Vec::new();

    for candidate in candidates {
        let Some(normalized) = normalize_href(&candidate.href, base) else {
            outcome.rejected += 1;
            continue;
        };
        if !config.allow_cross_origin && !same_origin(&normalized, base) {
            outcome.rejected += 1;
            continue;
        }
        let normalized_href = normalized.to_string();
        if !seen.insert(normalized_href.clone()) {
            continue;
        }
        let context = candidate_context(&candidate);
        let id = format!(
            "runtime-nav-{}",
            stable_hash16(&[
                &normalized_href,
                &candidate.tag_name,
                &candidate.selector_path,
                &candidate.role,
            ])
        );
        targets.push(RuntimeTarget {
            id,
            tag_name: candidate.tag_name,
            href: candidate.href,
            normalized_href,
            selector_path: candidate.selector_path,
            role: candidate.role,
            text_content: candidate.text_content,
            context,
        });
    }

    targets.sort_by(|a, b| {
        (a.normalized_href.as_str(), a.selector_path.as_str())
            .cmp(&(b.normalized_href.as_str(), b.selector_path.as_str()))
    });
    if targets.len() > config.max_targets {
        outcome.truncated = (targets.len() - config.max_targets) as u64;
        targets.truncate(config.max_targets);
    }
    outcome.targets = targets;
    outcome
}

/// Resolve a raw href to an absolute URL, rejecting non-navigable schemes
/// and hash-only references.
fn normalize_href(raw: &str, base: &Url) -> Option<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let lowered = trimmed.to_ascii_lowercase();
    if REJECTED_SCHEMES
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        return None;
    }
    base.join(trimmed).ok()
}

fn same_origin(candidate: &Url, base: &Url) -> bool {
    candidate.scheme() == base.scheme()
        && candidate.host_str() == base.host_str()
        && candidate.port_or_known_default() == base.port_or_known_default()
}

fn candidate_context(candidate: &RawCandidate) -> NavContext {
    match candidate.source_kind.as_str() {
        "iframe" => NavContext::Iframe {
            frame_url: candidate.frame_url.clone().unwrap_or_default(),
        },
        "shadow-dom" => NavContext::ShadowDom {
            host_tag: candidate.host_tag.clone().unwrap_or_default(),
        },
        _ => NavContext::Dom,
    }
}
