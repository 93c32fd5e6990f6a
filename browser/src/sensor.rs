//! In-page route sensor.
//!
//! A hook installed after initial load that records every URL change:
//! history push/replace, popstate, and hashchange. The planner drains the
//! transition buffer once per attempt. Injection failure is fatal for the
//! run — a partially sensed run would misclassify SPA navigation as
//! silence.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{BrowserError, Result};
use crate::session::Session;

/// One recorded URL transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RouteTransition {
    pub from_url: String,
    pub to_url: String,
    pub at_step: u64,
}

/// Path + search + hash of a URL; the parts that constitute a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSignature {
    pub path: String,
    pub search: String,
    pub hash: String,
}

const INSTALL_SCRIPT: &str = r#"
(() => {
  if (window.__veraxRoutes) {
    return JSON.stringify({ installed: true });
  }
  window.__veraxRoutes = [];
  let step = 0;
  let last = location.href;
  const record = (from) => {
    const to = location.href;
    if (from !== to) {
      window.__veraxRoutes.push({ from_url: from, to_url: to, at_step: step });
      step += 1;
    }
    last = to;
  };
  const wrap = (name) => {
    const original = history[name].bind(history);
    history[name] = function (state, title, url) {
      const from = location.href;
      const result = original(state, title, url);
      record(from);
      return result;
    };
  };
  wrap('pushState');
  wrap('replaceState');
  const onExternal = () => { record(last); };
  window.addEventListener('popstate', onExternal);
  window.addEventListener('hashchange', onExternal);
  return JSON.stringify({ installed: true });
})()
"#;

const DRAIN_SCRIPT: &str = r#"
(() => {
  const routes = window.__veraxRoutes || [];
  window.__veraxRoutes = [];
  return JSON.stringify(routes);
})()
"#;

const PROBE_SCRIPT: &str = "JSON.stringify(Boolean(window.__veraxRoutes))";

/// Install the sensor. Must run after initial load, before the first
/// attempt.
pub async fn install(session: &Session) -> Result<()> {
    let value = session
        .eval_json(INSTALL_SCRIPT)
        .await
        .map_err(|e| BrowserError::SensorFailure {
            detail: format!("injection failed: {e}"),
        })?;
    if value.get("installed").and_then(serde_json::Value::as_bool) != Some(true) {
        return Err(BrowserError::SensorFailure {
            detail: "install script returned no confirmation".to_string(),
        });
    }
    Ok(())
}

/// Read and clear the transition buffer.
pub async fn drain(session: &Session) -> Result<Vec<RouteTransition>> {
    let value = session
        .eval_json(DRAIN_SCRIPT)
        .await
        .map_err(|e| BrowserError::SensorFailure {
            detail: format!("drain failed: {e}"),
        })?;
    serde_json::from_value(value).map_err(|e| BrowserError::SensorFailure {
        detail: format!("malformed transition buffer: {e}"),
    })
}

/// Whether the sensor is present on the current document.
pub async fn is_installed(session: &Session) -> bool {
    matches!(
        session.eval_json(PROBE_SCRIPT).await,
        Ok(serde_json::Value::Bool(true))
    )
}

/// Route signature of a URL: path + search + hash.
///
/// Unparseable URLs degrade to a whole-string signature so comparison still
/// works on relative fragments.
pub fn route_signature(input: &str) -> RouteSignature {
    match Url::parse(input) {
        Ok(url) => RouteSignature {
            path: url.path().to_string(),
            search: url.query().unwrap_or_default().to_string(),
            hash: url.fragment().unwrap_or_default().to_string(),
        },
        Err(_) => RouteSignature {
            path: input.to_string(),
            search: String::new(),
            hash: String::new(),
        },
    }
}

/// True iff any route component (path, search, hash) changed.
pub fn route_signature_changed(before: &str, after: &str) -> bool {
    route_signature(before) != route_signature(after)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_signature_splits_components() {
        let sig = route_signature("https://app.test/items?page=2#top");
        assert_eq!(sig.path, "/items");
        assert_eq!(sig.search, "page=2");
        assert_eq!(sig.hash, "top");
    }

    #[test]
    fn test_hash_only_change_is_a_route_change() {
        assert!(route_signature_changed(
            "https://app.test/page#a",
            "https://app.test/page#section"
        ));
    }

    #[test]
    fn test_host_change_alone_is_not_a_route_change() {
        // Route signatures deliberately exclude origin; a host swap with an
        // identical route is the navigation detector's concern, not ours.
        assert!(!route_signature_changed(
            "https://a.test/page",
            "https://b.test/page"
        ));
    }

    #[test]
    fn test_identical_urls_unchanged() {
        assert!(!route_signature_changed(
            "https://app.test/x?q=1#h",
            "https://app.test/x?q=1#h"
        ));
    }

    #[test]
    fn test_transition_roundtrip() {
        let json = r#"[{"from_url":"a","to_url":"b","at_step":0}]"#;
        let parsed: Vec<RouteTransition> =
            serde_json::from_str(json).expect("valid transitions");
        assert_eq!(
            parsed,
            vec![RouteTransition {
                from_url: "a".to_string(),
                to_url: "b".to_string(),
                at_step: 0
            }]
        );
    }
}
