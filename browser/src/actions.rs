//! Low-level page actions.
//!
//! Executors here return typed errors with classifier-friendly causes; the
//! observation core translates them into structured attempt outcomes.
//! Plain CSS selectors use native (trusted) input events; selector paths
//! that cross `::shadow` or `::iframe` boundaries are resolved in-page.

use serde_json::Value;
use tracing::debug;

use crate::error::{BrowserError, Result};
use crate::session::Session;

/// Outcome of a form submission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitResult {
    Submitted,
    /// The page handled the submit event and prevented the default.
    Prevented,
}

/// Click an element addressed by a plain CSS selector with a native event.
pub async fn click_selector(session: &Session, selector: &str) -> Result<()> {
    if !element_exists(session, selector).await? {
        return Err(BrowserError::SelectorNotFound {
            selector: selector.to_string(),
        });
    }
    let element = session.page().find_element(selector).await.map_err(|_| {
        BrowserError::SelectorNotFound {
            selector: selector.to_string(),
        }
    })?;
    element
        .click()
        .await
        .map_err(|e| classify_click_error(selector, &e))?;
    debug!(selector, "clicked");
    Ok(())
}

/// Click an element addressed by a discovery selector path, refinding it
/// through shadow roots and same-origin iframes.
pub async fn click_path(session: &Session, selector_path: &str) -> Result<()> {
    if !selector_path.contains("::shadow") && !selector_path.contains("::iframe") {
        return click_selector(session, selector_path).await;
    }

    let script = format!(
        r#"
(() => {{
  const path = {path};
  const segments = path.split(' > ');
  let scope = document;
  let el = null;
  for (const segment of segments) {{
    if (segment === '::shadow') {{
      if (!el || !el.shadowRoot) return JSON.stringify({{ status: 'not-found' }});
      scope = el.shadowRoot;
      continue;
    }}
    if (segment === '::iframe') {{
      if (!el || el.tagName !== 'IFRAME') return JSON.stringify({{ status: 'not-found' }});
      try {{
        scope = el.contentDocument;
      }} catch (err) {{
        return JSON.stringify({{ status: 'blocked' }});
      }}
      if (!scope) return JSON.stringify({{ status: 'blocked' }});
      continue;
    }}
    el = scope.querySelector(segment);
    if (!el) return JSON.stringify({{ status: 'not-found' }});
    scope = el;
  }}
  if (!el) return JSON.stringify({{ status: 'not-found' }});
  const rect = el.getBoundingClientRect();
  if (rect.width <= 0 || rect.height <= 0) return JSON.stringify({{ status: 'not-visible' }});
  el.click();
  return JSON.stringify({{ status: 'clicked' }});
}})()
"#,
        path = js_string(selector_path)
    );

    let value = session.eval_json(&script).await?;
    match value.get("status").and_then(Value::as_str) {
        Some("clicked") => Ok(()),
        Some("not-found") => Err(BrowserError::SelectorNotFound {
            selector: selector_path.to_string(),
        }),
        Some("not-visible") | Some("blocked") => Err(BrowserError::NotInteractable {
            selector: selector_path.to_string(),
        }),
        other => Err(BrowserError::Evaluation {
            detail: format!("unexpected click status {other:?}"),
        }),
    }
}

/// Fill every empty text-like control in a form with a deterministic
/// sample value. Returns the number of fields touched.
pub async fn fill_form(session: &Session, form_selector: &str) -> Result<u64> {
    let script = format!(
        r#"
(() => {{
  const form = document.querySelector({sel});
  if (!form) return JSON.stringify({{ status: 'not-found', filled: 0 }});
  let filled = 0;
  const sample = (input) => {{
    switch (input.type) {{
      case 'email': return 'probe@example.com';
      case 'number': return '1';
      case 'tel': return '+15550100';
      case 'url': return 'https://example.com';
      default: return 'verax-probe';
    }}
  }};
  for (const input of form.querySelectorAll('input, textarea')) {{
    const type = (input.type || '').toLowerCase();
    if (['hidden', 'submit', 'button', 'checkbox', 'radio', 'file'].includes(type)) continue;
    if (input.value) continue;
    const setter = Object.getOwnPropertyDescriptor(
      input.tagName === 'TEXTAREA'
        ? HTMLTextAreaElement.prototype
        : HTMLInputElement.prototype,
      'value'
    ).set;
    setter.call(input, sample(input));
    input.dispatchEvent(new Event('input', {{ bubbles: true }}));
    input.dispatchEvent(new Event('change', {{ bubbles: true }}));
    filled += 1;
  }}
  return JSON.stringify({{ status: 'filled', filled: filled }});
}})()
"#,
        sel = js_string(form_selector)
    );
    let value = session.eval_json(&script).await?;
    match value.get("status").and_then(Value::as_str) {
        Some("filled") => Ok(value.get("filled").and_then(Value::as_u64).unwrap_or(0)),
        _ => Err(BrowserError::SelectorNotFound {
            selector: form_selector.to_string(),
        }),
    }
}

/// Submit a form, reporting whether the page prevented the default.
pub async fn submit_form(session: &Session, form_selector: &str) -> Result<SubmitResult> {
    let script = format!(
        r#"
(() => {{
  const form = document.querySelector({sel});
  if (!form) return JSON.stringify({{ status: 'not-found' }});
  let prevented = false;
  const watcher = (event) => {{ prevented = event.defaultPrevented; }};
  form.addEventListener('submit', watcher);
  try {{
    if (form.requestSubmit) {{
      form.requestSubmit();
    }} else {{
      form.submit();
    }}
  }} finally {{
    form.removeEventListener('submit', watcher);
  }}
  return JSON.stringify({{ status: 'submitted', prevented: prevented }});
}})()
"#,
        sel = js_string(form_selector)
    );
    let value = session.eval_json(&script).await?;
    match value.get("status").and_then(Value::as_str) {
        Some("submitted") => {
            if value.get("prevented").and_then(Value::as_bool) == Some(true) {
                Ok(SubmitResult::Prevented)
            } else {
                Ok(SubmitResult::Submitted)
            }
        }
        Some("not-found") => Err(BrowserError::SelectorNotFound {
            selector: form_selector.to_string(),
        }),
        other => Err(BrowserError::Evaluation {
            detail: format!("unexpected submit status {other:?}"),
        }),
    }
}

/// Whether a plain CSS selector matches anything on the page.
pub async fn element_exists(session: &Session, selector: &str) -> Result<bool> {
    let script = format!(
        "JSON.stringify(document.querySelector({sel}) !== null)",
        sel = js_string(selector)
    );
    Ok(session.eval_json(&script).await? == Value::Bool(true))
}

fn classify_click_error(selector: &str, error: &chromiumoxide::error::CdpError) -> BrowserError {
    let text = error.to_string().to_lowercase();
    if text.contains("could not find node") || text.contains("no node") {
        BrowserError::SelectorNotFound {
            selector: selector.to_string(),
        }
    } else if text.contains("clickable") || text.contains("visible") {
        BrowserError::NotInteractable {
            selector: selector.to_string(),
        }
    } else {
        BrowserError::Evaluation {
            detail: format!("click failed: {error}"),
        }
    }
}

/// Escape a Rust string as a JS string literal.
fn js_string(input: &str) -> String {
    serde_json::Value::String(input.to_string()).to_string()
}
