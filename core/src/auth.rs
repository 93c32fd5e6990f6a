//! Authentication collaborator.
//!
//! Loads auth material (storage state, literal cookie JSON, extra headers)
//! and applies it to the session before observation. Effectiveness is
//! verified after the first navigation; in strict mode an ineffective
//! login aborts the run.

use serde_json::Value;
use tracing::{debug, warn};
use verax_browser::session::{CookieSpec, Session};

use crate::config::{AuthConfig, AuthMode};
use crate::error::{Result, VeraxError};

/// Parse cookie material: a single cookie object, an array of them, or a
/// path to a file containing either.
pub fn parse_cookies(input: &str) -> Result<Vec<CookieSpec>> {
    let trimmed = input.trim();
    let json = if trimmed.starts_with('{') || trimmed.starts_with('[') {
        trimmed.to_string()
    } else {
        std::fs::read_to_string(trimmed).map_err(|e| VeraxError::AuthInvalid {
            detail: format!("cookie file {trimmed}: {e}"),
        })?
    };
    let value: Value = serde_json::from_str(&json).map_err(|e| VeraxError::AuthInvalid {
        detail: format!("cookie JSON: {e}"),
    })?;
    match &value {
        Value::Array(items) => items.iter().map(cookie_from_value).collect(),
        Value::Object(_) => Ok(vec![cookie_from_value(&value)?]),
        _ => Err(VeraxError::AuthInvalid {
            detail: "cookie payload must be an object or array".to_string(),
        }),
    }
}

/// Parse a storage-state file: `{ "cookies": [...] }`, extra keys ignored.
pub fn parse_storage_state(path: &std::path::Path) -> Result<Vec<CookieSpec>> {
    let content = std::fs::read_to_string(path).map_err(|e| VeraxError::AuthInvalid {
        detail: format!("storage file {}: {e}", path.display()),
    })?;
    let value: Value = serde_json::from_str(&content).map_err(|e| VeraxError::AuthInvalid {
        detail: format!("storage JSON: {e}"),
    })?;
    let cookies = value
        .get("cookies")
        .and_then(Value::as_array)
        .ok_or_else(|| VeraxError::AuthInvalid {
            detail: "storage state has no cookies array".to_string(),
        })?;
    cookies.iter().map(cookie_from_value).collect()
}

fn cookie_from_value(value: &Value) -> Result<CookieSpec> {
    let name = value
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| VeraxError::AuthInvalid {
            detail: "cookie missing name".to_string(),
        })?;
    let cookie_value = value
        .get("value")
        .and_then(Value::as_str)
        .ok_or_else(|| VeraxError::AuthInvalid {
            detail: format!("cookie {name} missing value"),
        })?;
    Ok(CookieSpec {
        name: name.to_string(),
        value: cookie_value.to_string(),
        domain: value
            .get("domain")
            .and_then(Value::as_str)
            .map(str::to_string),
        path: value
            .get("path")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

/// Parse an `--auth-header "Name: Value"` argument.
pub fn parse_header(input: &str) -> Result<(String, String)> {
    let (name, value) = input.split_once(':').ok_or_else(|| VeraxError::AuthInvalid {
        detail: format!("header '{input}' is not 'Name: Value'"),
    })?;
    let name = name.trim();
    let value = value.trim();
    if name.is_empty() || value.is_empty() {
        return Err(VeraxError::AuthInvalid {
            detail: format!("header '{input}' has an empty name or value"),
        });
    }
    Ok((name.to_string(), value.to_string()))
}

/// Apply configured auth material to the session (before navigation).
///
/// Cookies without an explicit domain inherit the target host, which is
/// what CDP needs to accept them before the first navigation.
pub async fn apply(session: &Session, auth: &AuthConfig, base_url: &str) -> Result<()> {
    if auth.mode == AuthMode::Off || !auth.is_configured() {
        return Ok(());
    }
    let mut cookies = Vec::new();
    if let Some(path) = &auth.storage_file {
        cookies.extend(parse_storage_state(path)?);
    }
    if let Some(raw) = &auth.cookie {
        cookies.extend(parse_cookies(raw)?);
    }
    if !cookies.is_empty() {
        let default_domain = url::Url::parse(base_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string));
        for cookie in &mut cookies {
            if cookie.domain.is_none() {
                cookie.domain = default_domain.clone();
            }
        }
        session.set_cookies(&cookies).await?;
        debug!(count = cookies.len(), "auth cookies applied");
    }
    if !auth.headers.is_empty() {
        session.set_extra_headers(&auth.headers).await?;
        debug!(count = auth.headers.len(), "auth headers applied");
    }
    Ok(())
}

/// Verify auth effectiveness after the first navigation.
///
/// Heuristic: a visible password field on the landing page means the login
/// did not take. Strict mode turns that into a run-aborting failure; auto
/// mode logs and continues.
pub async fn verify(session: &Session, auth: &AuthConfig) -> Result<()> {
    if auth.mode == AuthMode::Off || !auth.is_configured() {
        return Ok(());
    }
    let script =
        "JSON.stringify(document.querySelector('input[type=\"password\"]') !== null)";
    let login_visible = matches!(
        session.eval_json(script).await,
        Ok(Value::Bool(true))
    );
    if !login_visible {
        return Ok(());
    }
    match auth.mode {
        AuthMode::Strict => Err(VeraxError::AuthIneffective),
        _ => {
            warn!("auth applied but a login form is still visible; continuing (auto mode)");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_single_cookie_object() {
        let cookies =
            parse_cookies(r#"{"name":"sid","value":"abc","domain":".app.test"}"#).unwrap();
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].name, "sid");
        assert_eq!(cookies[0].domain.as_deref(), Some(".app.test"));
    }

    #[test]
    fn test_parse_cookie_array() {
        let cookies =
            parse_cookies(r#"[{"name":"a","value":"1"},{"name":"b","value":"2"}]"#).unwrap();
        assert_eq!(cookies.len(), 2);
    }

    #[test]
    fn test_cookie_missing_value_is_invalid() {
        let err = parse_cookies(r#"{"name":"sid"}"#);
        assert!(matches!(err, Err(VeraxError::AuthInvalid { .. })));
    }

    #[test]
    fn test_parse_header_formats() {
        assert_eq!(
            parse_header("Authorization: Bearer tok").unwrap(),
            ("Authorization".to_string(), "Bearer tok".to_string())
        );
        assert!(parse_header("no-colon").is_err());
        assert!(parse_header(": empty").is_err());
    }

    #[test]
    fn test_parse_storage_state_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(
            &path,
            r#"{"cookies":[{"name":"sid","value":"x","path":"/"}],"origins":[]}"#,
        )
        .unwrap();
        let cookies = parse_storage_state(&path).unwrap();
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].path.as_deref(), Some("/"));
    }
}
