//! Conversions between CDP wire types and plain Rust shapes.

use std::collections::BTreeMap;

use serde::Serialize;

/// Serialize any CDP id/enum to its wire string.
///
/// CDP identifiers and enums serialize as plain JSON strings; going through
/// serde avoids depending on each generated type's accessor surface.
pub(crate) fn wire_string<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        Ok(other) => other.to_string(),
        Err(_) => String::new(),
    }
}

/// Flatten a CDP headers object into a sorted string map.
pub(crate) fn headers_map<T: Serialize>(headers: &T) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    if let Ok(serde_json::Value::Object(map)) = serde_json::to_value(headers) {
        for (name, value) in map {
            let rendered = match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            out.insert(name, rendered);
        }
    }
    out
}
