//! Canonical JSON encoding.
//!
//! Every artifact VERAX persists goes through this one encoder: object keys
//! sorted by Unicode code point at every depth, 2-space indentation, and a
//! trailing newline. Sorting happens at encode time rather than at each
//! call site, so no producer has to remember to pre-sort.

use serde_json::Value;
use std::fmt::Write as _;

/// Encode a value canonically: sorted keys, 2-space indent, trailing newline.
pub fn to_canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value, 0);
    out.push('\n');
    out
}

fn write_value(out: &mut String, value: &Value, indent: usize) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => {
            let _ = write!(out, "{b}");
        }
        Value::Number(n) => {
            let _ = write!(out, "{n}");
        }
        Value::String(s) => {
            // serde_json's string escaping is stable; reuse it.
            let _ = write!(out, "{}", Value::String(s.clone()));
        }
        Value::Array(items) => {
            if items.is_empty() {
                out.push_str("[]");
                return;
            }
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push('\n');
                push_indent(out, indent + 1);
                write_value(out, item, indent + 1);
            }
            out.push('\n');
            push_indent(out, indent);
            out.push(']');
        }
        Value::Object(map) => {
            if map.is_empty() {
                out.push_str("{}");
                return;
            }
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push('\n');
                push_indent(out, indent + 1);
                let _ = write!(out, "{}", Value::String((*key).clone()));
                out.push_str(": ");
                if let Some(child) = map.get(*key) {
                    write_value(out, child, indent + 1);
                }
            }
            out.push('\n');
            push_indent(out, indent);
            out.push('}');
        }
    }
}

fn push_indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}
