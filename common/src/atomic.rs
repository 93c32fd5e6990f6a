//! Crash-safe artifact writes.
//!
//! Uses the temp-file + fsync + rename pattern: a partially written file is
//! never observable at the target path. JSON payloads go through the
//! canonical encoder so the bytes on disk are stable across runs.

use std::io::Write;
use std::path::Path;

use serde_json::Value;

use crate::canonical::to_canonical_json;

/// Write `bytes` to `path` atomically.
///
/// The temporary file lives in the target's directory so the final rename
/// stays on one filesystem.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("artifact");
    let temp_path = dir.join(format!(".{file_name}.tmp"));

    let mut file = std::fs::File::create(&temp_path)?;
    file.write_all(bytes)?;
    // fsync for durability before the rename makes it visible.
    file.sync_all()?;
    drop(file);

    std::fs::rename(&temp_path, path)
}

/// Canonically encode `value` and write it atomically.
pub fn write_json_atomic(path: &Path, value: &Value) -> std::io::Result<()> {
    write_atomic(path, to_canonical_json(value).as_bytes())
}
