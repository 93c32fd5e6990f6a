//! Stable identifier derivation.
//!
//! IDs are SHA-256 prefixes over `::`-joined inputs. No timestamps, no
//! randomness: identical inputs produce byte-identical IDs across runs,
//! which is what makes discovery output and report diffs comparable.

use sha2::{Digest, Sha256};

/// First 16 hex chars of SHA-256 over the `::`-joined parts.
pub fn stable_hash16(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(b"::");
        }
        hasher.update(part.as_bytes());
    }
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}

/// Full SHA-256 hex digest of a byte payload.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
