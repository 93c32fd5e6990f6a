//! Run digest.
//!
//! SHA-256 over a canonical encoding of the plan and observations — the
//! run's reproducibility proof. Identical inputs always digest to the same
//! value; nothing time-dependent participates.

use verax_common::canonical::to_canonical_json;
use verax_common::ids::sha256_hex;

use crate::attempt::Attempt;

/// Compute the run digest.
pub fn compute(
    plan_ids: &[String],
    observations: &[Attempt],
    base_url: &str,
    framework_tag: &str,
    version: &str,
) -> String {
    let observation_rows: Vec<serde_json::Value> = observations
        .iter()
        .map(|a| {
            serde_json::json!({
                "id": a.id,
                "attempted": a.attempted,
                "observed": a.observed,
                "reason": a.reason,
                "cause": a.cause,
            })
        })
        .collect();
    let payload = serde_json::json!({
        "plan": plan_ids,
        "observations": observation_rows,
        "url": base_url,
        "framework": framework_tag,
        "version": version,
    });
    sha256_hex(to_canonical_json(&payload).as_bytes())
}
