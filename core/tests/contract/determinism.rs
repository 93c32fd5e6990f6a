//! Determinism of plan IDs and the run digest.

use pretty_assertions::assert_eq;
use verax_core::attempt::{Attempt, Cause};
use verax_core::expectation::{
    Expectation, ExpectationKind, ExpectationSource, ExpectedOutcome,
};
use verax_core::{digest, learn};

fn source(file: &str, line: u32) -> ExpectationSource {
    ExpectationSource {
        file: file.to_string(),
        line,
        discovered_at_phase: "learn".to_string(),
    }
}

#[test]
fn test_expectation_ids_byte_equal_across_builds() {
    let build = || {
        vec![
            Expectation::from_static(
                ExpectationKind::Navigation,
                Some("a[href=\"/about\"]".to_string()),
                ExpectedOutcome::Navigation,
                source("index.html", 3),
            ),
            Expectation::from_static(
                ExpectationKind::Form,
                Some("#signup".to_string()),
                ExpectedOutcome::Feedback,
                source("signup.html", 12),
            ),
        ]
    };
    let ids_a: Vec<String> = build().into_iter().map(|e| e.id).collect();
    let ids_b: Vec<String> = build().into_iter().map(|e| e.id).collect();
    assert_eq!(ids_a, ids_b);
}

#[test]
fn test_learn_pass_is_deterministic_over_a_tree() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("pages")).unwrap();
    std::fs::write(
        dir.path().join("index.html"),
        "<a href=\"/static-page\">s</a>\n<a href=\"/about\">a</a>\n<a href=\"/contact\">c</a>",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("pages/app.html"),
        "<button id=\"save\">Save</button>\n<form id=\"signup\"></form>",
    )
    .unwrap();

    let one = learn::extract(dir.path()).unwrap();
    let two = learn::extract(dir.path()).unwrap();
    assert_eq!(one.len(), 5);
    let ids_one: Vec<&str> = one.iter().map(|e| e.id.as_str()).collect();
    let ids_two: Vec<&str> = two.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids_one, ids_two);
}

#[test]
fn test_digest_reproducibility_proof() {
    let plan: Vec<String> = vec!["exp-a".to_string(), "runtime-nav-b".to_string()];
    let observations: Vec<Attempt> = plan
        .iter()
        .map(|id| {
            let mut attempt = Attempt::skipped(id, "navigation", "no-change", Cause::NoChange);
            attempt.attempted = true;
            attempt
        })
        .collect();

    let one = digest::compute(&plan, &observations, "https://app.test/", "generic", "0.4.1");
    let two = digest::compute(&plan, &observations, "https://app.test/", "generic", "0.4.1");
    assert_eq!(one, two);

    // Any observation flip changes the digest.
    let mut flipped = observations.clone();
    flipped[0].observed = true;
    let three = digest::compute(&plan, &flipped, "https://app.test/", "generic", "0.4.1");
    assert_ne!(one, three);
}
