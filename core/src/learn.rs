//! Static learn pass.
//!
//! Extracts declared interaction expectations from the application's
//! source tree. Every expectation kind has a concrete producer here:
//! anchors promise navigation, buttons promise a UI change, forms promise
//! feedback, constrained forms (`required`/`pattern` controls) additionally
//! promise validation UI, forms with an `action` promise a network call to
//! that URL, and `aria-expanded` toggles promise a state change. Traversal
//! order and match order are deterministic, so expectation IDs are stable
//! across runs.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::error::{Result, VeraxError};
use crate::expectation::{Expectation, ExpectationKind, ExpectationSource, ExpectedOutcome};

static ANCHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r##"<a\s[^>]*href="([^"#][^"]*)""##)
        .unwrap_or_else(|e| unreachable!("static regex: {e}"))
});

static BUTTON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<button\s[^>]*id="([^"]+)""#).unwrap_or_else(|e| unreachable!("static regex: {e}"))
});

static FORM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<form\s[^>]*id="([^"]+)""#).unwrap_or_else(|e| unreachable!("static regex: {e}"))
});

static ACTION_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r##"action="([^"#][^"]*)""##).unwrap_or_else(|e| unreachable!("static regex: {e}"))
});

static TOGGLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<[a-z]+\s[^>]*aria-expanded="[^"]*"[^>]*>"#)
        .unwrap_or_else(|e| unreachable!("static regex: {e}"))
});

static ID_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"id="([^"]+)""#).unwrap_or_else(|e| unreachable!("static regex: {e}"))
});

/// Extract static expectations from markup under `src`.
///
/// Missing directories are an input error; an empty directory is a valid
/// (empty) plan.
pub fn extract(src: &Path) -> Result<Vec<Expectation>> {
    let mut files = Vec::new();
    collect_markup_files(src, &mut files)?;
    files.sort_unstable();

    let mut expectations = Vec::new();
    for file in &files {
        let content = std::fs::read_to_string(file).map_err(|e| VeraxError::InputRead {
            path: file.clone(),
            source: e,
        })?;
        let rel = file
            .strip_prefix(src)
            .unwrap_or(file)
            .to_string_lossy()
            .into_owned();
        extract_from_markup(&content, &rel, &mut expectations);
    }
    debug!(
        files = files.len(),
        expectations = expectations.len(),
        "learn pass complete"
    );
    Ok(expectations)
}

fn collect_markup_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = std::fs::read_dir(dir).map_err(|e| VeraxError::InputRead {
        path: dir.to_path_buf(),
        source: e,
    })?;
    for entry in entries {
        let entry = entry.map_err(|e| VeraxError::InputRead {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_markup_files(&path, out)?;
        } else if matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("html") | Some("htm")
        ) {
            out.push(path);
        }
    }
    Ok(())
}

fn extract_from_markup(content: &str, file: &str, out: &mut Vec<Expectation>) {
    let source_at = |offset: usize| ExpectationSource {
        file: file.to_string(),
        line: (content[..offset].matches('\n').count() + 1) as u32,
        discovered_at_phase: "learn".to_string(),
    };

    for capture in ANCHOR.captures_iter(content) {
        let href = &capture[1];
        if href.starts_with("javascript:") || href.starts_with("mailto:") {
            continue;
        }
        let offset = capture.get(0).map(|m| m.start()).unwrap_or(0);
        out.push(Expectation::from_static(
            ExpectationKind::Navigation,
            Some(format!("a[href=\"{href}\"]")),
            ExpectedOutcome::Navigation,
            source_at(offset),
        ));
    }

    for capture in BUTTON.captures_iter(content) {
        let offset = capture.get(0).map(|m| m.start()).unwrap_or(0);
        out.push(Expectation::from_static(
            ExpectationKind::Button,
            Some(format!("#{}", &capture[1])),
            ExpectedOutcome::UiChange,
            source_at(offset),
        ));
    }

    for capture in FORM.captures_iter(content) {
        let id = &capture[1];
        let offset = capture.get(0).map(|m| m.start()).unwrap_or(0);
        out.push(Expectation::from_static(
            ExpectationKind::Form,
            Some(format!("#{id}")),
            ExpectedOutcome::Feedback,
            source_at(offset),
        ));

        // The form body up to its closing tag carries the constraint and
        // network promises.
        let block_end = content[offset..]
            .find("</form>")
            .map(|i| offset + i)
            .unwrap_or(content.len());
        let block = &content[offset..block_end];
        if block.contains(" required") || block.contains("pattern=\"") {
            out.push(Expectation::from_static(
                ExpectationKind::Validation,
                Some(format!("#{id}")),
                ExpectedOutcome::Feedback,
                source_at(offset),
            ));
        }

        let tag_end = content[offset..]
            .find('>')
            .map(|i| offset + i + 1)
            .unwrap_or(block_end);
        let tag = &content[offset..tag_end];
        if let Some(action) = ACTION_ATTR.captures(tag).map(|c| c[1].to_string()) {
            out.push(
                Expectation::from_static(
                    ExpectationKind::Network,
                    Some(format!("#{id}")),
                    ExpectedOutcome::Network,
                    source_at(offset),
                )
                .with_promise_url(action),
            );
        }
    }

    for tag_match in TOGGLE.find_iter(content) {
        let Some(capture) = ID_ATTR.captures(tag_match.as_str()) else {
            continue;
        };
        out.push(Expectation::from_static(
            ExpectationKind::State,
            Some(format!("#{}", &capture[1])),
            ExpectedOutcome::UiChange,
            source_at(tag_match.start()),
        ));
    }
}
