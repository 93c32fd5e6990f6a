//! Intent engines.
//!
//! Pure, deterministic functions from a minimal element snapshot to an
//! intent tag. Findings are gated on intent: a "broken navigation" claim
//! requires an explicit navigation intent whose observable contract failed,
//! never a guess from weak signals.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::signals::Signals;

/// Minimal element snapshot the engines operate on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ElementSnapshot {
    pub tag_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_attr: Option<String>,
    /// The element is associated with a form (submit control).
    pub form_associated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aria_expanded: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aria_pressed: Option<bool>,
    /// Explicit click-handler marker observed on the element.
    pub has_click_handler: bool,
    /// Router-library marker (e.g. a framework link attribute).
    pub spa_router_marker: bool,
}

/// What the user plausibly intends by interacting with the element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InteractionIntent {
    Navigation,
    Submission,
    Toggle,
    AsyncFeedback,
    Unknown,
}

/// The flavor of navigation an element promises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NavigationIntent {
    FullPageNav,
    SpaRouteNav,
    HashNav,
    Unknown,
}

/// Whether an element is a form-submission locus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionIntent {
    FormSubmission,
    Unknown,
}

/// Route data available to navigation-contract evaluation.
#[derive(Debug, Clone, Default)]
pub struct RouteData {
    pub before_url: Option<String>,
    pub after_url: Option<String>,
    pub transitions: usize,
}

/// Result of checking an intent-specific observable contract.
#[derive(Debug, Clone, Serialize)]
pub struct NavObservation {
    pub effect_observed: bool,
    pub details: serde_json::Value,
}

/// Infer interaction intent from the snapshot alone.
pub fn interaction_intent(snapshot: &ElementSnapshot) -> InteractionIntent {
    let is_anchor = snapshot.tag_name.eq_ignore_ascii_case("a");
    if (is_anchor && snapshot.href.is_some()) || snapshot.role.as_deref() == Some("link") {
        return InteractionIntent::Navigation;
    }
    let is_submit = snapshot.type_attr.as_deref() == Some("submit")
        || snapshot.tag_name.eq_ignore_ascii_case("form");
    if is_submit && (snapshot.form_associated || snapshot.tag_name.eq_ignore_ascii_case("form")) {
        return InteractionIntent::Submission;
    }
    if snapshot.aria_expanded.is_some() || snapshot.aria_pressed.is_some() {
        return InteractionIntent::Toggle;
    }
    if snapshot.has_click_handler {
        return InteractionIntent::AsyncFeedback;
    }
    InteractionIntent::Unknown
}

/// Infer navigation intent. The hash distinction requires comparable
/// before/after URLs; without both, a fragment href stays `Unknown`.
pub fn navigation_intent(
    snapshot: &ElementSnapshot,
    before_url: Option<&str>,
    after_url: Option<&str>,
) -> NavigationIntent {
    let is_anchor = snapshot.tag_name.eq_ignore_ascii_case("a");
    let is_link_role = snapshot.role.as_deref() == Some("link");
    if !is_anchor && !is_link_role {
        return NavigationIntent::Unknown;
    }

    match snapshot.href.as_deref() {
        Some(href) if href.starts_with('#') => {
            if before_url.is_some() && after_url.is_some() {
                NavigationIntent::HashNav
            } else {
                NavigationIntent::Unknown
            }
        }
        Some(_) if snapshot.spa_router_marker => NavigationIntent::SpaRouteNav,
        Some(_) => NavigationIntent::FullPageNav,
        None if is_link_role => NavigationIntent::SpaRouteNav,
        None => NavigationIntent::Unknown,
    }
}

/// Infer submission intent.
pub fn submission_intent(snapshot: &ElementSnapshot) -> SubmissionIntent {
    let is_form = snapshot.tag_name.eq_ignore_ascii_case("form");
    let is_submit_control =
        snapshot.type_attr.as_deref() == Some("submit") && snapshot.form_associated;
    if is_form || is_submit_control {
        SubmissionIntent::FormSubmission
    } else {
        SubmissionIntent::Unknown
    }
}

/// Evaluate the intent-specific observable contract.
pub fn evaluate_navigation_observables(
    intent: NavigationIntent,
    signals: &Signals,
    route: &RouteData,
) -> NavObservation {
    match intent {
        NavigationIntent::FullPageNav => NavObservation {
            effect_observed: signals.navigation_changed,
            details: serde_json::json!({ "url_changed": signals.navigation_changed }),
        },
        NavigationIntent::SpaRouteNav => NavObservation {
            effect_observed: signals.route_changed,
            details: serde_json::json!({
                "route_changed": signals.route_changed,
                "transitions": route.transitions,
            }),
        },
        NavigationIntent::HashNav => {
            let hash_changed = match (&route.before_url, &route.after_url) {
                (Some(before), Some(after)) => fragment_of(before) != fragment_of(after),
                _ => false,
            };
            NavObservation {
                effect_observed: hash_changed || signals.route_changed,
                details: serde_json::json!({ "hash_changed": hash_changed }),
            }
        }
        NavigationIntent::Unknown => NavObservation {
            effect_observed: signals.navigation_changed || signals.route_changed,
            details: serde_json::json!({}),
        },
    }
}

fn fragment_of(input: &str) -> String {
    match Url::parse(input) {
        Ok(url) => url.fragment().unwrap_or_default().to_string(),
        Err(_) => input
            .split_once('#')
            .map(|(_, frag)| frag.to_string())
            .unwrap_or_default(),
    }
}
