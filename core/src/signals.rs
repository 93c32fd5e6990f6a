//! Observation signals.
//!
//! The closed set of booleans promoted from an evidence bundle onto its
//! attempt. Outcome evaluation and silence classification read these and
//! nothing else.

use serde::{Deserialize, Serialize};

/// What was observed between the before and after captures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signals {
    pub navigation_changed: bool,
    pub route_changed: bool,
    pub meaningful_dom_change: bool,
    pub meaningful_ui_change: bool,
    pub feedback_seen: bool,
    pub correlated_network_activity: bool,
    pub network_activity: bool,
    pub dom_changed: bool,
}

impl Signals {
    /// Whether any signal at all fired. Silence classification only runs
    /// when this is false.
    pub fn any(&self) -> bool {
        self.navigation_changed
            || self.route_changed
            || self.meaningful_dom_change
            || self.meaningful_ui_change
            || self.feedback_seen
            || self.correlated_network_activity
            || self.network_activity
            || self.dom_changed
    }

    /// The acknowledgment subset the adaptive watcher keys on.
    pub fn acknowledged(&self) -> bool {
        self.route_changed
            || self.meaningful_dom_change
            || self.feedback_seen
            || self.correlated_network_activity
    }
}
