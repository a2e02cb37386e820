//! Selection and view intent shared with rendering/listing consumers.
//!
//! Holds identity keys only; the tracks themselves stay in the store.

use crate::compliance::Compliance;
use crate::store::FleetSnapshot;
use crate::track::DroneTrack;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which tracks consumers should show.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewFilter {
    #[default]
    All,
    /// Red tracks only
    BlockedOnly,
    /// Green tracks only
    AllowedOnly,
}

impl ViewFilter {
    pub fn matches(self, track: &DroneTrack) -> bool {
        match self {
            ViewFilter::All => true,
            ViewFilter::BlockedOnly => track.compliance() == Compliance::Blocked,
            ViewFilter::AllowedOnly => track.compliance() == Compliance::Allowed,
        }
    }

    /// Next filter in the toggle order blocked → allowed → all.
    pub fn next(self) -> Self {
        match self {
            ViewFilter::BlockedOnly => ViewFilter::AllowedOnly,
            ViewFilter::AllowedOnly => ViewFilter::All,
            ViewFilter::All => ViewFilter::BlockedOnly,
        }
    }
}

/// Current UI intent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionState {
    selected: Option<String>,
    /// Bumped on every `select`, even for the same key
    selected_stamp: u64,
    hovered: Option<String>,
    filter: ViewFilter,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select a track (or nothing).
    ///
    /// The stamp is strictly increasing, so re-selecting the same track is
    /// distinguishable from no change.
    pub fn select(&mut self, key: Option<String>) {
        self.selected = key;
        self.selected_stamp += 1;
    }

    pub fn hover(&mut self, key: Option<String>) {
        self.hovered = key;
    }

    pub fn set_filter(&mut self, filter: ViewFilter) {
        self.filter = filter;
    }

    /// Advance the filter and return the new one.
    pub fn cycle_filter(&mut self) -> ViewFilter {
        self.filter = self.filter.next();
        self.filter
    }

    /// Reset selection and hover; the filter is kept.
    pub fn clear(&mut self) {
        self.selected = None;
        self.hovered = None;
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn selected_stamp(&self) -> u64 {
        self.selected_stamp
    }

    pub fn hovered(&self) -> Option<&str> {
        self.hovered.as_deref()
    }

    pub fn filter(&self) -> ViewFilter {
        self.filter
    }

    /// The selected track in `snapshot`, if it exists there.
    pub fn selected_track(&self, snapshot: &FleetSnapshot) -> Option<Arc<DroneTrack>> {
        self.selected.as_deref().and_then(|key| snapshot.get(key)).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::DroneUpdate;

    #[test]
    fn test_reselect_bumps_stamp() {
        let mut s = SelectionState::new();
        s.select(Some("A".into()));
        let first = s.selected_stamp();
        s.select(Some("A".into()));
        assert!(s.selected_stamp() > first);
        assert_eq!(s.selected(), Some("A"));
    }

    #[test]
    fn test_clear_keeps_filter() {
        let mut s = SelectionState::new();
        s.select(Some("A".into()));
        s.hover(Some("B".into()));
        s.set_filter(ViewFilter::BlockedOnly);
        s.clear();

        assert_eq!(s.selected(), None);
        assert_eq!(s.hovered(), None);
        assert_eq!(s.filter(), ViewFilter::BlockedOnly);
    }

    #[test]
    fn test_cycle_order() {
        let mut s = SelectionState::new();
        assert_eq!(s.filter(), ViewFilter::All);
        assert_eq!(s.cycle_filter(), ViewFilter::BlockedOnly);
        assert_eq!(s.cycle_filter(), ViewFilter::AllowedOnly);
        assert_eq!(s.cycle_filter(), ViewFilter::All);
    }

    #[test]
    fn test_filter_matches() {
        let green = DroneTrack::new("g", &DroneUpdate::at(0.0, 0.0).with_property("registration", "SG-BA"), 0);
        let red = DroneTrack::new("r", &DroneUpdate::at(0.0, 0.0), 0);

        assert!(ViewFilter::All.matches(&green) && ViewFilter::All.matches(&red));
        assert!(ViewFilter::AllowedOnly.matches(&green));
        assert!(!ViewFilter::AllowedOnly.matches(&red));
        assert!(ViewFilter::BlockedOnly.matches(&red));
        assert!(!ViewFilter::BlockedOnly.matches(&green));
    }
}
