//! Shared selection model for the four panels.
//!
//! Every panel entry point funnels into `highlight`, so the resulting set
//! never depends on where the click happened. The origin is kept only for
//! logging.

use std::collections::BTreeSet;

use tokio::sync::watch;
use tracing::debug;

use crate::model::{Coordinates, Dataset};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionOrigin {
    ReplayCanvas,
    Map,
    SuspectList,
    ColocationList,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HighlightState {
    pub pubkeys: BTreeSet<String>,
    /// Bumped on every change notification.
    pub revision: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

/// What geographic panels should do after a highlight change.
#[derive(Debug, Clone, PartialEq)]
pub enum GeoFocus {
    Center(Coordinates),
    FitBounds(Bounds),
}

pub struct HighlightSync {
    tx: watch::Sender<HighlightState>,
}

impl Default for HighlightSync {
    fn default() -> Self {
        Self::new()
    }
}

impl HighlightSync {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(HighlightState::default());
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<HighlightState> {
        self.tx.subscribe()
    }

    /// Replaces the highlighted set and notifies subscribers.
    pub fn highlight<I, S>(&self, pubkeys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = pubkeys.into_iter().map(Into::into).collect();
        self.tx.send_modify(|state| {
            state.pubkeys = set;
            state.revision += 1;
        });
    }

    pub fn clear(&self) {
        self.highlight(std::iter::empty::<String>());
    }

    pub fn is_highlighted(&self, pubkey: &str) -> bool {
        self.tx.borrow().pubkeys.contains(pubkey)
    }

    pub fn highlight_count(&self) -> usize {
        self.tx.borrow().pubkeys.len()
    }

    pub fn highlighted(&self) -> BTreeSet<String> {
        self.tx.borrow().pubkeys.clone()
    }

    pub fn revision(&self) -> u64 {
        self.tx.borrow().revision
    }

    pub fn select_peer(&self, origin: SelectionOrigin, pubkey: &str) {
        debug!(?origin, peer = pubkey, "peer selected");
        self.highlight([pubkey]);
    }

    pub fn select_group<I, S>(&self, origin: SelectionOrigin, pubkeys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = pubkeys.into_iter().map(Into::into).collect();
        debug!(?origin, peers = set.len(), "group selected");
        self.highlight(set);
    }

    /// Center on a single located peer, or fit bounds around every located
    /// peer when several are highlighted. Peers without coordinates are
    /// skipped.
    pub fn geo_focus(&self, dataset: &Dataset) -> Option<GeoFocus> {
        let state = self.tx.borrow();
        let located: Vec<Coordinates> = state
            .pubkeys
            .iter()
            .filter_map(|k| dataset.peer(k).and_then(|p| p.coordinates()))
            .collect();

        match located.as_slice() {
            [] => None,
            [only] => Some(GeoFocus::Center(*only)),
            many => {
                let mut bounds = Bounds {
                    south: f64::INFINITY,
                    west: f64::INFINITY,
                    north: f64::NEG_INFINITY,
                    east: f64::NEG_INFINITY,
                };
                for c in many {
                    bounds.south = bounds.south.min(c.lat);
                    bounds.north = bounds.north.max(c.lat);
                    bounds.west = bounds.west.min(c.lon);
                    bounds.east = bounds.east.max(c.lon);
                }
                Some(GeoFocus::FitBounds(bounds))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Peer;

    fn located(key: &str, lat: f64, lon: f64) -> Peer {
        let mut p = Peer::new(key);
        p.geo.coordinates = Some(Coordinates { lat, lon });
        p
    }

    #[test]
    fn highlight_replaces_and_clear_empties() {
        let sync = HighlightSync::new();
        sync.highlight(["A", "B"]);
        sync.highlight(["C"]);
        assert!(!sync.is_highlighted("A"));
        assert!(sync.is_highlighted("C"));
        assert_eq!(sync.highlight_count(), 1);

        sync.clear();
        assert_eq!(sync.highlight_count(), 0);
        assert_eq!(sync.revision(), 3);
    }

    #[test]
    fn origin_does_not_change_result() {
        let origins = [
            SelectionOrigin::ReplayCanvas,
            SelectionOrigin::Map,
            SelectionOrigin::SuspectList,
            SelectionOrigin::ColocationList,
        ];
        let sets: Vec<BTreeSet<String>> = origins
            .iter()
            .map(|&origin| {
                let sync = HighlightSync::new();
                sync.select_peer(origin, "X");
                sync.highlighted()
            })
            .collect();
        assert!(sets.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn subscribers_see_changes() {
        let sync = HighlightSync::new();
        let mut rx = sync.subscribe();
        sync.select_group(SelectionOrigin::ColocationList, ["A", "B"]);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().pubkeys.len(), 2);
    }

    #[test]
    fn geo_focus_centers_or_fits() {
        let mut ds = Dataset::default();
        for p in [located("A", 10.0, 20.0), located("B", -5.0, 40.0), Peer::new("C")] {
            ds.peers.insert(p.pubkey.clone(), p);
        }

        let sync = HighlightSync::new();
        assert_eq!(sync.geo_focus(&ds), None);

        sync.highlight(["A"]);
        assert_eq!(sync.geo_focus(&ds), Some(GeoFocus::Center(Coordinates { lat: 10.0, lon: 20.0 })));

        sync.highlight(["A", "B", "C"]);
        assert_eq!(
            sync.geo_focus(&ds),
            Some(GeoFocus::FitBounds(Bounds { south: -5.0, west: 20.0, north: 10.0, east: 40.0 }))
        );

        sync.highlight(["A", "C"]);
        assert!(matches!(sync.geo_focus(&ds), Some(GeoFocus::Center(_))));

        sync.highlight(["C"]);
        assert_eq!(sync.geo_focus(&ds), None);
    }
}
