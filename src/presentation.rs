//! Draw and list models handed to the panels, and the contracts the panels
//! implement. Panels only render what they are given; all selection logic
//! lives in `highlight`.

use crate::highlight::{GeoFocus, HighlightSync};
use crate::layout::Layout;
use crate::leaks::{ranked_colocation, ranked_suspects};
use crate::model::{Coordinates, Dataset};
use crate::replay::ReplayFrame;

pub const DIMMED_ALPHA: f64 = 0.15;
pub const UNLIT_ALPHA: f64 = 0.3;

#[derive(Debug, Clone, PartialEq)]
pub struct PeerGlyph {
    pub pubkey: String,
    pub x: f64,
    pub y: f64,
    pub color: String,
    pub alpha: f64,
    pub glow: f64,
    pub lit: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapMarker {
    pub pubkey: String,
    pub label: String,
    pub coordinates: Coordinates,
    pub color: String,
    pub alpha: f64,
    pub highlighted: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SuspectCard {
    pub pubkey: String,
    pub label: String,
    pub community: String,
    pub tor_only: bool,
    pub avg_arrival_pct: f64,
    pub top5_pct: f64,
    pub first_pct: f64,
    pub messages_seen: u64,
    pub highlighted: bool,
    pub dimmed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChipMember {
    pub pubkey: String,
    pub label: String,
    pub ip: Option<String>,
    pub highlighted: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColocationChip {
    pub prefix: String,
    pub count: usize,
    pub members: Vec<ChipMember>,
}

pub trait CanvasSurface {
    fn draw(&mut self, glyphs: &[PeerGlyph], progress: f64);
}

pub trait MapSurface {
    fn show_markers(&mut self, markers: &[MapMarker]);
    fn focus(&mut self, focus: &GeoFocus);
}

pub trait ListSurface {
    fn show_suspects(&mut self, cards: &[SuspectCard]);
    fn show_colocation(&mut self, chips: &[ColocationChip]);
}

fn highlight_alpha(highlight: &HighlightSync, pubkey: &str) -> Option<f64> {
    if highlight.highlight_count() > 0 && !highlight.is_highlighted(pubkey) {
        Some(DIMMED_ALPHA)
    } else {
        None
    }
}

/// One glyph per laid-out peer. Highlight dimming wins over replay state.
pub fn canvas_glyphs(
    dataset: &Dataset,
    layout: &Layout,
    frame: Option<&ReplayFrame>,
    highlight: &HighlightSync,
) -> Vec<PeerGlyph> {
    layout
        .positions
        .iter()
        .map(|(key, pos)| {
            let community = dataset.peer(key).map(|p| p.community.as_str()).unwrap_or_default();
            let lit = frame.and_then(|f| f.lit.iter().find(|l| &l.pubkey == key));
            let replay_alpha = match (frame, lit) {
                (Some(_), None) => UNLIT_ALPHA,
                _ => 1.0,
            };
            PeerGlyph {
                pubkey: key.clone(),
                x: pos.x,
                y: pos.y,
                color: dataset.community_color(community).to_string(),
                alpha: highlight_alpha(highlight, key).unwrap_or(replay_alpha),
                glow: lit.map(|l| l.freshness).unwrap_or(0.0),
                lit: lit.is_some(),
            }
        })
        .collect()
}

/// Markers for every peer with known coordinates.
pub fn map_markers(dataset: &Dataset, highlight: &HighlightSync) -> Vec<MapMarker> {
    dataset
        .peers
        .values()
        .filter_map(|peer| {
            let coordinates = peer.coordinates()?;
            Some(MapMarker {
                pubkey: peer.pubkey.clone(),
                label: peer.display_label(),
                coordinates,
                color: dataset.community_color(&peer.community).to_string(),
                alpha: highlight_alpha(highlight, &peer.pubkey).unwrap_or(1.0),
                highlighted: highlight.is_highlighted(&peer.pubkey),
            })
        })
        .collect()
}

pub fn suspect_cards(dataset: &Dataset, highlight: &HighlightSync) -> Vec<SuspectCard> {
    ranked_suspects(&dataset.leaks)
        .into_iter()
        .map(|fr| SuspectCard {
            pubkey: fr.pubkey.clone(),
            label: match fr.alias.as_deref() {
                Some(alias) if !alias.trim().is_empty() => alias.to_string(),
                _ => dataset.display_label(&fr.pubkey),
            },
            community: fr.community.clone(),
            tor_only: fr.tor_only,
            avg_arrival_pct: fr.avg_arrival_pct,
            top5_pct: fr.top5_pct,
            first_pct: fr.first_pct,
            messages_seen: fr.messages_seen,
            highlighted: highlight.is_highlighted(&fr.pubkey),
            dimmed: highlight_alpha(highlight, &fr.pubkey).is_some(),
        })
        .collect()
}

pub fn colocation_chips(dataset: &Dataset, highlight: &HighlightSync) -> Vec<ColocationChip> {
    ranked_colocation(&dataset.leaks)
        .into_iter()
        .map(|group| ColocationChip {
            prefix: group.prefix.clone(),
            count: group.count,
            members: group
                .members
                .iter()
                .map(|m| ChipMember {
                    pubkey: m.pubkey.clone(),
                    label: match m.alias.as_deref() {
                        Some(alias) if !alias.trim().is_empty() => alias.to_string(),
                        _ => dataset.display_label(&m.pubkey),
                    },
                    ip: m.ip.clone(),
                    highlighted: highlight.is_highlighted(&m.pubkey),
                })
                .collect(),
        })
        .collect()
}
