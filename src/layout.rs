//! Radial layout: one angular sector per community, radius by arrival speed.
//!
//! Communities are laid out in lexicographic order starting at angle 0 and
//! each receives `share × 2π` of the circle. A fixed gap is carved out of the
//! start of every sector so adjacent communities stay visually apart; the
//! sectors themselves (gap included) tile the full circle exactly.

use std::collections::BTreeMap;
use std::f64::consts::TAU;

use crate::config::CanvasSize;
use crate::model::Peer;

pub const SECTOR_GAP: f64 = 0.04;
pub const CANVAS_MARGIN: f64 = 30.0;
pub const MIN_RADIUS_FRACTION: f64 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub angle: f64,
    pub radius: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sector {
    pub community: String,
    pub start: f64,
    /// Full angular size including the gap.
    pub span: f64,
    pub gap: f64,
    pub peer_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Layout {
    pub positions: BTreeMap<String, Position>,
    pub sectors: Vec<Sector>,
    pub center: (f64, f64),
    pub max_radius: f64,
}

impl Layout {
    pub fn position(&self, pubkey: &str) -> Option<&Position> {
        self.positions.get(pubkey)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Nearest peer to `(x, y)` within `tolerance`; ties go to the smaller key.
    pub fn hit_test(&self, x: f64, y: f64, tolerance: f64) -> Option<&str> {
        let mut best: Option<(&str, f64)> = None;
        for (key, pos) in &self.positions {
            let d = (pos.x - x).hypot(pos.y - y);
            if d > tolerance {
                continue;
            }
            match best {
                Some((_, bd)) if bd <= d => {}
                _ => best = Some((key.as_str(), d)),
            }
        }
        best.map(|(key, _)| key)
    }
}

fn radius_for(max_radius: f64, avg_arrival_pct: f64) -> f64 {
    let pct = if avg_arrival_pct.is_finite() {
        avg_arrival_pct.clamp(0.0, 1.0)
    } else {
        1.0
    };
    max_radius * (MIN_RADIUS_FRACTION + (1.0 - MIN_RADIUS_FRACTION) * pct)
}

pub fn compute_layout<'a, I>(peers: I, canvas: CanvasSize) -> Layout
where
    I: IntoIterator<Item = &'a Peer>,
{
    let mut by_community: BTreeMap<&str, BTreeMap<&str, &Peer>> = BTreeMap::new();
    for peer in peers {
        by_community
            .entry(peer.community.as_str())
            .or_default()
            .insert(peer.pubkey.as_str(), peer);
    }

    let total: usize = by_community.values().map(|m| m.len()).sum();
    let center = (canvas.width / 2.0, canvas.height / 2.0);
    let max_radius = (canvas.width.min(canvas.height) / 2.0 - CANVAS_MARGIN).max(0.0);

    let mut layout = Layout {
        center,
        max_radius,
        ..Layout::default()
    };
    if total == 0 {
        return layout;
    }

    let mut start = 0.0;
    for (community, members) in &by_community {
        let n = members.len();
        let span = n as f64 / total as f64 * TAU;
        let gap = SECTOR_GAP.min(span);
        let sweep = span - gap;
        let first = start + gap / 2.0;

        for (i, (key, peer)) in members.iter().enumerate() {
            let angle = if n == 1 {
                start + span / 2.0
            } else {
                first + sweep * (i as f64 / (n - 1) as f64)
            };
            let radius = radius_for(max_radius, peer.stats.avg_arrival_pct);
            layout.positions.insert(
                key.to_string(),
                Position {
                    x: center.0 + radius * angle.cos(),
                    y: center.1 + radius * angle.sin(),
                    angle,
                    radius,
                },
            );
        }

        layout.sectors.push(Sector {
            community: community.to_string(),
            start,
            span,
            gap,
            peer_count: n,
        });
        start += span;
    }

    layout
}
