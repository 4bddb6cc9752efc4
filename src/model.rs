//! Canonical in-memory snapshot. Everything here is built once by
//! `normalize` and read-only afterwards; engines never see the wire shapes.

use std::collections::{BTreeMap, BTreeSet};

pub const UNKNOWN_COMMUNITY: &str = "unknown";
pub const UNKNOWN_COMMUNITY_COLOR: &str = "#adb5bd";
pub const UNKNOWN_LABEL: &str = "Unknown";

const DISPLAY_KEY_CHARS: usize = 16;

/// First 16 chars of the key, ellipsized when anything was cut.
pub fn truncated_pubkey(pubkey: &str) -> String {
    let head: String = pubkey.chars().take(DISPLAY_KEY_CHARS).collect();
    if head.len() < pubkey.len() {
        format!("{}…", head)
    } else {
        head
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoInfo {
    pub coordinates: Option<Coordinates>,
    pub city: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkOperator {
    pub isp: Option<String>,
    pub as_label: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PropagationStats {
    pub avg_arrival_pct: f64,
    pub median_arrival_pct: f64,
    pub top5_pct: f64,
    pub first_pct: f64,
    pub messages_seen: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Peer {
    pub pubkey: String,
    pub alias: Option<String>,
    pub ip: Option<String>,
    pub tor_only: bool,
    pub geo: GeoInfo,
    pub operator: NetworkOperator,
    pub community: String,
    pub stats: PropagationStats,
}

impl Peer {
    pub fn new(pubkey: impl Into<String>) -> Self {
        Self {
            pubkey: pubkey.into(),
            alias: None,
            ip: None,
            tor_only: false,
            geo: GeoInfo::default(),
            operator: NetworkOperator::default(),
            community: UNKNOWN_COMMUNITY.to_string(),
            stats: PropagationStats::default(),
        }
    }

    /// Reachable by a direct IP address.
    pub fn is_clearnet(&self) -> bool {
        self.ip.is_some()
    }

    pub fn display_label(&self) -> String {
        match self.alias.as_deref() {
            Some(alias) if !alias.trim().is_empty() => alias.to_string(),
            _ => truncated_pubkey(&self.pubkey),
        }
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        self.geo.coordinates
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MessageType {
    ChannelAnnouncement,
    NodeAnnouncement,
    ChannelUpdate,
    Unknown,
}

impl MessageType {
    pub fn from_type_id(id: u64) -> Self {
        match id {
            1 => MessageType::ChannelAnnouncement,
            2 => MessageType::NodeAnnouncement,
            3 => MessageType::ChannelUpdate,
            _ => MessageType::Unknown,
        }
    }

    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "channel_announcement" => MessageType::ChannelAnnouncement,
            "node_announcement" => MessageType::NodeAnnouncement,
            "channel_update" => MessageType::ChannelUpdate,
            _ => MessageType::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::ChannelAnnouncement => "channel_announcement",
            MessageType::NodeAnnouncement => "node_announcement",
            MessageType::ChannelUpdate => "channel_update",
            MessageType::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub hash: String,
    pub kind: MessageType,
    pub peer_count: usize,
    pub time_spread_ms: f64,
    pub size: Option<u64>,
    pub orig_node: Option<String>,
    pub scid: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Arrival {
    pub peer: String,
    pub delay_ms: f64,
}

/// Arrivals sorted by delay; the earliest delay is always 0.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Wavefront {
    pub arrivals: Vec<Arrival>,
}

impl Wavefront {
    pub fn spread_ms(&self) -> f64 {
        match (self.arrivals.first(), self.arrivals.last()) {
            (Some(first), Some(last)) => last.delay_ms - first.delay_ms,
            _ => 0.0,
        }
    }

    pub fn peer_count(&self) -> usize {
        self.arrivals.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Community {
    pub id: String,
    pub label: String,
    pub color: String,
    pub description: Option<String>,
}

impl Community {
    pub fn unknown() -> Self {
        Self {
            id: UNKNOWN_COMMUNITY.to_string(),
            label: UNKNOWN_LABEL.to_string(),
            color: UNKNOWN_COMMUNITY_COLOR.to_string(),
            description: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FirstResponder {
    pub pubkey: String,
    pub alias: Option<String>,
    pub ip: Option<String>,
    pub tor_only: bool,
    pub community: String,
    pub avg_arrival_pct: f64,
    pub top5_pct: f64,
    pub first_pct: f64,
    pub messages_seen: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColocationMember {
    pub pubkey: String,
    pub alias: Option<String>,
    pub ip: Option<String>,
    pub avg_arrival_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColocationGroup {
    pub prefix: String,
    pub count: usize,
    pub members: Vec<ColocationMember>,
}

impl ColocationGroup {
    pub fn member_keys(&self) -> BTreeSet<String> {
        self.members.iter().map(|m| m.pubkey.clone()).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Leaks {
    pub first_responders: Vec<FirstResponder>,
    pub colocation: Vec<ColocationGroup>,
}

impl Leaks {
    pub fn is_empty(&self) -> bool {
        self.first_responders.is_empty() && self.colocation.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FingerprintGroup {
    pub features_hex: String,
    /// `None` when the snapshot carried no name list; treated as no features.
    pub feature_names: Option<Vec<String>>,
    pub node_count: usize,
    pub members: Vec<String>,
}

impl FingerprintGroup {
    pub fn has_feature(&self, name: &str) -> bool {
        self.feature_names
            .as_deref()
            .map(|names| names.iter().any(|n| n == name))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fingerprints {
    pub groups: Vec<FingerprintGroup>,
    /// pubkey -> index into `groups`. First group listing a peer wins.
    pub by_peer: BTreeMap<String, usize>,
    pub total_nodes_parsed: u64,
    pub total_unique_fingerprints: u64,
    pub feature_prevalence: BTreeMap<String, u64>,
}

impl Fingerprints {
    pub fn group_of(&self, pubkey: &str) -> Option<&FingerprintGroup> {
        self.by_peer.get(pubkey).and_then(|&idx| self.groups.get(idx))
    }

    pub fn fingerprinted_peers(&self) -> impl Iterator<Item = (&String, &FingerprintGroup)> {
        self.by_peer
            .iter()
            .filter_map(move |(key, &idx)| self.groups.get(idx).map(|g| (key, g)))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Summary {
    pub total_peers: u64,
    pub total_messages: u64,
    pub peers_with_ip: u64,
    pub peers_tor_only: u64,
    pub total_timing_rows: u64,
    pub collection_duration_hours: Option<f64>,
    pub msg_type_counts: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub peers: BTreeMap<String, Peer>,
    pub messages: Vec<Message>,
    pub wavefronts: BTreeMap<String, Wavefront>,
    pub communities: BTreeMap<String, Community>,
    pub leaks: Leaks,
    pub fingerprints: Fingerprints,
    pub summary: Summary,
}

impl Dataset {
    pub fn peer(&self, pubkey: &str) -> Option<&Peer> {
        self.peers.get(pubkey)
    }

    pub fn message(&self, hash: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.hash == hash)
    }

    pub fn wavefront(&self, hash: &str) -> Option<&Wavefront> {
        self.wavefronts.get(hash)
    }

    /// Best-effort label for any referenced key, resolved or not.
    pub fn display_label(&self, pubkey: &str) -> String {
        match self.peers.get(pubkey) {
            Some(peer) => peer.display_label(),
            None => truncated_pubkey(pubkey),
        }
    }

    pub fn community(&self, id: &str) -> Option<&Community> {
        self.communities.get(id)
    }

    pub fn community_color(&self, id: &str) -> &str {
        self.communities
            .get(id)
            .or_else(|| self.communities.get(UNKNOWN_COMMUNITY))
            .map(|c| c.color.as_str())
            .unwrap_or(UNKNOWN_COMMUNITY_COLOR)
    }
}
