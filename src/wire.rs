//! serde shapes of the seven snapshot resources, including every alternate
//! layout the upstream exporters have produced. Nothing outside `normalize`
//! should touch these types.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WirePeer {
    pub alias: Option<String>,
    pub ip: Option<String>,
    pub is_tor: Option<bool>,
    pub community: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub isp: Option<String>,
    #[serde(alias = "as")]
    pub as_info: Option<String>,
    pub avg_arrival_pct: Option<f64>,
    pub median_arrival_pct: Option<f64>,
    pub top5_pct: Option<f64>,
    pub first_pct: Option<f64>,
    pub messages_seen: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireArrival {
    pub peer: String,
    pub delay_ms: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireWavefront {
    Bare(Vec<Value>),
    Envelope {
        #[serde(default)]
        arrivals: Vec<Value>,
        #[serde(default)]
        total_peers: Option<u64>,
        #[serde(default)]
        spread_ms: Option<f64>,
    },
}

impl WireWavefront {
    pub fn arrivals(&self) -> &[Value] {
        match self {
            WireWavefront::Bare(arrivals) => arrivals,
            WireWavefront::Envelope { arrivals, .. } => arrivals,
        }
    }
}

/// Message hashes arrive as strings in mappings but may be bare numbers in
/// array exports.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireKey {
    Text(String),
    Number(u64),
}

impl WireKey {
    pub fn into_string(self) -> String {
        match self {
            WireKey::Text(s) => s,
            WireKey::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WireMessage {
    pub hash: Option<WireKey>,
    #[serde(rename = "type")]
    pub kind: Option<Value>,
    pub type_id: Option<u64>,
    pub size: Option<u64>,
    pub orig_node: Option<String>,
    pub scid: Option<WireKey>,
    pub peer_count: Option<u64>,
    pub time_spread_ms: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireMessages {
    List(Vec<Value>),
    Index(BTreeMap<String, Value>),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WireCommunity {
    pub id: Option<String>,
    pub label: Option<String>,
    pub color: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireCommunities {
    List(Vec<Value>),
    Index(BTreeMap<String, Value>),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WireLeaks {
    pub first_responders: Vec<Value>,
    #[serde(alias = "colocation_suspects")]
    pub colocation: Vec<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WireFirstResponder {
    pub pubkey: Option<String>,
    pub alias: Option<String>,
    pub ip: Option<String>,
    pub is_tor: Option<bool>,
    pub community: Option<String>,
    pub avg_arrival_pct: Option<f64>,
    pub top5_pct: Option<f64>,
    pub first_pct: Option<f64>,
    pub messages_seen: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WireColocationPeer {
    pub pubkey: Option<String>,
    pub alias: Option<String>,
    pub ip: Option<String>,
    pub avg_arrival_pct: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireColocationEntry {
    Key(String),
    Detail(WireColocationPeer),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WireColocationGroup {
    pub prefix: Option<String>,
    pub count: Option<u64>,
    pub peers: Vec<WireColocationEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WireSummary {
    pub total_peers: Option<u64>,
    pub total_messages: Option<u64>,
    pub peers_with_ip: Option<u64>,
    pub peers_tor_only: Option<u64>,
    pub total_timing_rows: Option<u64>,
    pub collection_duration_hours: Option<f64>,
    pub msg_type_counts: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WireFingerprintGroup {
    pub features_hex: Option<String>,
    pub feature_names: Option<Vec<String>>,
    pub node_count: Option<u64>,
    pub all_nodes: Option<Vec<String>>,
    pub sample_nodes: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WireFingerprints {
    pub fingerprint_groups: Vec<Value>,
    pub total_nodes_parsed: Option<u64>,
    pub total_unique_fingerprints: Option<u64>,
    pub feature_prevalence: BTreeMap<String, u64>,
}
