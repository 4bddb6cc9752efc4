//! Adapter from the heterogeneous wire shapes to the canonical `Dataset`.
//! Every record is decoded on its own: a malformed record is logged and
//! skipped, it never poisons the rest of its resource.

use std::collections::{BTreeMap, BTreeSet};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::core::observability::Observability;
use crate::model::{
    Arrival, ColocationGroup, ColocationMember, Community, Coordinates, Dataset, FingerprintGroup,
    Fingerprints, FirstResponder, GeoInfo, Leaks, Message, MessageType, NetworkOperator, Peer,
    PropagationStats, Summary, Wavefront, UNKNOWN_COMMUNITY, UNKNOWN_COMMUNITY_COLOR,
};
use crate::wire::{
    WireArrival, WireColocationEntry, WireColocationGroup, WireCommunities, WireCommunity,
    WireFingerprintGroup, WireFingerprints, WireFirstResponder, WireLeaks, WireMessage,
    WireMessages, WirePeer, WireSummary, WireWavefront,
};

/// Parsed JSON of each resource. A resource that failed to load is `Null`.
#[derive(Debug, Clone, Default)]
pub struct RawSnapshot {
    pub peers: Value,
    pub wavefronts: Value,
    pub messages: Value,
    pub communities: Value,
    pub leaks: Value,
    pub summary: Value,
    pub fingerprints: Value,
}

pub fn normalize(raw: &RawSnapshot, obs: &Observability) -> Dataset {
    let peers = normalize_peers(&raw.peers, obs);
    let wavefronts = normalize_wavefronts(&raw.wavefronts, &peers, obs);
    let messages = normalize_messages(&raw.messages, &wavefronts, obs);
    let communities = normalize_communities(&raw.communities, obs);
    let leaks = normalize_leaks(&raw.leaks, &peers, obs);
    let fingerprints = normalize_fingerprints(&raw.fingerprints, obs);
    let summary = normalize_summary(&raw.summary, obs);

    info!(
        peers = peers.len(),
        messages = messages.len(),
        wavefronts = wavefronts.len(),
        communities = communities.len(),
        first_responders = leaks.first_responders.len(),
        colocation_groups = leaks.colocation.len(),
        fingerprint_groups = fingerprints.groups.len(),
        "snapshot normalized"
    );

    Dataset {
        peers,
        messages,
        wavefronts,
        communities,
        leaks,
        fingerprints,
        summary,
    }
}

fn decode<T: DeserializeOwned>(value: &Value, what: &str, key: &str, obs: &Observability) -> Option<T> {
    match serde_json::from_value::<T>(value.clone()) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            warn!(record = what, key = key, error = %e, "skipping malformed record");
            obs.record_skipped_record();
            None
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

fn as_object<'a>(value: &'a Value, resource: &str) -> Option<&'a serde_json::Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map),
        Value::Null => None,
        other => {
            warn!(resource = resource, kind = json_kind(other), "expected a JSON object");
            None
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub fn normalize_peers(value: &Value, obs: &Observability) -> BTreeMap<String, Peer> {
    let mut peers = BTreeMap::new();
    let Some(map) = as_object(value, "peers") else {
        return peers;
    };

    for (pubkey, record) in map {
        if pubkey.trim().is_empty() {
            obs.record_skipped_record();
            continue;
        }
        let Some(wire) = decode::<WirePeer>(record, "peer", pubkey, obs) else {
            continue;
        };
        peers.insert(pubkey.clone(), peer_from_wire(pubkey, wire));
    }
    peers
}

fn peer_from_wire(pubkey: &str, wire: WirePeer) -> Peer {
    let coordinates = match (finite(wire.lat), finite(wire.lon)) {
        (Some(lat), Some(lon)) => Some(Coordinates { lat, lon }),
        _ => None,
    };
    let ip = non_empty(wire.ip);
    Peer {
        pubkey: pubkey.to_string(),
        alias: non_empty(wire.alias),
        tor_only: wire.is_tor.unwrap_or(false) && ip.is_none(),
        ip,
        geo: GeoInfo {
            coordinates,
            city: non_empty(wire.city),
            country: non_empty(wire.country),
        },
        operator: NetworkOperator {
            isp: non_empty(wire.isp),
            as_label: non_empty(wire.as_info),
        },
        community: non_empty(wire.community).unwrap_or_else(|| UNKNOWN_COMMUNITY.to_string()),
        stats: PropagationStats {
            avg_arrival_pct: finite(wire.avg_arrival_pct).unwrap_or(0.0),
            median_arrival_pct: finite(wire.median_arrival_pct).unwrap_or(0.0),
            top5_pct: finite(wire.top5_pct).unwrap_or(0.0),
            first_pct: finite(wire.first_pct).unwrap_or(0.0),
            messages_seen: wire.messages_seen.unwrap_or(0),
        },
    }
}

pub fn normalize_wavefronts(
    value: &Value,
    peers: &BTreeMap<String, Peer>,
    obs: &Observability,
) -> BTreeMap<String, Wavefront> {
    let mut wavefronts = BTreeMap::new();
    let Some(map) = as_object(value, "wavefronts") else {
        return wavefronts;
    };

    for (hash, record) in map {
        let Some(wire) = decode::<WireWavefront>(record, "wavefront", hash, obs) else {
            continue;
        };
        let wavefront = wavefront_from_wire(hash, &wire, obs);
        if let WireWavefront::Envelope { total_peers: Some(total), .. } = wire {
            if total as usize != wavefront.peer_count() {
                debug!(hash = %hash, declared = total, kept = wavefront.peer_count(), "wavefront peer count differs from declared total");
            }
        }
        for arrival in &wavefront.arrivals {
            if !peers.contains_key(&arrival.peer) {
                obs.record_unresolved_reference();
            }
        }
        wavefronts.insert(hash.clone(), wavefront);
    }
    wavefronts
}

fn wavefront_from_wire(hash: &str, wire: &WireWavefront, obs: &Observability) -> Wavefront {
    let mut earliest: BTreeMap<String, f64> = BTreeMap::new();
    for entry in wire.arrivals() {
        let Some(arrival) = decode::<WireArrival>(entry, "arrival", hash, obs) else {
            continue;
        };
        if arrival.peer.trim().is_empty() || !arrival.delay_ms.is_finite() {
            obs.record_skipped_record();
            continue;
        }
        let delay = arrival.delay_ms.max(0.0);
        earliest
            .entry(arrival.peer)
            .and_modify(|d| *d = d.min(delay))
            .or_insert(delay);
    }

    let mut arrivals: Vec<Arrival> = earliest
        .into_iter()
        .map(|(peer, delay_ms)| Arrival { peer, delay_ms })
        .collect();
    arrivals.sort_by(|a, b| {
        a.delay_ms
            .total_cmp(&b.delay_ms)
            .then_with(|| a.peer.cmp(&b.peer))
    });

    // Delays are relative to the observer's first reception.
    if let Some(base) = arrivals.first().map(|a| a.delay_ms) {
        if base > 0.0 {
            for arrival in &mut arrivals {
                arrival.delay_ms -= base;
            }
        }
    }

    Wavefront { arrivals }
}

fn message_kind(wire: &WireMessage) -> MessageType {
    match &wire.kind {
        Some(Value::String(name)) => {
            let parsed = MessageType::parse(name);
            if parsed == MessageType::Unknown {
                wire.type_id.map(MessageType::from_type_id).unwrap_or(parsed)
            } else {
                parsed
            }
        }
        Some(Value::Number(n)) => n
            .as_u64()
            .map(MessageType::from_type_id)
            .unwrap_or(MessageType::Unknown),
        _ => wire
            .type_id
            .map(MessageType::from_type_id)
            .unwrap_or(MessageType::Unknown),
    }
}

fn message_from_wire(hash: String, wire: WireMessage, wavefronts: &BTreeMap<String, Wavefront>) -> Message {
    let kind = message_kind(&wire);
    let (peer_count, time_spread_ms) = match wavefronts.get(&hash) {
        Some(wf) => (wf.peer_count(), wf.spread_ms()),
        None => (
            wire.peer_count.unwrap_or(0) as usize,
            finite(wire.time_spread_ms).unwrap_or(0.0).max(0.0),
        ),
    };
    Message {
        hash,
        kind,
        peer_count,
        time_spread_ms,
        size: wire.size,
        orig_node: non_empty(wire.orig_node),
        scid: wire.scid.map(|k| k.into_string()),
    }
}

pub fn normalize_messages(
    value: &Value,
    wavefronts: &BTreeMap<String, Wavefront>,
    obs: &Observability,
) -> Vec<Message> {
    let mut seen = BTreeSet::new();
    let mut messages = Vec::new();

    let entries: Vec<(Option<String>, Value)> = match value {
        Value::Null => Vec::new(),
        other => match serde_json::from_value::<WireMessages>(other.clone()) {
            Ok(WireMessages::List(items)) => items.into_iter().map(|v| (None, v)).collect(),
            Ok(WireMessages::Index(map)) => map.into_iter().map(|(k, v)| (Some(k), v)).collect(),
            Err(e) => {
                warn!(resource = "messages", error = %e, "expected an array or mapping of messages");
                Vec::new()
            }
        },
    };

    for (key, record) in entries {
        let label = key.clone().unwrap_or_default();
        let Some(mut wire) = decode::<WireMessage>(&record, "message", &label, obs) else {
            continue;
        };
        let hash = match key.or_else(|| wire.hash.take().map(|h| h.into_string())) {
            Some(hash) if !hash.trim().is_empty() => hash,
            _ => {
                warn!(record = "message", "message without a hash");
                obs.record_skipped_record();
                continue;
            }
        };
        if !seen.insert(hash.clone()) {
            continue;
        }
        messages.push(message_from_wire(hash, wire, wavefronts));
    }

    for hash in wavefronts.keys() {
        if seen.insert(hash.clone()) {
            messages.push(message_from_wire(hash.clone(), WireMessage::default(), wavefronts));
        }
    }

    messages.sort_by(|a, b| b.peer_count.cmp(&a.peer_count).then_with(|| a.hash.cmp(&b.hash)));
    messages
}

fn community_from_wire(id: String, wire: WireCommunity) -> Community {
    Community {
        label: non_empty(wire.label).unwrap_or_else(|| id.clone()),
        color: non_empty(wire.color).unwrap_or_else(|| UNKNOWN_COMMUNITY_COLOR.to_string()),
        description: non_empty(wire.description),
        id,
    }
}

pub fn normalize_communities(value: &Value, obs: &Observability) -> BTreeMap<String, Community> {
    let mut communities = BTreeMap::new();

    let parsed = match value {
        Value::Null => None,
        other => match serde_json::from_value::<WireCommunities>(other.clone()) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!(resource = "communities", error = %e, "expected an array or mapping of communities");
                None
            }
        },
    };

    match parsed {
        Some(WireCommunities::Index(map)) => {
            for (id, record) in map {
                if let Some(wire) = decode::<WireCommunity>(&record, "community", &id, obs) {
                    communities.insert(id.clone(), community_from_wire(id, wire));
                }
            }
        }
        Some(WireCommunities::List(items)) => {
            for record in items {
                let Some(mut wire) = decode::<WireCommunity>(&record, "community", "", obs) else {
                    continue;
                };
                match non_empty(wire.id.take()) {
                    Some(id) => {
                        communities.insert(id.clone(), community_from_wire(id, wire));
                    }
                    None => {
                        warn!(record = "community", "community without an id");
                        obs.record_skipped_record();
                    }
                }
            }
        }
        None => {}
    }

    communities
        .entry(UNKNOWN_COMMUNITY.to_string())
        .or_insert_with(Community::unknown);
    communities
}

pub fn normalize_leaks(value: &Value, peers: &BTreeMap<String, Peer>, obs: &Observability) -> Leaks {
    let wire = match value {
        Value::Null => return Leaks::default(),
        other => match decode::<WireLeaks>(other, "leaks", "", obs) {
            Some(wire) => wire,
            None => return Leaks::default(),
        },
    };

    let mut first_responders = Vec::new();
    for record in &wire.first_responders {
        let Some(fr) = decode::<WireFirstResponder>(record, "first_responder", "", obs) else {
            continue;
        };
        let Some(pubkey) = non_empty(fr.pubkey) else {
            obs.record_skipped_record();
            continue;
        };
        let resolved = peers.get(&pubkey);
        if resolved.is_none() {
            obs.record_unresolved_reference();
        }
        first_responders.push(FirstResponder {
            alias: non_empty(fr.alias).or_else(|| resolved.and_then(|p| p.alias.clone())),
            ip: non_empty(fr.ip).or_else(|| resolved.and_then(|p| p.ip.clone())),
            tor_only: fr.is_tor.unwrap_or_else(|| resolved.map(|p| p.tor_only).unwrap_or(false)),
            community: non_empty(fr.community)
                .or_else(|| resolved.map(|p| p.community.clone()))
                .unwrap_or_else(|| UNKNOWN_COMMUNITY.to_string()),
            avg_arrival_pct: finite(fr.avg_arrival_pct)
                .or_else(|| resolved.map(|p| p.stats.avg_arrival_pct))
                .unwrap_or(0.0),
            top5_pct: finite(fr.top5_pct)
                .or_else(|| resolved.map(|p| p.stats.top5_pct))
                .unwrap_or(0.0),
            first_pct: finite(fr.first_pct)
                .or_else(|| resolved.map(|p| p.stats.first_pct))
                .unwrap_or(0.0),
            messages_seen: fr
                .messages_seen
                .or_else(|| resolved.map(|p| p.stats.messages_seen))
                .unwrap_or(0),
            pubkey,
        });
    }

    let mut colocation = Vec::new();
    for record in &wire.colocation {
        let Some(group) = decode::<WireColocationGroup>(record, "colocation", "", obs) else {
            continue;
        };
        let members: Vec<ColocationMember> = group
            .peers
            .into_iter()
            .filter_map(|entry| colocation_member(entry, peers, obs))
            .collect();
        colocation.push(ColocationGroup {
            prefix: non_empty(group.prefix).unwrap_or_else(|| "unknown".to_string()),
            count: group.count.map(|c| c as usize).unwrap_or(members.len()),
            members,
        });
    }

    Leaks {
        first_responders,
        colocation,
    }
}

fn colocation_member(
    entry: WireColocationEntry,
    peers: &BTreeMap<String, Peer>,
    obs: &Observability,
) -> Option<ColocationMember> {
    let (pubkey, alias, ip, avg) = match entry {
        WireColocationEntry::Key(key) => (non_empty(Some(key)), None, None, None),
        WireColocationEntry::Detail(d) => (
            non_empty(d.pubkey),
            non_empty(d.alias),
            non_empty(d.ip),
            finite(d.avg_arrival_pct),
        ),
    };
    let Some(pubkey) = pubkey else {
        obs.record_skipped_record();
        return None;
    };
    let resolved = peers.get(&pubkey);
    if resolved.is_none() {
        obs.record_unresolved_reference();
    }
    Some(ColocationMember {
        alias: alias.or_else(|| resolved.and_then(|p| p.alias.clone())),
        ip: ip.or_else(|| resolved.and_then(|p| p.ip.clone())),
        avg_arrival_pct: avg.or_else(|| resolved.map(|p| p.stats.avg_arrival_pct)),
        pubkey,
    })
}

pub fn normalize_fingerprints(value: &Value, obs: &Observability) -> Fingerprints {
    let wire = match value {
        Value::Null => return Fingerprints::default(),
        other => match decode::<WireFingerprints>(other, "fingerprints", "", obs) {
            Some(wire) => wire,
            None => return Fingerprints::default(),
        },
    };

    let mut groups = Vec::new();
    let mut by_peer = BTreeMap::new();
    for record in &wire.fingerprint_groups {
        let Some(group) = decode::<WireFingerprintGroup>(record, "fingerprint_group", "", obs) else {
            continue;
        };
        let members: Vec<String> = group
            .all_nodes
            .or(group.sample_nodes)
            .unwrap_or_default()
            .into_iter()
            .filter(|k| !k.trim().is_empty())
            .collect();
        let idx = groups.len();
        for member in &members {
            by_peer.entry(member.clone()).or_insert(idx);
        }
        groups.push(FingerprintGroup {
            features_hex: group.features_hex.unwrap_or_default().trim().to_ascii_lowercase(),
            feature_names: group.feature_names,
            node_count: group.node_count.map(|c| c as usize).unwrap_or(members.len()),
            members,
        });
    }

    Fingerprints {
        total_unique_fingerprints: wire.total_unique_fingerprints.unwrap_or(groups.len() as u64),
        total_nodes_parsed: wire.total_nodes_parsed.unwrap_or(by_peer.len() as u64),
        feature_prevalence: wire.feature_prevalence,
        groups,
        by_peer,
    }
}

pub fn normalize_summary(value: &Value, obs: &Observability) -> Summary {
    let wire = match value {
        Value::Null => return Summary::default(),
        other => decode::<WireSummary>(other, "summary", "", obs).unwrap_or_default(),
    };
    Summary {
        total_peers: wire.total_peers.unwrap_or(0),
        total_messages: wire.total_messages.unwrap_or(0),
        peers_with_ip: wire.peers_with_ip.unwrap_or(0),
        peers_tor_only: wire.peers_tor_only.unwrap_or(0),
        total_timing_rows: wire.total_timing_rows.unwrap_or(0),
        collection_duration_hours: finite(wire.collection_duration_hours),
        msg_type_counts: wire.msg_type_counts,
    }
}
