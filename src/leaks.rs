//! Ranked suspect and co-location views over the leak records, plus the
//! opt-in re-derivation used when a snapshot ships without them.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use tracing::info;

use crate::config::LeakPolicy;
use crate::model::{ColocationGroup, ColocationMember, Dataset, FirstResponder, Leaks};

pub const MIN_COLOCATION_GROUP: usize = 2;
pub const MAX_LISTED_MEMBERS: usize = 10;
pub const MAX_COLOCATION_GROUPS: usize = 50;
pub const FIRST_RESPONDER_TOP5_PCT: f64 = 30.0;
pub const FIRST_RESPONDER_MIN_MESSAGES: u64 = 10_000;

/// Fastest first; ties by top-5 share, then key.
pub fn ranked_suspects(leaks: &Leaks) -> Vec<&FirstResponder> {
    let mut suspects: Vec<&FirstResponder> = leaks.first_responders.iter().collect();
    suspects.sort_by(|a, b| {
        a.avg_arrival_pct
            .total_cmp(&b.avg_arrival_pct)
            .then_with(|| b.top5_pct.total_cmp(&a.top5_pct))
            .then_with(|| a.pubkey.cmp(&b.pubkey))
    });
    suspects
}

/// Largest first; ties by prefix.
pub fn ranked_colocation(leaks: &Leaks) -> Vec<&ColocationGroup> {
    let mut groups: Vec<&ColocationGroup> = leaks.colocation.iter().collect();
    groups.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.prefix.cmp(&b.prefix)));
    groups
}

/// `a.b.c.0/24` for an IPv4 address; `None` for anything else.
pub fn ipv4_prefix24(ip: &str) -> Option<String> {
    let addr: Ipv4Addr = ip.trim().parse().ok()?;
    let [a, b, c, _] = addr.octets();
    Some(format!("{}.{}.{}.0/24", a, b, c))
}

pub fn derive_colocation(dataset: &Dataset) -> Vec<ColocationGroup> {
    let mut by_prefix: BTreeMap<String, Vec<&str>> = BTreeMap::new();
    for peer in dataset.peers.values() {
        if let Some(prefix) = peer.ip.as_deref().and_then(ipv4_prefix24) {
            by_prefix.entry(prefix).or_default().push(peer.pubkey.as_str());
        }
    }

    let mut groups: Vec<ColocationGroup> = by_prefix
        .into_iter()
        .filter(|(_, keys)| keys.len() >= MIN_COLOCATION_GROUP)
        .map(|(prefix, keys)| ColocationGroup {
            prefix,
            count: keys.len(),
            members: keys
                .iter()
                .take(MAX_LISTED_MEMBERS)
                .filter_map(|k| dataset.peer(k))
                .map(|p| ColocationMember {
                    pubkey: p.pubkey.clone(),
                    alias: p.alias.clone(),
                    ip: p.ip.clone(),
                    avg_arrival_pct: Some(p.stats.avg_arrival_pct),
                })
                .collect(),
        })
        .collect();
    groups.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.prefix.cmp(&b.prefix)));
    groups.truncate(MAX_COLOCATION_GROUPS);
    groups
}

pub fn derive_first_responders(dataset: &Dataset) -> Vec<FirstResponder> {
    let mut responders: Vec<FirstResponder> = dataset
        .peers
        .values()
        .filter(|p| {
            p.stats.top5_pct > FIRST_RESPONDER_TOP5_PCT
                && p.stats.messages_seen > FIRST_RESPONDER_MIN_MESSAGES
        })
        .map(|p| FirstResponder {
            pubkey: p.pubkey.clone(),
            alias: p.alias.clone(),
            ip: p.ip.clone(),
            tor_only: p.tor_only,
            community: p.community.clone(),
            avg_arrival_pct: p.stats.avg_arrival_pct,
            top5_pct: p.stats.top5_pct,
            first_pct: p.stats.first_pct,
            messages_seen: p.stats.messages_seen,
        })
        .collect();
    responders.sort_by(|a, b| {
        a.avg_arrival_pct
            .total_cmp(&b.avg_arrival_pct)
            .then_with(|| a.pubkey.cmp(&b.pubkey))
    });
    responders
}

/// Fills in leaks from peer records when the policy allows it and the
/// snapshot carried none. Returns whether anything was derived.
pub fn apply_policy(dataset: &mut Dataset, policy: &LeakPolicy) -> bool {
    if !policy.derive_when_missing || !dataset.leaks.is_empty() {
        return false;
    }
    let leaks = Leaks {
        first_responders: derive_first_responders(dataset),
        colocation: derive_colocation(dataset),
    };
    info!(
        first_responders = leaks.first_responders.len(),
        colocation_groups = leaks.colocation.len(),
        "leak records derived from peer data"
    );
    dataset.leaks = leaks;
    true
}
