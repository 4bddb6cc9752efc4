//! Centralization risk derived from the peer and fingerprint records.
//! Everything here is a pure function of the `Dataset` and is recomputed
//! on every load.

use std::collections::BTreeMap;

use crate::model::{Dataset, Peer, UNKNOWN_LABEL};
use crate::threats::{assess, ThreatCatalog, ThreatExposure};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    AutonomousSystem,
    Isp,
    Country,
}

impl Dimension {
    pub fn label_of(self, peer: &Peer) -> String {
        let label = match self {
            Dimension::AutonomousSystem => peer.operator.as_label.as_deref(),
            Dimension::Isp => peer.operator.isp.as_deref(),
            Dimension::Country => peer.geo.country.as_deref(),
        };
        label.unwrap_or(UNKNOWN_LABEL).to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupShare {
    pub label: String,
    pub count: usize,
    pub pct: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Concentration {
    pub dimension: Dimension,
    pub total: usize,
    /// Largest first, ties by label.
    pub groups: Vec<GroupShare>,
    pub top3_pct: f64,
    pub top5_pct: f64,
    pub top10_pct: f64,
    /// Sum of squared shares; 0 for an empty population.
    pub hhi: f64,
}

impl Concentration {
    pub fn top_k_pct(&self, k: usize) -> f64 {
        self.groups.iter().take(k).map(|g| g.pct).sum()
    }

    pub fn largest(&self) -> Option<&GroupShare> {
        self.groups.first()
    }
}

fn pct_of(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 * 100.0 / total as f64
    }
}

/// Groups labels and computes shares, top-K and HHI.
pub fn concentration<I>(dimension: Dimension, labels: I) -> Concentration
where
    I: IntoIterator<Item = String>,
{
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for label in labels {
        *counts.entry(label).or_insert(0) += 1;
    }
    let total: usize = counts.values().sum();

    let mut groups: Vec<GroupShare> = counts
        .into_iter()
        .map(|(label, count)| GroupShare {
            pct: pct_of(count, total),
            label,
            count,
        })
        .collect();
    groups.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));

    let hhi = if total == 0 {
        0.0
    } else {
        groups
            .iter()
            .map(|g| {
                let share = g.count as f64 / total as f64;
                share * share
            })
            .sum()
    };

    let mut c = Concentration {
        dimension,
        total,
        groups,
        top3_pct: 0.0,
        top5_pct: 0.0,
        top10_pct: 0.0,
        hhi,
    };
    c.top3_pct = c.top_k_pct(3);
    c.top5_pct = c.top_k_pct(5);
    c.top10_pct = c.top_k_pct(10);
    c
}

#[derive(Debug, Clone, PartialEq)]
pub struct Provider {
    pub name: String,
    /// Lowercase substrings matched against AS labels.
    pub tokens: Vec<String>,
}

pub struct ProviderCatalog {
    pub providers: Vec<Provider>,
}

impl Default for ProviderCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderCatalog {
    pub fn new() -> Self {
        let provider = |name: &str, tokens: &[&str]| Provider {
            name: name.to_string(),
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
        };
        Self {
            providers: vec![
                provider("Amazon", &["amazon"]),
                provider("Google", &["google"]),
                provider("Microsoft", &["microsoft"]),
                provider("Hetzner", &["hetzner"]),
                provider("OVH", &["ovh"]),
                provider("DigitalOcean", &["digitalocean"]),
                provider("Linode/Akamai", &["linode", "akamai"]),
                provider("Contabo", &["contabo"]),
                provider("Cloudflare", &["cloudflare"]),
            ],
        }
    }

    pub fn matching(&self, as_label: &str) -> Option<&Provider> {
        let lowered = as_label.to_lowercase();
        self.providers
            .iter()
            .find(|p| p.tokens.iter().any(|t| lowered.contains(t.as_str())))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderFootprint {
    pub name: String,
    pub peers: usize,
    pub pct: f64,
    /// Distinct AS labels folded into this provider.
    pub as_labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperatorCluster {
    pub as_label: String,
    pub features_hex: String,
    pub members: Vec<String>,
}

impl OperatorCluster {
    pub fn count(&self) -> usize {
        self.members.len()
    }
}

pub const MIN_OPERATOR_CLUSTER: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct SinglePointOfFailure {
    pub as_label: String,
    pub peers: usize,
    /// Fraction of clearnet peers, in [0, 1].
    pub fraction: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RiskReport {
    pub total_peers: usize,
    pub clearnet_peers: usize,
    pub tor_only_peers: usize,
    pub by_as: Concentration,
    pub by_isp: Concentration,
    pub by_country: Concentration,
    pub providers: Vec<ProviderFootprint>,
    pub operator_clusters: Vec<OperatorCluster>,
    pub spof: Option<SinglePointOfFailure>,
    pub threats: Vec<ThreatExposure>,
    pub fingerprinted_peers: usize,
}

fn clearnet(dataset: &Dataset) -> Vec<&Peer> {
    dataset.peers.values().filter(|p| p.is_clearnet()).collect()
}

pub fn provider_footprints(peers: &[&Peer], catalog: &ProviderCatalog) -> Vec<ProviderFootprint> {
    let mut by_provider: BTreeMap<&str, (usize, Vec<String>)> = BTreeMap::new();
    for peer in peers {
        let Some(label) = peer.operator.as_label.as_deref() else {
            continue;
        };
        if let Some(provider) = catalog.matching(label) {
            let entry = by_provider.entry(provider.name.as_str()).or_default();
            entry.0 += 1;
            if !entry.1.iter().any(|l| l == label) {
                entry.1.push(label.to_string());
            }
        }
    }

    let total = peers.len();
    let mut footprints: Vec<ProviderFootprint> = by_provider
        .into_iter()
        .map(|(name, (count, mut as_labels))| {
            as_labels.sort();
            ProviderFootprint {
                name: name.to_string(),
                peers: count,
                pct: pct_of(count, total),
                as_labels,
            }
        })
        .collect();
    footprints.sort_by(|a, b| b.peers.cmp(&a.peers).then_with(|| a.name.cmp(&b.name)));
    footprints
}

/// Clearnet peers sharing both an AS and an exact feature vector. Peers
/// missing either half of the key are not clustered.
pub fn operator_clusters(peers: &[&Peer], dataset: &Dataset) -> Vec<OperatorCluster> {
    let mut groups: BTreeMap<(String, String), Vec<String>> = BTreeMap::new();
    for peer in peers {
        let Some(as_label) = peer.operator.as_label.as_ref() else {
            continue;
        };
        let Some(group) = dataset.fingerprints.group_of(&peer.pubkey) else {
            continue;
        };
        groups
            .entry((as_label.clone(), group.features_hex.clone()))
            .or_default()
            .push(peer.pubkey.clone());
    }

    let mut clusters: Vec<OperatorCluster> = groups
        .into_iter()
        .filter(|(_, members)| members.len() >= MIN_OPERATOR_CLUSTER)
        .map(|((as_label, features_hex), members)| OperatorCluster {
            as_label,
            features_hex,
            members,
        })
        .collect();
    clusters.sort_by(|a, b| {
        b.count()
            .cmp(&a.count())
            .then_with(|| a.as_label.cmp(&b.as_label))
            .then_with(|| a.features_hex.cmp(&b.features_hex))
    });
    clusters
}

pub fn single_point_of_failure(by_as: &Concentration) -> Option<SinglePointOfFailure> {
    let largest = by_as.largest()?;
    let fraction = if by_as.total == 0 {
        0.0
    } else {
        largest.count as f64 / by_as.total as f64
    };
    Some(SinglePointOfFailure {
        as_label: largest.label.clone(),
        peers: largest.count,
        fraction,
    })
}

pub fn analyze(dataset: &Dataset) -> RiskReport {
    let clearnet = clearnet(dataset);
    let by_as = concentration(
        Dimension::AutonomousSystem,
        clearnet.iter().map(|p| Dimension::AutonomousSystem.label_of(p)),
    );
    let by_isp = concentration(Dimension::Isp, clearnet.iter().map(|p| Dimension::Isp.label_of(p)));
    let by_country = concentration(
        Dimension::Country,
        clearnet.iter().map(|p| Dimension::Country.label_of(p)),
    );

    RiskReport {
        total_peers: dataset.peers.len(),
        clearnet_peers: clearnet.len(),
        tor_only_peers: dataset.peers.values().filter(|p| p.tor_only).count(),
        providers: provider_footprints(&clearnet, &ProviderCatalog::new()),
        operator_clusters: operator_clusters(&clearnet, dataset),
        spof: single_point_of_failure(&by_as),
        threats: assess(&ThreatCatalog::new(), &dataset.fingerprints),
        fingerprinted_peers: dataset.fingerprints.by_peer.len(),
        by_as,
        by_isp,
        by_country,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FingerprintGroup;

    fn labels(spec: &[(&str, usize)]) -> Vec<String> {
        spec.iter()
            .flat_map(|(label, n)| std::iter::repeat(label.to_string()).take(*n))
            .collect()
    }

    fn clearnet_peer(key: &str, as_label: Option<&str>) -> Peer {
        let mut p = Peer::new(key);
        p.ip = Some(format!("10.0.0.{}", key.len()));
        p.operator.as_label = as_label.map(String::from);
        p
    }

    #[test]
    fn hhi_for_sixty_thirty_ten() {
        let c = concentration(Dimension::AutonomousSystem, labels(&[("AS1", 60), ("AS2", 30), ("AS3", 10)]));
        assert!((c.hhi - 0.46).abs() < 1e-12);
        assert!((c.top3_pct - 100.0).abs() < 1e-9);
        assert_eq!(c.groups[0].label, "AS1");
        assert_eq!(c.total, 100);
    }

    #[test]
    fn single_group_is_fully_concentrated() {
        let c = concentration(Dimension::Country, labels(&[("DE", 7)]));
        assert_eq!(c.hhi, 1.0);
        assert_eq!(c.top10_pct, 100.0);
    }

    #[test]
    fn empty_population_reports_zero() {
        let c = concentration(Dimension::Isp, Vec::new());
        assert_eq!(c.hhi, 0.0);
        assert_eq!(c.top3_pct, 0.0);
        assert!(single_point_of_failure(&c).is_none());
    }

    #[test]
    fn provider_tokens_fold_multiple_as_numbers() {
        let peers = [
            clearnet_peer("a", Some("AS16509 Amazon.com, Inc.")),
            clearnet_peer("bb", Some("AS14618 AMAZON-AES")),
            clearnet_peer("ccc", Some("AS63949 Akamai Connected Cloud")),
            clearnet_peer("dddd", Some("AS3320 Deutsche Telekom")),
            clearnet_peer("eeeee", None),
        ];
        let refs: Vec<&Peer> = peers.iter().collect();
        let footprints = provider_footprints(&refs, &ProviderCatalog::new());
        assert_eq!(footprints[0].name, "Amazon");
        assert_eq!(footprints[0].peers, 2);
        assert_eq!(footprints[0].as_labels.len(), 2);
        assert_eq!(footprints[0].pct, 40.0);
        assert_eq!(footprints[1].name, "Linode/Akamai");
        assert_eq!(footprints.len(), 2);
    }

    #[test]
    fn operator_clusters_need_three_members() {
        let mut ds = Dataset::default();
        let keys = ["p1", "p2", "p3", "p4", "p5"];
        for (i, key) in keys.iter().enumerate() {
            let as_label = if i < 3 { "AS1 Hetzner" } else { "AS2 OVH" };
            let p = clearnet_peer(key, Some(as_label));
            ds.peers.insert(p.pubkey.clone(), p);
            ds.fingerprints.by_peer.insert(key.to_string(), 0);
        }
        ds.fingerprints.groups.push(FingerprintGroup {
            features_hex: "88a0".to_string(),
            feature_names: None,
            node_count: 5,
            members: keys.iter().map(|k| k.to_string()).collect(),
        });

        let report = analyze(&ds);
        assert_eq!(report.operator_clusters.len(), 1);
        assert_eq!(report.operator_clusters[0].as_label, "AS1 Hetzner");
        assert_eq!(report.operator_clusters[0].count(), 3);
    }

    #[test]
    fn spof_and_unknown_labels() {
        let mut ds = Dataset::default();
        for (key, label) in [("a", Some("AS1")), ("b", Some("AS1")), ("c", None), ("d", Some("AS2"))] {
            let p = clearnet_peer(key, label);
            ds.peers.insert(p.pubkey.clone(), p);
        }
        let mut tor = Peer::new("t");
        tor.tor_only = true;
        ds.peers.insert(tor.pubkey.clone(), tor);

        let report = analyze(&ds);
        assert_eq!(report.clearnet_peers, 4);
        assert_eq!(report.tor_only_peers, 1);
        assert!(report.by_as.groups.iter().any(|g| g.label == UNKNOWN_LABEL));
        let spof = report.spof.unwrap();
        assert_eq!(spof.as_label, "AS1");
        assert_eq!(spof.fraction, 0.5);
    }

    #[test]
    fn no_clearnet_peers_is_not_an_error() {
        let report = analyze(&Dataset::default());
        assert_eq!(report.clearnet_peers, 0);
        assert_eq!(report.by_as.hhi, 0.0);
        assert!(report.spof.is_none());
        assert!(report.threats.iter().all(|t| t.pct == 0.0));
    }
}
