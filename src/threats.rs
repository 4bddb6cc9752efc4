use crate::model::Fingerprints;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

/// Whether a threat applies to peers that advertise the feature or to
/// peers that lack it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureMode {
    Present,
    Absent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThreatDefinition {
    pub id: String,
    pub feature: String,
    pub mode: FeatureMode,
    pub severity: Severity,
    pub title: String,
    pub risk: String,
}

impl ThreatDefinition {
    fn new(id: &str, feature: &str, mode: FeatureMode, severity: Severity, title: &str, risk: &str) -> Self {
        Self {
            id: id.to_string(),
            feature: feature.to_string(),
            mode,
            severity,
            title: title.to_string(),
            risk: risk.to_string(),
        }
    }

    /// A missing feature-name list counts as "no features advertised".
    pub fn affects(&self, feature_names: Option<&[String]>) -> bool {
        let has = feature_names
            .map(|names| names.iter().any(|n| n == &self.feature))
            .unwrap_or(false);
        match self.mode {
            FeatureMode::Present => has,
            FeatureMode::Absent => !has,
        }
    }
}

pub struct ThreatCatalog {
    pub threats: Vec<ThreatDefinition>,
}

impl Default for ThreatCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreatCatalog {
    pub fn new() -> Self {
        use FeatureMode::{Absent, Present};
        use Severity::{Critical, High, Low, Medium};
        Self {
            threats: vec![
                // Channel funding
                ThreatDefinition::new(
                    "zero-conf-exposure",
                    "zero_conf",
                    Present,
                    High,
                    "Zero-conf channels accepted",
                    "Funding can be double-spent before confirmation",
                ),
                ThreatDefinition::new(
                    "dual-fund-utxo-probing",
                    "dual_fund",
                    Present,
                    Low,
                    "Dual-funded channel negotiation",
                    "Interactive funding reveals wallet UTXOs to probing peers",
                ),
                // Commitment format
                ThreatDefinition::new(
                    "no-anchor-outputs",
                    "anchor_outputs",
                    Absent,
                    High,
                    "No anchor outputs",
                    "Commitment fees cannot be bumped during fee spikes",
                ),
                ThreatDefinition::new(
                    "no-static-remote-key",
                    "static_remote_key",
                    Absent,
                    Medium,
                    "Rotating remote key",
                    "Funds on force close depend on peer cooperation to recover",
                ),
                ThreatDefinition::new(
                    "no-upfront-shutdown",
                    "upfront_shutdown_script",
                    Absent,
                    Low,
                    "No upfront shutdown script",
                    "A compromised key can redirect cooperative close outputs",
                ),
                // State recovery
                ThreatDefinition::new(
                    "no-data-loss-protect",
                    "data_loss_protect",
                    Absent,
                    Critical,
                    "No data loss protection",
                    "Restoring an old backup can broadcast a revoked state and lose all funds",
                ),
                // Privacy
                ThreatDefinition::new(
                    "no-route-blinding",
                    "route_blinding",
                    Absent,
                    Medium,
                    "No route blinding",
                    "Recipients cannot hide their position in the graph",
                ),
                ThreatDefinition::new(
                    "no-scid-alias",
                    "scid_alias",
                    Absent,
                    Low,
                    "No SCID aliases",
                    "Private channels leak their funding outpoint through the real SCID",
                ),
                ThreatDefinition::new(
                    "no-payment-secret",
                    "payment_secret",
                    Absent,
                    High,
                    "No payment secret",
                    "Intermediate nodes can probe and steal payments to this node",
                ),
            ],
        }
    }

    pub fn get(&self, id: &str) -> Option<&ThreatDefinition> {
        self.threats.iter().find(|t| t.id == id)
    }

    pub fn get_threats_for_feature(&self, feature: &str) -> Vec<&ThreatDefinition> {
        self.threats.iter().filter(|t| t.feature == feature).collect()
    }

    pub fn get_threats_at_least(&self, severity: Severity) -> Vec<&ThreatDefinition> {
        self.threats.iter().filter(|t| t.severity <= severity).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThreatExposure {
    pub threat: ThreatDefinition,
    pub affected: Vec<String>,
    /// Share of fingerprinted peers, 0 when none are fingerprinted.
    pub pct: f64,
}

impl ThreatExposure {
    pub fn count(&self) -> usize {
        self.affected.len()
    }
}

/// Evaluates every threat against every fingerprinted peer, ranked by
/// affected count, then severity, then id.
pub fn assess(catalog: &ThreatCatalog, fingerprints: &Fingerprints) -> Vec<ThreatExposure> {
    let peers: Vec<(&String, Option<&[String]>)> = fingerprints
        .fingerprinted_peers()
        .map(|(key, group)| (key, group.feature_names.as_deref()))
        .collect();
    let total = peers.len();

    let mut exposures: Vec<ThreatExposure> = catalog
        .threats
        .iter()
        .map(|threat| {
            let affected: Vec<String> = peers
                .iter()
                .filter(|(_, names)| threat.affects(*names))
                .map(|(key, _)| (*key).clone())
                .collect();
            let pct = if total == 0 {
                0.0
            } else {
                affected.len() as f64 / total as f64 * 100.0
            };
            ThreatExposure {
                threat: threat.clone(),
                affected,
                pct,
            }
        })
        .collect();

    exposures.sort_by(|a, b| {
        b.count()
            .cmp(&a.count())
            .then_with(|| a.threat.severity.cmp(&b.threat.severity))
            .then_with(|| a.threat.id.cmp(&b.threat.id))
    });
    exposures
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FingerprintGroup;
    use std::collections::BTreeMap;

    fn fingerprints(groups: Vec<(Option<Vec<&str>>, Vec<&str>)>) -> Fingerprints {
        let mut fp = Fingerprints::default();
        for (names, members) in groups {
            let idx = fp.groups.len();
            for m in &members {
                fp.by_peer.insert(m.to_string(), idx);
            }
            fp.groups.push(FingerprintGroup {
                features_hex: String::new(),
                feature_names: names.map(|n| n.into_iter().map(String::from).collect()),
                node_count: members.len(),
                members: members.into_iter().map(String::from).collect(),
            });
        }
        fp
    }

    #[test]
    fn catalog_ids_are_unique() {
        let catalog = ThreatCatalog::new();
        let mut ids: Vec<&str> = catalog.threats.iter().map(|t| t.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), catalog.threats.len());
        assert_eq!(catalog.get("no-data-loss-protect").unwrap().severity, Severity::Critical);
        assert_eq!(catalog.get_threats_for_feature("zero_conf").len(), 1);
        assert!(catalog.get_threats_at_least(Severity::High).len() >= 4);
    }

    #[test]
    fn present_and_absent_modes() {
        let catalog = ThreatCatalog::new();
        let zero_conf = catalog.get("zero-conf-exposure").unwrap();
        let anchors = catalog.get("no-anchor-outputs").unwrap();
        let names = vec!["zero_conf".to_string()];

        assert!(zero_conf.affects(Some(names.as_slice())));
        assert!(!zero_conf.affects(None));
        assert!(anchors.affects(Some(names.as_slice())));
        assert!(anchors.affects(None));
    }

    #[test]
    fn missing_name_list_still_decides_membership() {
        let fp = fingerprints(vec![(None, vec!["a", "b"])]);
        let exposures = assess(&ThreatCatalog::new(), &fp);
        for exposure in &exposures {
            match exposure.threat.mode {
                FeatureMode::Absent => assert_eq!(exposure.count(), 2),
                FeatureMode::Present => assert_eq!(exposure.count(), 0),
            }
        }
    }

    #[test]
    fn ranked_by_count_then_severity() {
        let fp = fingerprints(vec![
            (Some(vec!["anchor_outputs", "data_loss_protect", "zero_conf"]), vec!["a", "b", "c"]),
            (Some(vec!["data_loss_protect"]), vec!["d"]),
        ]);
        let exposures = assess(&ThreatCatalog::new(), &fp);
        let counts: Vec<usize> = exposures.iter().map(|e| e.count()).collect();
        assert!(counts.windows(2).all(|w| w[0] >= w[1]));

        let zero_conf = exposures.iter().find(|e| e.threat.id == "zero-conf-exposure").unwrap();
        assert_eq!(zero_conf.count(), 3);
        assert_eq!(zero_conf.pct, 75.0);

        // Every peer lacks payment_secret and three other features; severity breaks the tie.
        assert_eq!(exposures[0].count(), 4);
        assert_eq!(exposures[0].threat.severity, Severity::High);
        assert_eq!(exposures[0].threat.id, "no-payment-secret");
    }

    #[test]
    fn no_fingerprints_reports_zero_percent() {
        let exposures = assess(&ThreatCatalog::new(), &Fingerprints { by_peer: BTreeMap::new(), ..Fingerprints::default() });
        assert!(exposures.iter().all(|e| e.count() == 0 && e.pct == 0.0));
    }
}
