use std::collections::{BTreeMap, BTreeSet};
use std::f64::consts::TAU;

use rand::{Rng, RngCore};

use crate::config::{CanvasSize, ReplayPolicy};
use crate::layout::compute_layout;
use crate::model::{Arrival, Dataset, FingerprintGroup, Fingerprints, Peer, Wavefront};
use crate::replay::{ReplayEngine, TickOutcome};
use crate::risk::{concentration, Dimension};
use crate::threats::{assess, FeatureMode, ThreatCatalog};

const TRIALS: u64 = 64;
const COMMUNITIES: [&str; 6] = ["amsterdam", "berlin", "chicago", "denver", "unknown", "zurich"];
const FEATURES: [&str; 6] = [
    "anchor_outputs",
    "data_loss_protect",
    "payment_secret",
    "route_blinding",
    "scid_alias",
    "zero_conf",
];

#[derive(Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_splitmix(&mut self) -> u64 {
        let mut z = self.state.wrapping_add(0x9E3779B97F4A7C15);
        self.state = z;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
        z ^ (z >> 31)
    }
}

impl RngCore for DeterministicRng {
    fn next_u32(&mut self) -> u32 {
        self.next_splitmix() as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.next_splitmix()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        let mut i = 0;
        while i < dest.len() {
            let value = self.next_u64().to_be_bytes();
            let take = (dest.len() - i).min(value.len());
            dest[i..i + take].copy_from_slice(&value[..take]);
            i += take;
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

/// Arrival percentiles are drawn on a 1/1000 grid so distinct values stay
/// distinct after scaling.
fn random_peers(rng: &mut DeterministicRng) -> Vec<Peer> {
    let count = rng.gen_range(1..=120);
    let communities = rng.gen_range(1..=COMMUNITIES.len());
    (0..count)
        .map(|i| {
            let mut peer = Peer::new(format!("{:016x}{:04}", rng.next_u64(), i));
            peer.community = COMMUNITIES[rng.gen_range(0..communities)].to_string();
            peer.stats.avg_arrival_pct = rng.gen_range(0..1000) as f64 / 1000.0;
            peer
        })
        .collect()
}

fn random_canvas(rng: &mut DeterministicRng) -> CanvasSize {
    CanvasSize {
        width: rng.gen_range(200..=2400) as f64,
        height: rng.gen_range(200..=1600) as f64,
    }
}

#[test]
fn layout_is_deterministic_and_order_independent() {
    let mut rng = DeterministicRng::new(0x1A70);
    for _ in 0..TRIALS {
        let peers = random_peers(&mut rng);
        let canvas = random_canvas(&mut rng);

        let first = compute_layout(peers.iter(), canvas);
        let second = compute_layout(peers.iter(), canvas);
        let reversed = compute_layout(peers.iter().rev(), canvas);

        assert_eq!(first, second);
        assert_eq!(first, reversed);
        assert_eq!(first.len(), peers.len());
    }
}

#[test]
fn sectors_tile_the_full_circle() {
    let mut rng = DeterministicRng::new(0x5EC7);
    for _ in 0..TRIALS {
        let peers = random_peers(&mut rng);
        let layout = compute_layout(peers.iter(), random_canvas(&mut rng));

        let covered: f64 = layout.sectors.iter().map(|s| s.span).sum();
        assert!((covered - TAU).abs() < 1e-9, "sectors cover {covered}, expected {TAU}");
        let placed: usize = layout.sectors.iter().map(|s| s.peer_count).sum();
        assert_eq!(placed, peers.len());
        for s in &layout.sectors {
            assert!(s.gap <= s.span);
        }
    }
}

#[test]
fn faster_peers_sit_closer_to_the_center() {
    let mut rng = DeterministicRng::new(0xCE47);
    for _ in 0..TRIALS {
        let peers = random_peers(&mut rng);
        let layout = compute_layout(peers.iter(), random_canvas(&mut rng));

        let mut by_community: BTreeMap<&str, Vec<(f64, f64)>> = BTreeMap::new();
        for peer in &peers {
            let radius = layout.position(&peer.pubkey).map(|p| p.radius).unwrap();
            by_community
                .entry(peer.community.as_str())
                .or_default()
                .push((peer.stats.avg_arrival_pct, radius));
        }
        for members in by_community.values() {
            for (p1, r1) in members {
                for (p2, r2) in members {
                    if p1 < p2 {
                        assert!(r1 < r2, "pct {p1} -> {r1} vs pct {p2} -> {r2}");
                    }
                }
            }
        }
    }
}

#[test]
fn lit_set_only_grows_during_playback() {
    let mut rng = DeterministicRng::new(0x11_7E);
    let policy = ReplayPolicy::default();
    for _ in 0..TRIALS {
        let peers: usize = rng.gen_range(1..=40);
        let mut arrivals: Vec<Arrival> = (0..peers)
            .map(|i| Arrival {
                peer: format!("p{:03}", i),
                delay_ms: rng.gen_range(0..5_000) as f64,
            })
            .collect();
        arrivals.sort_by(|a, b| a.delay_ms.total_cmp(&b.delay_ms));
        let base = arrivals[0].delay_ms;
        for a in &mut arrivals {
            a.delay_ms -= base;
        }

        let mut ds = Dataset::default();
        for a in &arrivals {
            ds.peers.insert(a.peer.clone(), Peer::new(a.peer.as_str()));
        }
        ds.wavefronts.insert("h".to_string(), Wavefront { arrivals });

        let mut engine = ReplayEngine::new(&policy);
        engine.select_message(&ds, "h").unwrap();
        let token = engine.play(0.0).unwrap();

        let mut now = 0.0;
        let mut previous: BTreeSet<String> = BTreeSet::new();
        loop {
            now += rng.gen_range(1..400) as f64;
            match engine.tick(token, now) {
                TickOutcome::Frame(frame) => {
                    let lit = frame.lit_set();
                    assert!(lit.is_superset(&previous));
                    previous = lit;
                }
                TickOutcome::Completed(frame) => {
                    let lit = frame.lit_set();
                    assert!(lit.is_superset(&previous));
                    assert_eq!(lit.len(), peers);
                    break;
                }
                TickOutcome::Stale => panic!("armed clock produced a stale tick"),
            }
        }
    }
}

#[test]
fn hhi_stays_within_bounds() {
    let mut rng = DeterministicRng::new(0x4411);
    for _ in 0..TRIALS {
        let groups = rng.gen_range(1..=20);
        let labels: Vec<String> = (0..groups)
            .flat_map(|g| {
                let n = rng.gen_range(1..=50);
                std::iter::repeat(format!("AS{}", g)).take(n)
            })
            .collect();

        let c = concentration(Dimension::AutonomousSystem, labels);
        let n = c.groups.len() as f64;
        assert!(c.hhi >= 1.0 / n - 1e-12, "hhi {} below 1/{}", c.hhi, n);
        assert!(c.hhi <= 1.0 + 1e-12);
        if c.groups.len() == 1 {
            assert_eq!(c.hhi, 1.0);
        }
    }
}

#[test]
fn every_fingerprinted_peer_is_judged_by_every_threat() {
    let mut rng = DeterministicRng::new(0x7E4A);
    let catalog = ThreatCatalog::new();
    for _ in 0..TRIALS {
        let mut fingerprints = Fingerprints::default();
        let groups = rng.gen_range(1..=8);
        for g in 0..groups {
            let feature_names = if rng.gen_bool(0.25) {
                None
            } else {
                Some(
                    FEATURES
                        .iter()
                        .filter(|_| rng.gen_bool(0.5))
                        .map(|f| f.to_string())
                        .collect(),
                )
            };
            let members: Vec<String> = (0..rng.gen_range(1..=5)).map(|m| format!("g{}m{}", g, m)).collect();
            for key in &members {
                fingerprints.by_peer.insert(key.clone(), fingerprints.groups.len());
            }
            fingerprints.groups.push(FingerprintGroup {
                features_hex: format!("{:x}", g),
                feature_names,
                node_count: members.len(),
                members,
            });
        }

        for exposure in assess(&catalog, &fingerprints) {
            let affected: BTreeSet<&String> = exposure.affected.iter().collect();
            for (key, group) in fingerprints.fingerprinted_peers() {
                let expected = match exposure.threat.mode {
                    FeatureMode::Present => group.has_feature(&exposure.threat.feature),
                    FeatureMode::Absent => !group.has_feature(&exposure.threat.feature),
                };
                assert_eq!(affected.contains(key), expected, "{} / {}", exposure.threat.id, key);
            }
        }
    }
}
