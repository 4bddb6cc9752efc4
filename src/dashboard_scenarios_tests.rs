use std::collections::BTreeSet;

use serde_json::json;

use crate::config::DashboardConfig;
use crate::loader::{MemoryFetcher, Resource};
use crate::model::{Arrival, Dataset, Message, MessageType, Peer, Wavefront};
use crate::replay::{ReplayState, TickOutcome};
use crate::risk::analyze;
use crate::session::DashboardSession;

fn two_peer_replay() -> Dataset {
    let mut ds = Dataset::default();
    for key in ["A", "B"] {
        ds.peers.insert(key.to_string(), Peer::new(key));
    }
    ds.wavefronts.insert(
        "h".to_string(),
        Wavefront {
            arrivals: vec![
                Arrival { peer: "A".to_string(), delay_ms: 0.0 },
                Arrival { peer: "B".to_string(), delay_ms: 500.0 },
            ],
        },
    );
    ds.messages.push(Message {
        hash: "h".to_string(),
        kind: MessageType::ChannelUpdate,
        peer_count: 2,
        time_spread_ms: 1000.0,
        size: None,
        orig_node: None,
        scid: None,
    });
    ds
}

fn lit(outcome: &TickOutcome) -> BTreeSet<String> {
    match outcome {
        TickOutcome::Frame(frame) | TickOutcome::Completed(frame) => frame.lit_set(),
        TickOutcome::Stale => panic!("unexpected stale tick"),
    }
}

fn keys(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[test]
fn wavefront_lights_in_order_and_stops_clamped() {
    let mut session = DashboardSession::from_dataset(two_peer_replay(), DashboardConfig::default());
    session.select_message("h").unwrap();
    let token = session.play(0.0).unwrap();

    let at_start = session.tick_with(token, 0.0);
    assert_eq!(lit(&at_start), keys(&["A"]));

    let halfway = session.tick_with(token, 500.0);
    assert_eq!(lit(&halfway), keys(&["A", "B"]));

    let end = session.tick_with(token, 1500.0);
    assert!(matches!(end, TickOutcome::Completed(_)));
    assert_eq!(lit(&end), keys(&["A", "B"]));
    assert_eq!(session.replay_state(), ReplayState::Completed);

    let frame = session.frame().unwrap();
    assert_eq!(frame.elapsed_ms, 1000.0);
    assert_eq!(frame.progress, 1.0);
    assert_eq!(session.tick_with(token, 2000.0), TickOutcome::Stale);
}

#[test]
fn as_concentration_of_sixty_thirty_ten() {
    let mut ds = Dataset::default();
    for (label, n) in [("AS1", 60), ("AS2", 30), ("AS3", 10)] {
        for i in 0..n {
            let key = format!("{}-{:02}", label, i);
            let mut peer = Peer::new(key.as_str());
            peer.ip = Some(format!("198.51.100.{}", i));
            peer.operator.as_label = Some(label.to_string());
            ds.peers.insert(key, peer);
        }
    }

    let report = analyze(&ds);
    assert_eq!(report.clearnet_peers, 100);
    assert!((report.by_as.hhi - 0.46).abs() < 1e-9);
    assert!((report.by_as.top3_pct - 100.0).abs() < 1e-9);
    let spof = report.spof.unwrap();
    assert_eq!(spof.as_label, "AS1");
    assert!((spof.fraction - 0.6).abs() < 1e-12);
}

fn snapshot_without_leaks() -> MemoryFetcher {
    MemoryFetcher::new()
        .with_json(
            Resource::Peers,
            &json!({
                "A": {"ip": "10.0.0.1", "lat": 52.5, "lon": 13.4, "community": "eu", "avg_arrival_pct": 0.2},
                "B": {"ip": "10.0.0.2", "lat": 37.8, "lon": -122.4, "community": "us", "avg_arrival_pct": 0.7}
            }),
        )
        .with_json(
            Resource::Wavefronts,
            &json!({"h": [{"peer": "A", "delay_ms": 0}, {"peer": "B", "delay_ms": 300}]}),
        )
        .with_json(Resource::Messages, &json!({"h": {"type": "node_announcement"}}))
        .with_json(Resource::Communities, &json!({}))
        .with_json(Resource::Summary, &json!({"total_peers": 2}))
        .with_json(Resource::Fingerprints, &json!({}))
}

#[tokio::test]
async fn leaks_outage_leaves_other_panels_working() {
    let mut session = DashboardSession::load_with(&snapshot_without_leaks(), DashboardConfig::default()).await;

    let report = session.load_report();
    assert!(report.degraded(Resource::Leaks));
    assert_eq!(report.failed_resources(), vec![Resource::Leaks]);

    assert_eq!(session.suspect_count(), 0);
    assert_eq!(session.colocation_count(), 0);
    assert!(session.suspect_cards().is_empty());
    assert!(session.colocation_chips().is_empty());

    assert_eq!(session.map_markers().len(), 2);
    session.select_message("h").unwrap();
    session.play(0.0).unwrap();
    let frame = session.tick(400.0).unwrap();
    assert_eq!(frame.lit_set(), keys(&["A", "B"]));
    assert_eq!(session.observability().resources_failed, 1);
}

fn symmetric_snapshot() -> MemoryFetcher {
    MemoryFetcher::new()
        .with_json(
            Resource::Peers,
            &json!({
                "X": {"alias": "target", "ip": "203.0.113.5", "lat": 1.0, "lon": 2.0, "community": "c1", "avg_arrival_pct": 0.1, "top5_pct": 50.0, "messages_seen": 20000},
                "Y": {"ip": "203.0.113.6", "lat": 3.0, "lon": 4.0, "community": "c1", "avg_arrival_pct": 0.8},
                "Z": {"is_tor": true, "community": "c2", "avg_arrival_pct": 0.5}
            }),
        )
        .with_json(Resource::Wavefronts, &json!({}))
        .with_json(Resource::Messages, &json!([]))
        .with_json(Resource::Communities, &json!({}))
        .with_json(
            Resource::Leaks,
            &json!({
                "first_responders": [{"pubkey": "X", "avg_arrival_pct": 0.1, "top5_pct": 50.0}],
                "colocation": [{"prefix": "203.0.113.0/24", "count": 2, "peers": ["X", "Y"]}]
            }),
        )
        .with_json(Resource::Summary, &json!({}))
        .with_json(Resource::Fingerprints, &json!({}))
}

fn highlight_snapshot(session: &DashboardSession) -> Vec<(String, bool)> {
    session
        .dataset()
        .peers
        .keys()
        .map(|k| (k.clone(), session.highlight().is_highlighted(k)))
        .collect()
}

#[tokio::test]
async fn every_panel_selects_the_same_peer_set() {
    let session = DashboardSession::load_with(&symmetric_snapshot(), DashboardConfig::default()).await;
    let pos = *session.layout().position("X").unwrap();

    let mut states = Vec::new();

    assert_eq!(session.click_canvas(pos.x, pos.y).as_deref(), Some("X"));
    states.push(highlight_snapshot(&session));
    session.clear_highlight();

    session.click_map_marker("X");
    states.push(highlight_snapshot(&session));
    session.clear_highlight();

    session.click_suspect("X");
    states.push(highlight_snapshot(&session));
    session.clear_highlight();

    session.click_colocation_member("X");
    states.push(highlight_snapshot(&session));

    let expected = vec![
        ("X".to_string(), true),
        ("Y".to_string(), false),
        ("Z".to_string(), false),
    ];
    for state in &states {
        assert_eq!(state, &expected);
    }
    assert_eq!(session.observability().highlight_changes, 7);
}

#[tokio::test]
async fn selection_replaces_rather_than_accumulates() {
    let session = DashboardSession::load_with(&symmetric_snapshot(), DashboardConfig::default()).await;
    session.click_colocation_group("203.0.113.0/24");
    assert_eq!(session.highlight().highlighted(), keys(&["X", "Y"]));

    session.click_suspect("X");
    assert_eq!(session.highlight().highlighted(), keys(&["X"]));
}
