use std::error::Error;
use std::time::Duration;

use gossip_tomography::config::DashboardConfig;
use gossip_tomography::logging;
use gossip_tomography::messages::MessageFilter;
use gossip_tomography::presentation::{ColocationChip, ListSurface, SuspectCard};
use gossip_tomography::replay::ReplayState;
use gossip_tomography::replay_driver::{MonotonicClock, ReplayCommand};
use gossip_tomography::session::DashboardSession;
use tracing::{info, warn};

const LISTED_ROWS: usize = 10;
const REPLAY_GRACE: Duration = Duration::from_secs(5);

/// Prints the leak panels to stdout.
struct ConsoleLists;

impl ListSurface for ConsoleLists {
    fn show_suspects(&mut self, cards: &[SuspectCard]) {
        println!("First responders: {}", cards.len());
        for card in cards.iter().take(LISTED_ROWS) {
            println!(
                "  {:<24} {:<10} avg {:.3}  top5 {:.1}%{}",
                card.label,
                card.community,
                card.avg_arrival_pct,
                card.top5_pct,
                if card.tor_only { "  (tor)" } else { "" }
            );
        }
    }

    fn show_colocation(&mut self, chips: &[ColocationChip]) {
        println!("Co-located prefixes: {}", chips.len());
        for chip in chips.iter().take(LISTED_ROWS) {
            let labels: Vec<&str> = chip.members.iter().map(|m| m.label.as_str()).collect();
            println!("  {:<18} {:>3}  {}", chip.prefix, chip.count, labels.join(", "));
        }
    }
}

fn print_summary(session: &DashboardSession) {
    let dataset = session.dataset();
    let risk = session.risk_summary();

    println!("Gossip tomography snapshot");
    println!(
        "  peers {}  messages {}  communities {}",
        dataset.peers.len(),
        dataset.messages.len(),
        dataset.communities.len()
    );
    println!(
        "  clearnet {}  tor-only {}  fingerprinted {}",
        risk.clearnet_peers, risk.tor_only_peers, risk.fingerprinted_peers
    );
    for failed in session.load_report().failed_resources() {
        println!("  degraded: {}", failed.file_name());
    }

    println!("Autonomous systems: HHI {:.3}  top3 {:.1}%", risk.by_as.hhi, risk.by_as.top3_pct);
    if let Some(spof) = &risk.spof {
        println!(
            "  largest: {} ({} peers, {:.1}%)",
            spof.as_label,
            spof.peers,
            spof.fraction * 100.0
        );
    }
    for provider in &risk.providers {
        println!("  {:<16} {:>5} peers {:>5.1}%", provider.name, provider.peers, provider.pct);
    }
    for exposure in risk.threats.iter().filter(|t| t.count() > 0) {
        println!(
            "  [{:?}] {}: {} peers ({:.1}%)",
            exposure.threat.severity,
            exposure.threat.title,
            exposure.count(),
            exposure.pct
        );
    }

    let top = MessageFilter {
        limit: Some(5),
        ..MessageFilter::default()
    };
    println!("Most propagated messages:");
    for message in session.messages(&top) {
        println!(
            "  {}  {:<18} {:>5} peers  {:>8.0} ms",
            message.hash,
            message.kind.as_str(),
            message.peer_count,
            message.time_spread_ms
        );
    }
}

async fn replay(session: &mut DashboardSession, hash: &str) {
    let dataset = session.dataset();
    let spread_ms = match (dataset.message(hash), dataset.wavefront(hash)) {
        (Some(message), _) => message.time_spread_ms,
        (None, Some(wavefront)) => wavefront.spread_ms(),
        (None, None) => {
            warn!(hash = hash, "no such message in the snapshot");
            return;
        }
    };
    let policy = &session.config().replay;
    let Some(budget) = policy.playback_budget(spread_ms, REPLAY_GRACE) else {
        warn!(speed = policy.speed, "replay speed must be positive to play");
        return;
    };

    let handle = session.spawn_replay(MonotonicClock::new());
    let mut state = handle.state();
    if handle.send(ReplayCommand::Select(hash.to_string())).await && handle.send(ReplayCommand::Play).await {
        let finished = tokio::time::timeout(budget, async {
            while *state.borrow_and_update() != ReplayState::Completed {
                if state.changed().await.is_err() {
                    break;
                }
            }
        })
        .await;
        if finished.is_err() {
            warn!(hash = hash, "replay did not complete in time");
        }
    }

    if let Some(frame) = session.frame() {
        println!(
            "Replayed {}: {}/{} peers reached in {:.0} ms",
            frame.hash,
            frame.lit.len(),
            frame.total_peers,
            frame.elapsed_ms
        );
    }
    session.stop_replay_driver().await;
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = DashboardConfig::from_args(std::env::args().skip(1))?;
    logging::init(config.log_level);
    info!(source = ?config.source, "loading gossip snapshot");

    let replay_message = config.replay_message.clone();
    let mut session = DashboardSession::load(config).await;
    print_summary(&session);
    let mut lists = ConsoleLists;
    lists.show_suspects(&session.suspect_cards());
    lists.show_colocation(&session.colocation_chips());

    if let Some(hash) = replay_message {
        replay(&mut session, &hash).await;
    }
    Ok(())
}
