use std::sync::Arc;

use tracing::{debug, info};

use crate::config::DashboardConfig;
use crate::core::observability::{ErrorClass, Observability, ObservabilitySnapshot};
use crate::error::DashboardError;
use crate::features::{decode_features_hex, feature_names, DecodedFeature, FeatureDecodeError};
use crate::highlight::{GeoFocus, HighlightSync, SelectionOrigin};
use crate::layout::{compute_layout, Layout};
use crate::leaks;
use crate::loader::{load_dataset, load_from_source, LoadReport, ResourceFetcher};
use crate::messages::{list_messages, MessageFilter};
use crate::model::{Dataset, Message};
use crate::presentation::{
    canvas_glyphs, colocation_chips, map_markers, suspect_cards, CanvasSurface, ColocationChip, ListSurface,
    MapMarker, MapSurface, PeerGlyph, SuspectCard,
};
use crate::replay::{ClockToken, ReplayEngine, ReplayFrame, ReplayState, TickOutcome};
use crate::replay_driver::{spawn_replay, FrameClock, ReplayHandle};
use crate::risk::{analyze, RiskReport};
use crate::threats::ThreatCatalog;

/// Canvas clicks within this many pixels of a peer select it.
pub const CANVAS_HIT_TOLERANCE: f64 = 8.0;

/// Fingerprint drill-down for one peer.
#[derive(Debug, Clone, PartialEq)]
pub struct FingerprintDetail {
    pub pubkey: String,
    pub features_hex: String,
    pub feature_names: Vec<String>,
    pub decoded: Result<Vec<DecodedFeature>, FeatureDecodeError>,
    pub group_size: usize,
    pub threat_ids: Vec<String>,
}

/// Everything one dashboard instance needs. Independent sessions share
/// nothing, so tests and embedders can run several side by side.
///
/// Replay has one clock at a time: either the caller ticks the session's
/// engine, or a spawned driver task owns playback. Attaching a driver clears
/// the caller-driven engine, and caller-driven `select_message`/`play` stop
/// the driver.
pub struct DashboardSession {
    config: DashboardConfig,
    dataset: Arc<Dataset>,
    layout: Layout,
    replay: ReplayEngine,
    driver: Option<ReplayHandle>,
    highlight: HighlightSync,
    obs: Arc<Observability>,
    risk: RiskReport,
    load_report: LoadReport,
}

impl DashboardSession {
    pub async fn load(config: DashboardConfig) -> Self {
        let obs = Observability::new();
        let (dataset, report) = load_from_source(&config.source, &config.fetch, &obs).await;
        Self::assemble(dataset, report, obs, config)
    }

    pub async fn load_with<F: ResourceFetcher>(fetcher: &F, config: DashboardConfig) -> Self {
        let obs = Observability::new();
        let (dataset, report) = load_dataset(fetcher, &obs).await;
        Self::assemble(dataset, report, obs, config)
    }

    pub fn from_dataset(dataset: Dataset, config: DashboardConfig) -> Self {
        Self::assemble(dataset, LoadReport::default(), Observability::new(), config)
    }

    fn assemble(mut dataset: Dataset, load_report: LoadReport, obs: Observability, config: DashboardConfig) -> Self {
        leaks::apply_policy(&mut dataset, &config.leaks);
        let layout = compute_layout(dataset.peers.values(), config.canvas);
        let risk = analyze(&dataset);
        if !dataset.peers.is_empty() && risk.clearnet_peers == 0 {
            debug!("no clearnet peers, concentration shares reported as 0");
            obs.record_error(ErrorClass::DEGENERATE_COMPUTATION);
        }
        info!(
            peers = dataset.peers.len(),
            messages = dataset.messages.len(),
            clearnet = risk.clearnet_peers,
            degraded = !load_report.is_complete(),
            "dashboard session ready"
        );
        Self {
            replay: ReplayEngine::new(&config.replay),
            driver: None,
            highlight: HighlightSync::new(),
            dataset: Arc::new(dataset),
            obs: Arc::new(obs),
            layout,
            risk,
            load_report,
            config,
        }
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn highlight(&self) -> &HighlightSync {
        &self.highlight
    }

    pub fn load_report(&self) -> &LoadReport {
        &self.load_report
    }

    pub fn observability(&self) -> ObservabilitySnapshot {
        self.obs.snapshot()
    }

    // --- replay ---

    fn detach_driver(&mut self) {
        if self.driver.take().is_some() {
            debug!("replay driver detached, caller now drives the clock");
        }
    }

    pub fn select_message(&mut self, hash: &str) -> Result<(), DashboardError> {
        self.detach_driver();
        self.replay.select_message(&self.dataset, hash)?;
        Ok(())
    }

    pub fn play(&mut self, now_ms: f64) -> Result<ClockToken, DashboardError> {
        self.detach_driver();
        Ok(self.replay.play(now_ms)?)
    }

    pub fn pause(&mut self, now_ms: f64) -> Result<(), DashboardError> {
        Ok(self.replay.pause(now_ms)?)
    }

    pub fn reset(&mut self) -> Result<(), DashboardError> {
        Ok(self.replay.reset()?)
    }

    pub fn set_speed(&mut self, speed: f64, now_ms: f64) {
        self.replay.set_speed(speed, now_ms);
    }

    /// Leaves the replay view, cancelling any running clock.
    pub fn close_replay(&mut self) {
        self.detach_driver();
        self.replay.clear();
    }

    pub fn replay_state(&self) -> ReplayState {
        match &self.driver {
            Some(handle) => handle.current_state(),
            None => self.replay.state(),
        }
    }

    /// Latest frame from whichever clock is in charge.
    pub fn frame(&self) -> Option<ReplayFrame> {
        match &self.driver {
            Some(handle) => handle.latest_frame(),
            None => self.replay.frame(),
        }
    }

    /// Advances the scheduled clock, if any.
    pub fn tick(&mut self, now_ms: f64) -> Option<ReplayFrame> {
        let token = self.replay.scheduled_tick()?;
        match self.tick_with(token, now_ms) {
            TickOutcome::Frame(frame) | TickOutcome::Completed(frame) => Some(frame),
            TickOutcome::Stale => None,
        }
    }

    /// Delivers a tick carrying a specific token, as a frame callback would.
    pub fn tick_with(&mut self, token: ClockToken, now_ms: f64) -> TickOutcome {
        let outcome = self.replay.tick(token, now_ms);
        match &outcome {
            TickOutcome::Frame(_) | TickOutcome::Completed(_) => self.obs.record_frame_emitted(),
            TickOutcome::Stale => self.obs.record_stale_tick(),
        }
        outcome
    }

    /// Hands playback to a driver task. Any earlier driver is dropped, which
    /// stops its task, and the caller-driven engine is cleared.
    pub fn spawn_replay<C: FrameClock>(&mut self, clock: C) -> &ReplayHandle {
        self.replay.clear();
        if self.driver.take().is_some() {
            debug!("replacing running replay driver");
        }
        let handle = spawn_replay(
            Arc::clone(&self.dataset),
            self.config.replay.clone(),
            clock,
            Arc::clone(&self.obs),
        );
        self.driver.insert(handle)
    }

    pub fn replay_driver(&self) -> Option<&ReplayHandle> {
        self.driver.as_ref()
    }

    /// Shuts the driver task down and waits for it to finish.
    pub async fn stop_replay_driver(&mut self) {
        if let Some(handle) = self.driver.take() {
            handle.shutdown().await;
        }
    }

    // --- selection ---

    fn select(&self, origin: SelectionOrigin, pubkey: &str) {
        self.highlight.select_peer(origin, pubkey);
        self.obs.record_highlight_change();
    }

    /// Selects the peer under the pointer; a miss leaves the selection alone.
    pub fn click_canvas(&self, x: f64, y: f64) -> Option<String> {
        let hit = self.layout.hit_test(x, y, CANVAS_HIT_TOLERANCE)?.to_string();
        self.select(SelectionOrigin::ReplayCanvas, &hit);
        Some(hit)
    }

    pub fn click_map_marker(&self, pubkey: &str) {
        self.select(SelectionOrigin::Map, pubkey);
    }

    pub fn click_suspect(&self, pubkey: &str) {
        self.select(SelectionOrigin::SuspectList, pubkey);
    }

    pub fn click_colocation_member(&self, pubkey: &str) {
        self.select(SelectionOrigin::ColocationList, pubkey);
    }

    /// Highlights every listed member of a co-location group.
    pub fn click_colocation_group(&self, prefix: &str) -> bool {
        let Some(group) = self.dataset.leaks.colocation.iter().find(|g| g.prefix == prefix) else {
            debug!(prefix = prefix, "no co-location group with that prefix");
            return false;
        };
        self.highlight
            .select_group(SelectionOrigin::ColocationList, group.member_keys());
        self.obs.record_highlight_change();
        true
    }

    pub fn clear_highlight(&self) {
        self.highlight.clear();
        self.obs.record_highlight_change();
    }

    pub fn geo_focus(&self) -> Option<GeoFocus> {
        self.highlight.geo_focus(&self.dataset)
    }

    // --- panels ---

    pub fn messages(&self, filter: &MessageFilter) -> Vec<&Message> {
        list_messages(&self.dataset.messages, filter)
    }

    pub fn risk_summary(&self) -> &RiskReport {
        &self.risk
    }

    pub fn suspect_count(&self) -> usize {
        self.dataset.leaks.first_responders.len()
    }

    pub fn colocation_count(&self) -> usize {
        self.dataset.leaks.colocation.len()
    }

    pub fn canvas_glyphs(&self) -> Vec<PeerGlyph> {
        let frame = self.frame();
        canvas_glyphs(&self.dataset, &self.layout, frame.as_ref(), &self.highlight)
    }

    pub fn map_markers(&self) -> Vec<MapMarker> {
        map_markers(&self.dataset, &self.highlight)
    }

    pub fn suspect_cards(&self) -> Vec<SuspectCard> {
        suspect_cards(&self.dataset, &self.highlight)
    }

    pub fn colocation_chips(&self) -> Vec<ColocationChip> {
        colocation_chips(&self.dataset, &self.highlight)
    }

    pub fn fingerprint_detail(&self, pubkey: &str) -> Option<FingerprintDetail> {
        let group = self.dataset.fingerprints.group_of(pubkey)?;
        let catalog = ThreatCatalog::new();
        let threat_ids = catalog
            .threats
            .iter()
            .filter(|t| t.affects(group.feature_names.as_deref()))
            .map(|t| t.id.clone())
            .collect();
        let decoded = decode_features_hex(&group.features_hex);
        // Display falls back to the decoded vector; threat membership does not.
        let names = group
            .feature_names
            .clone()
            .or_else(|| decoded.as_ref().ok().map(|d| feature_names(d)))
            .unwrap_or_default();
        Some(FingerprintDetail {
            pubkey: pubkey.to_string(),
            features_hex: group.features_hex.clone(),
            feature_names: names,
            decoded,
            group_size: group.node_count,
            threat_ids,
        })
    }

    /// Pushes the current state to every panel.
    pub fn render<C, M, L>(&self, canvas: &mut C, map: &mut M, lists: &mut L)
    where
        C: CanvasSurface,
        M: MapSurface,
        L: ListSurface,
    {
        let progress = self.frame().map(|f| f.progress).unwrap_or(0.0);
        canvas.draw(&self.canvas_glyphs(), progress);
        map.show_markers(&self.map_markers());
        if let Some(focus) = self.geo_focus() {
            map.focus(&focus);
        }
        lists.show_suspects(&self.suspect_cards());
        lists.show_colocation(&self.colocation_chips());
    }
}
