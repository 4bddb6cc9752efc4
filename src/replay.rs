//! Wavefront replay state machine.
//!
//! The engine never reads a clock itself: callers pass monotonic timestamps
//! in milliseconds. Every `play` arms a fresh `ClockToken`; anything that
//! stops or restarts playback advances the generation, so a tick carrying an
//! older token is dropped instead of overwriting newer state.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};

use crate::config::ReplayPolicy;
use crate::error::ReplayError;
use crate::model::{Arrival, Dataset};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayState {
    Idle,
    Selected,
    Playing,
    Paused,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockToken {
    generation: u64,
}

impl ClockToken {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LitPeer {
    pub pubkey: String,
    pub delay_ms: f64,
    /// 1 at the moment the peer lit up, fading linearly to 0.
    pub freshness: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplayFrame {
    pub hash: String,
    pub state: ReplayState,
    pub elapsed_ms: f64,
    pub progress: f64,
    pub lit: Vec<LitPeer>,
    pub total_peers: usize,
}

impl ReplayFrame {
    pub fn lit_set(&self) -> BTreeSet<String> {
        self.lit.iter().map(|p| p.pubkey.clone()).collect()
    }

    pub fn is_lit(&self, pubkey: &str) -> bool {
        self.lit.iter().any(|p| p.pubkey == pubkey)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Frame(ReplayFrame),
    /// Final frame; the clock is disarmed.
    Completed(ReplayFrame),
    /// The token was cancelled; nothing changed.
    Stale,
}

#[derive(Debug, Clone)]
struct Selection {
    hash: String,
    spread_ms: f64,
    arrivals: Vec<Arrival>,
}

#[derive(Debug, Clone, Copy)]
struct Anchor {
    now_ms: f64,
    elapsed_ms: f64,
}

#[derive(Debug)]
pub struct ReplayEngine {
    state: ReplayState,
    selection: Option<Selection>,
    delays: BTreeMap<String, f64>,
    elapsed_ms: f64,
    speed: f64,
    anchor: Option<Anchor>,
    generation: u64,
    armed: Option<ClockToken>,
    completion_tail_ms: f64,
    fade_window_ms: f64,
}

impl ReplayEngine {
    pub fn new(policy: &ReplayPolicy) -> Self {
        Self {
            state: ReplayState::Idle,
            selection: None,
            delays: BTreeMap::new(),
            elapsed_ms: 0.0,
            speed: if policy.speed.is_finite() { policy.speed } else { 1.0 },
            anchor: None,
            generation: 0,
            armed: None,
            completion_tail_ms: policy.completion_tail_ms,
            fade_window_ms: policy.fade_window_ms,
        }
    }

    pub fn state(&self) -> ReplayState {
        self.state
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed_ms
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn selected_hash(&self) -> Option<&str> {
        self.selection.as_ref().map(|s| s.hash.as_str())
    }

    pub fn spread_ms(&self) -> f64 {
        self.selection.as_ref().map(|s| s.spread_ms).unwrap_or(0.0)
    }

    /// The token the next tick must carry, if the clock is running.
    pub fn scheduled_tick(&self) -> Option<ClockToken> {
        self.armed
    }

    fn cancel_clock(&mut self) {
        self.generation += 1;
        self.armed = None;
        self.anchor = None;
    }

    /// Delay at which `pubkey` lights up; infinite when it never does.
    pub fn delay_of(&self, pubkey: &str) -> f64 {
        self.delays.get(pubkey).copied().unwrap_or(f64::INFINITY)
    }

    pub fn is_lit(&self, pubkey: &str) -> bool {
        self.selection.is_some() && self.elapsed_ms >= self.delay_of(pubkey)
    }

    pub fn select_message(&mut self, dataset: &Dataset, hash: &str) -> Result<(), ReplayError> {
        let message = dataset.message(hash);
        let wavefront = dataset.wavefront(hash);
        if message.is_none() && wavefront.is_none() {
            return Err(ReplayError::UnknownMessage(hash.to_string()));
        }

        self.cancel_clock();

        let mut arrivals = wavefront.map(|w| w.arrivals.clone()).unwrap_or_default();
        arrivals.sort_by(|a, b| a.delay_ms.total_cmp(&b.delay_ms));
        let mut seen = BTreeSet::new();
        arrivals.retain(|a| seen.insert(a.peer.clone()));
        let spread_ms = message
            .map(|m| m.time_spread_ms)
            .or_else(|| wavefront.map(|w| w.spread_ms()))
            .unwrap_or(0.0);

        let mut delays: BTreeMap<String, f64> = dataset
            .peers
            .keys()
            .map(|k| (k.clone(), f64::INFINITY))
            .collect();
        for arrival in &arrivals {
            let slot = delays.entry(arrival.peer.clone()).or_insert(f64::INFINITY);
            *slot = slot.min(arrival.delay_ms);
        }

        info!(hash = hash, arrivals = arrivals.len(), spread_ms, "message selected for replay");
        self.delays = delays;
        self.selection = Some(Selection {
            hash: hash.to_string(),
            spread_ms,
            arrivals,
        });
        self.elapsed_ms = 0.0;
        self.state = ReplayState::Selected;
        Ok(())
    }

    /// Leaves the replay view entirely.
    pub fn clear(&mut self) {
        self.cancel_clock();
        self.selection = None;
        self.delays.clear();
        self.elapsed_ms = 0.0;
        self.state = ReplayState::Idle;
    }

    pub fn play(&mut self, now_ms: f64) -> Result<ClockToken, ReplayError> {
        match self.state {
            ReplayState::Idle => return Err(ReplayError::NoMessageSelected),
            ReplayState::Playing => {
                return Err(ReplayError::InvalidTransition {
                    from: self.state,
                    action: "play",
                })
            }
            ReplayState::Completed => self.elapsed_ms = 0.0,
            ReplayState::Selected | ReplayState::Paused => {}
        }

        self.cancel_clock();
        let token = ClockToken {
            generation: self.generation,
        };
        self.armed = Some(token);
        self.anchor = Some(Anchor {
            now_ms,
            elapsed_ms: self.elapsed_ms,
        });
        self.state = ReplayState::Playing;
        Ok(token)
    }

    /// Freezes the clock at `now_ms`, keeping the time played since the last tick.
    pub fn pause(&mut self, now_ms: f64) -> Result<(), ReplayError> {
        if self.state != ReplayState::Playing {
            return Err(ReplayError::InvalidTransition {
                from: self.state,
                action: "pause",
            });
        }
        if let Some(anchor) = self.anchor {
            self.elapsed_ms = self.elapsed_at(anchor, now_ms);
        }
        self.cancel_clock();
        self.state = ReplayState::Paused;
        Ok(())
    }

    pub fn reset(&mut self) -> Result<(), ReplayError> {
        if self.state == ReplayState::Idle {
            return Err(ReplayError::NoMessageSelected);
        }
        self.cancel_clock();
        self.elapsed_ms = 0.0;
        self.state = ReplayState::Selected;
        Ok(())
    }

    /// Changes the clock rate. A running clock is re-anchored so elapsed time
    /// stays continuous across the change.
    pub fn set_speed(&mut self, speed: f64, now_ms: f64) {
        if !speed.is_finite() {
            warn!(speed, "ignoring non-numeric replay speed");
            return;
        }
        if let Some(anchor) = self.anchor {
            let elapsed = self.elapsed_at(anchor, now_ms);
            self.anchor = Some(Anchor {
                now_ms,
                elapsed_ms: elapsed,
            });
            self.elapsed_ms = elapsed;
        }
        self.speed = speed;
    }

    fn elapsed_at(&self, anchor: Anchor, now_ms: f64) -> f64 {
        let advanced = anchor.elapsed_ms + (now_ms - anchor.now_ms) * self.speed;
        if advanced.is_finite() {
            advanced.max(0.0)
        } else {
            anchor.elapsed_ms
        }
    }

    pub fn tick(&mut self, token: ClockToken, now_ms: f64) -> TickOutcome {
        let anchor = match (self.armed, self.anchor) {
            (Some(armed), Some(anchor)) if armed == token && self.state == ReplayState::Playing => anchor,
            _ => {
                debug!(generation = token.generation, current = self.generation, "dropping stale replay tick");
                return TickOutcome::Stale;
            }
        };

        let elapsed = self.elapsed_at(anchor, now_ms);
        let spread = self.spread_ms();
        if elapsed >= spread + self.completion_tail_ms {
            self.elapsed_ms = spread;
            self.armed = None;
            self.anchor = None;
            self.state = ReplayState::Completed;
            info!(hash = self.selected_hash().unwrap_or_default(), "replay completed");
            return match self.frame() {
                Some(frame) => TickOutcome::Completed(frame),
                None => TickOutcome::Stale,
            };
        }

        self.elapsed_ms = elapsed;
        match self.frame() {
            Some(frame) => TickOutcome::Frame(frame),
            None => TickOutcome::Stale,
        }
    }

    pub fn progress(&self) -> f64 {
        let spread = self.spread_ms();
        if spread > 0.0 {
            (self.elapsed_ms / spread).clamp(0.0, 1.0)
        } else if self.elapsed_ms > 0.0 || self.state == ReplayState::Completed {
            1.0
        } else {
            0.0
        }
    }

    fn freshness(&self, delay_ms: f64) -> f64 {
        if self.fade_window_ms <= 0.0 {
            return 0.0;
        }
        (1.0 - (self.elapsed_ms - delay_ms) / self.fade_window_ms).clamp(0.0, 1.0)
    }

    /// The frame for the current elapsed time; `None` until a message is selected.
    pub fn frame(&self) -> Option<ReplayFrame> {
        let selection = self.selection.as_ref()?;
        let lit = selection
            .arrivals
            .iter()
            .filter(|a| self.elapsed_ms >= a.delay_ms)
            .map(|a| LitPeer {
                pubkey: a.peer.clone(),
                delay_ms: a.delay_ms,
                freshness: self.freshness(a.delay_ms),
            })
            .collect();
        Some(ReplayFrame {
            hash: selection.hash.clone(),
            state: self.state,
            elapsed_ms: self.elapsed_ms,
            progress: self.progress(),
            lit,
            total_peers: selection.arrivals.len(),
        })
    }
}
