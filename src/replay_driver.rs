//! Runs one `ReplayEngine` inside a task and drives its frame clock.
//!
//! The interval only fires while the engine has an armed token, and queued
//! commands always win over a pending tick, so a pause or a new selection is
//! applied before any frame computed under the old clock could be published.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::config::ReplayPolicy;
use crate::core::observability::Observability;
use crate::model::Dataset;
use crate::replay::{ReplayEngine, ReplayFrame, ReplayState, TickOutcome};

const COMMAND_BUFFER: usize = 32;

pub trait FrameClock: Send + Sync + 'static {
    /// Monotonic milliseconds since an arbitrary origin.
    fn now_ms(&self) -> f64;
}

pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock for MonotonicClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Clone, Default)]
pub struct ManualClock {
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, now_ms: f64) {
        self.bits.store(now_ms.to_bits(), Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: f64) {
        self.set(self.now_ms() + delta_ms);
    }
}

impl FrameClock for ManualClock {
    fn now_ms(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReplayCommand {
    Select(String),
    Play,
    Pause,
    Reset,
    SetSpeed(f64),
    Shutdown,
}

pub struct ReplayHandle {
    commands: mpsc::Sender<ReplayCommand>,
    frames: watch::Receiver<Option<ReplayFrame>>,
    state: watch::Receiver<ReplayState>,
    task: JoinHandle<()>,
}

impl ReplayHandle {
    /// Returns false once the driver has stopped.
    pub async fn send(&self, command: ReplayCommand) -> bool {
        self.commands.send(command).await.is_ok()
    }

    pub fn frames(&self) -> watch::Receiver<Option<ReplayFrame>> {
        self.frames.clone()
    }

    pub fn state(&self) -> watch::Receiver<ReplayState> {
        self.state.clone()
    }

    pub fn current_state(&self) -> ReplayState {
        *self.state.borrow()
    }

    pub fn latest_frame(&self) -> Option<ReplayFrame> {
        self.frames.borrow().clone()
    }

    pub async fn shutdown(self) {
        let _ = self.commands.send(ReplayCommand::Shutdown).await;
        if let Err(e) = self.task.await {
            warn!(error = %e, "replay driver task ended abnormally");
        }
    }
}

struct Driver<C> {
    engine: ReplayEngine,
    dataset: Arc<Dataset>,
    clock: C,
    obs: Arc<Observability>,
    frames: watch::Sender<Option<ReplayFrame>>,
    state: watch::Sender<ReplayState>,
}

impl<C: FrameClock> Driver<C> {
    fn apply(&mut self, command: ReplayCommand) {
        let now = self.clock.now_ms();
        let result = match command {
            ReplayCommand::Select(hash) => self.engine.select_message(&self.dataset, &hash),
            ReplayCommand::Play => self.engine.play(now).map(|_| ()),
            ReplayCommand::Pause => self.engine.pause(now),
            ReplayCommand::Reset => self.engine.reset(),
            ReplayCommand::SetSpeed(speed) => {
                self.engine.set_speed(speed, now);
                Ok(())
            }
            ReplayCommand::Shutdown => Ok(()),
        };
        if let Err(e) = result {
            warn!(error = %e, "replay command rejected");
        }
        self.publish(self.engine.frame());
    }

    fn on_tick(&mut self) {
        let Some(token) = self.engine.scheduled_tick() else {
            return;
        };
        match self.engine.tick(token, self.clock.now_ms()) {
            TickOutcome::Frame(frame) | TickOutcome::Completed(frame) => self.publish(Some(frame)),
            TickOutcome::Stale => self.obs.record_stale_tick(),
        }
    }

    fn publish(&self, frame: Option<ReplayFrame>) {
        if frame.is_some() {
            self.obs.record_frame_emitted();
        }
        self.frames.send_replace(frame);
        self.state.send_if_modified(|current| {
            let next = self.engine.state();
            if *current != next {
                *current = next;
                true
            } else {
                false
            }
        });
    }
}

pub fn spawn_replay<C: FrameClock>(
    dataset: Arc<Dataset>,
    policy: ReplayPolicy,
    clock: C,
    obs: Arc<Observability>,
) -> ReplayHandle {
    let (command_tx, mut command_rx) = mpsc::channel(COMMAND_BUFFER);
    let (frame_tx, frame_rx) = watch::channel(None);
    let (state_tx, state_rx) = watch::channel(ReplayState::Idle);

    let frame_interval = policy.frame_interval;
    let mut driver = Driver {
        engine: ReplayEngine::new(&policy),
        dataset,
        clock,
        obs,
        frames: frame_tx,
        state: state_tx,
    };

    let task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(frame_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let armed = driver.engine.scheduled_tick().is_some();
            tokio::select! {
                biased;
                command = command_rx.recv() => match command {
                    None | Some(ReplayCommand::Shutdown) => break,
                    Some(command) => driver.apply(command),
                },
                _ = interval.tick(), if armed => driver.on_tick(),
            }
        }
        debug!("replay driver stopped");
    });

    ReplayHandle {
        commands: command_tx,
        frames: frame_rx,
        state: state_rx,
        task,
    }
}
