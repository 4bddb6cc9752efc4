#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservabilityLevel {
    OBS_NONE,
    OBS_SAFE,
    OBS_DEV,
}

#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    RESOURCE_UNAVAILABLE,
    MALFORMED_RECORD,
    UNRESOLVED_REFERENCE,
    DEGENERATE_COMPUTATION,
}

#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    OK,
    DEGRADED,
}

#[cfg(feature = "obs_none")]
pub const OBS_LEVEL: ObservabilityLevel = ObservabilityLevel::OBS_NONE;

#[cfg(all(feature = "obs_dev", not(feature = "obs_none")))]
pub const OBS_LEVEL: ObservabilityLevel = ObservabilityLevel::OBS_DEV;

#[cfg(all(not(feature = "obs_none"), not(feature = "obs_dev")))]
pub const OBS_LEVEL: ObservabilityLevel = ObservabilityLevel::OBS_SAFE;

pub const OBS_NONE: bool = matches!(OBS_LEVEL, ObservabilityLevel::OBS_NONE);

use std::sync::atomic::{AtomicU64, Ordering};

const ERROR_CLASSES: usize = 4;

/// Per-session counters. Each dashboard session owns one, so independent
/// sessions (and tests) never share counts.
#[derive(Debug, Default)]
pub struct Observability {
    resources_loaded: AtomicU64,
    resources_failed: AtomicU64,
    records_skipped: AtomicU64,
    unresolved_references: AtomicU64,
    frames_emitted: AtomicU64,
    stale_ticks_dropped: AtomicU64,
    highlight_changes: AtomicU64,
    errors_by_class: [AtomicU64; ERROR_CLASSES],
}

impl Observability {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn bump(counter: &AtomicU64) {
        if !OBS_NONE {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_error(&self, class: ErrorClass) {
        Self::bump(&self.errors_by_class[class_index(class)]);
    }

    #[inline]
    pub fn record_resource_loaded(&self) {
        Self::bump(&self.resources_loaded);
    }

    #[inline]
    pub fn record_resource_failed(&self) {
        Self::bump(&self.resources_failed);
        self.record_error(ErrorClass::RESOURCE_UNAVAILABLE);
    }

    #[inline]
    pub fn record_skipped_record(&self) {
        Self::bump(&self.records_skipped);
        self.record_error(ErrorClass::MALFORMED_RECORD);
    }

    #[inline]
    pub fn record_unresolved_reference(&self) {
        Self::bump(&self.unresolved_references);
        self.record_error(ErrorClass::UNRESOLVED_REFERENCE);
    }

    #[inline]
    pub fn record_frame_emitted(&self) {
        Self::bump(&self.frames_emitted);
    }

    #[inline]
    pub fn record_stale_tick(&self) {
        Self::bump(&self.stale_ticks_dropped);
    }

    #[inline]
    pub fn record_highlight_change(&self) {
        Self::bump(&self.highlight_changes);
    }

    /// A session is degraded as soon as one resource fell back to its default.
    pub fn health(&self) -> HealthState {
        if self.resources_failed.load(Ordering::Relaxed) > 0 {
            HealthState::DEGRADED
        } else {
            HealthState::OK
        }
    }

    pub fn snapshot(&self) -> ObservabilitySnapshot {
        ObservabilitySnapshot {
            resources_loaded: self.resources_loaded.load(Ordering::Relaxed),
            resources_failed: self.resources_failed.load(Ordering::Relaxed),
            records_skipped: self.records_skipped.load(Ordering::Relaxed),
            unresolved_references: self.unresolved_references.load(Ordering::Relaxed),
            frames_emitted: self.frames_emitted.load(Ordering::Relaxed),
            stale_ticks_dropped: self.stale_ticks_dropped.load(Ordering::Relaxed),
            highlight_changes: self.highlight_changes.load(Ordering::Relaxed),
            errors_by_class: [
                self.errors_by_class[0].load(Ordering::Relaxed),
                self.errors_by_class[1].load(Ordering::Relaxed),
                self.errors_by_class[2].load(Ordering::Relaxed),
                self.errors_by_class[3].load(Ordering::Relaxed),
            ],
            health: self.health(),
        }
    }
}

#[inline]
const fn class_index(class: ErrorClass) -> usize {
    match class {
        ErrorClass::RESOURCE_UNAVAILABLE => 0,
        ErrorClass::MALFORMED_RECORD => 1,
        ErrorClass::UNRESOLVED_REFERENCE => 2,
        ErrorClass::DEGENERATE_COMPUTATION => 3,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservabilitySnapshot {
    pub resources_loaded: u64,
    pub resources_failed: u64,
    pub records_skipped: u64,
    pub unresolved_references: u64,
    pub frames_emitted: u64,
    pub stale_ticks_dropped: u64,
    pub highlight_changes: u64,
    pub errors_by_class: [u64; ERROR_CLASSES],
    pub health: HealthState,
}

impl ObservabilitySnapshot {
    pub fn errors_of(&self, class: ErrorClass) -> u64 {
        self.errors_by_class[class_index(class)]
    }
}
