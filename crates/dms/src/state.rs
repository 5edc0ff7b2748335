//! Drowsiness state tracking

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::assigner::{EyeSlot, LogicMode};

/// Smoothed per-eye decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EyeState {
    Open,
    Closed,
}

impl EyeState {
    pub fn is_open(&self) -> bool {
        matches!(self, EyeState::Open)
    }

    pub fn label(&self) -> &'static str {
        match self {
            EyeState::Open => "open",
            EyeState::Closed => "closed",
        }
    }
}

/// Per-slot closure timers, the combined alert flag and the missing-eye watchdog
///
/// A slot is AWAKE when its timer is `None` and CLOSING(t) when it holds the
/// instant the eye was first seen closed.
#[derive(Debug, Clone)]
pub struct DrowsinessTracker {
    timers: [Option<Instant>; 2],
    threshold: Duration,
    is_drowsy: bool,
    missing_cycles: u32,
    max_missing_cycles: u32,
}

impl DrowsinessTracker {
    pub fn new(threshold_s: f64, max_missing_cycles: u32) -> Self {
        Self {
            timers: [None; 2],
            threshold: seconds(threshold_s),
            is_drowsy: false,
            missing_cycles: 0,
            max_missing_cycles: max_missing_cycles.max(1),
        }
    }

    pub fn set_threshold(&mut self, threshold_s: f64) {
        self.threshold = seconds(threshold_s);
    }

    pub fn set_max_missing_cycles(&mut self, cycles: u32) {
        self.max_missing_cycles = cycles.max(1);
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Advance one slot; returns whether it has been closed for at least the threshold
    pub fn update_slot(&mut self, slot: EyeSlot, state: EyeState, now: Instant) -> bool {
        let timer = &mut self.timers[slot.index()];
        match (state, *timer) {
            (EyeState::Open, _) => {
                *timer = None;
                false
            }
            (EyeState::Closed, None) => {
                *timer = Some(now);
                self.threshold.is_zero()
            }
            (EyeState::Closed, Some(start)) => now.saturating_duration_since(start) >= self.threshold,
        }
    }

    /// Combine per-eye sustained flags into the alert state
    pub fn resolve(&mut self, sustained: &[bool], mode: LogicMode) -> bool {
        let alert = sustained.len() == mode.required_eyes() && sustained.iter().all(|s| *s);
        if alert != self.is_drowsy {
            debug!("Alert state {} -> {}", self.is_drowsy, alert);
        }
        self.is_drowsy = alert;
        alert
    }

    /// Record a cycle with no worker eyes. Returns true when the watchdog
    /// fired this cycle and cleared all state.
    pub fn mark_missing(&mut self) -> bool {
        self.missing_cycles += 1;
        if self.missing_cycles >= self.max_missing_cycles {
            info!(
                "No worker eyes for {} cycles; clearing drowsiness state",
                self.missing_cycles
            );
            self.reset();
            return true;
        }
        false
    }

    pub fn mark_present(&mut self) {
        self.missing_cycles = 0;
    }

    pub fn missing_cycles(&self) -> u32 {
        self.missing_cycles
    }

    pub fn is_drowsy(&self) -> bool {
        self.is_drowsy
    }

    pub fn closing_since(&self, slot: EyeSlot) -> Option<Instant> {
        self.timers[slot.index()]
    }

    /// Clear timers, alert flag and missing counter
    pub fn reset(&mut self) {
        self.timers = [None; 2];
        self.is_drowsy = false;
        self.missing_cycles = 0;
    }
}

const DEFAULT_THRESHOLD: Duration = Duration::from_secs(2);

fn seconds(value: f64) -> Duration {
    if !value.is_finite() {
        return DEFAULT_THRESHOLD;
    }
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(DEFAULT_THRESHOLD)
}
