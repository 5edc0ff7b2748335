//! Alert edge detection and save cooldown

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Transition of the combined alert flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertEdge {
    /// false -> true: engage relay, save evidence
    Rising,
    /// true -> false: disengage relay
    Falling,
}

/// Remembers the previous alert flag and reports transitions
#[derive(Debug, Clone, Default)]
pub struct AlertLatch {
    active: bool,
}

impl AlertLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed this cycle's flag. Each transition is reported exactly once.
    pub fn update(&mut self, drowsy: bool) -> Option<AlertEdge> {
        match (self.active, drowsy) {
            (false, true) => {
                self.active = true;
                info!("Drowsiness alert raised");
                Some(AlertEdge::Rising)
            }
            (true, false) => {
                self.active = false;
                info!("Drowsiness alert cleared");
                Some(AlertEdge::Falling)
            }
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

/// Minimum spacing between accepted events
#[derive(Debug, Clone)]
pub struct Cooldown {
    period: Duration,
    last: Option<Instant>,
}

impl Cooldown {
    pub fn new(period: Duration) -> Self {
        Self { period, last: None }
    }

    pub fn from_secs_f64(seconds: f64) -> Self {
        Self::new(duration_or_zero(seconds))
    }

    pub fn set_period(&mut self, period: Duration) {
        self.period = period;
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Whether an event at `now` would be accepted
    pub fn is_ready(&self, now: Instant) -> bool {
        match self.last {
            Some(last) => now.saturating_duration_since(last) >= self.period,
            None => true,
        }
    }

    /// Accept and stamp the event if the period has elapsed
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        if !self.is_ready(now) {
            debug!("Suppressed: in cooldown period ({:?} left)", self.remaining(now));
            return false;
        }
        self.last = Some(now);
        true
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        match self.last {
            Some(last) => self.period.saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }
}

fn duration_or_zero(seconds: f64) -> Duration {
    if seconds.is_finite() {
        Duration::try_from_secs_f64(seconds.max(0.0)).unwrap_or(Duration::ZERO)
    } else {
        Duration::ZERO
    }
}
