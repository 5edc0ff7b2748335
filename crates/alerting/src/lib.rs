//! Alerting System
//!
//! Turns the per-cycle drowsiness flag into edges, rate-limits evidence
//! saves, and drives the warning relay.

mod manager;
mod relay;

pub use manager::{AlertEdge, AlertLatch, Cooldown};
pub use relay::{OutputPin, Relay, SysfsPin, GPIO_SYSFS_ROOT};

use thiserror::Error;

/// Relay error types
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("GPIO {pin} unavailable: {reason}")]
    Unavailable { pin: u32, reason: String },

    #[error("GPIO write failed: {0}")]
    Write(#[from] std::io::Error),
}
