//! Rate limiting for configuration writes
//!
//! Per-peer GCRA limits from tower_governor. Only the config routes are
//! limited; the live stream and history are read-only and stay open.

use governor::middleware::StateInformationMiddleware;
use std::sync::Arc;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::PeerIpKeyExtractor;

use crate::ApiError;

/// Governor config keyed by peer IP, with X-RateLimit-* headers
pub type DefaultGovernorConfig =
    tower_governor::governor::GovernorConfig<PeerIpKeyExtractor, StateInformationMiddleware>;

/// Rate limiting configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Seconds per replenished request
    pub per_second: u64,
    /// Requests allowed back to back
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        // Slider drags in the UI send short bursts of updates
        Self {
            per_second: 1,
            burst_size: 20,
        }
    }
}

impl RateLimitConfig {
    /// One request every few seconds, for endpoints that touch the disk
    pub fn strict() -> Self {
        Self {
            per_second: 4,
            burst_size: 2,
        }
    }
}

/// Build the governor config.
///
/// Peer IPs come from `ConnectInfo`, so the service must be served with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn create_governor_config(config: &RateLimitConfig) -> Result<Arc<DefaultGovernorConfig>, ApiError> {
    GovernorConfigBuilder::default()
        .per_second(config.per_second)
        .burst_size(config.burst_size)
        .use_headers()
        .finish()
        .map(Arc::new)
        .ok_or_else(|| {
            ApiError::RateLimit(format!(
                "per_second={} burst_size={} must both be non-zero",
                config.per_second, config.burst_size
            ))
        })
}
