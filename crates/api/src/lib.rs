//! Drowsiness Monitor API Server
//!
//! Live MJPEG view of the annotated feed, runtime configuration, evidence
//! history and Prometheus metrics. The pipeline itself runs on its own
//! thread; handlers only touch the config store, the frame publisher and
//! the evidence directories.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use config_store::ConfigStore;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use monitor::{FramePublisher, StopSignal};
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use storage::EvidenceRepository;
use thiserror::Error;
use tower_governor::GovernorLayer;
use tower_http::services::ServeDir;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

pub mod rate_limit;
mod routes;

use rate_limit::{create_governor_config, RateLimitConfig};

/// API error types
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Server I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid rate limit configuration: {0}")]
    RateLimit(String),

    #[error("Metrics recorder error: {0}")]
    Metrics(String),
}

/// Application state shared across handlers
pub struct AppState {
    pub config: Arc<ConfigStore>,
    pub publisher: FramePublisher,
    pub repository: EvidenceRepository,
    /// Ends open streams when the process shuts down
    pub stop: StopSignal,
    pub prometheus: PrometheusHandle,
    pub version: String,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config: Arc<ConfigStore>,
        publisher: FramePublisher,
        repository: EvidenceRepository,
        stop: StopSignal,
        prometheus: PrometheusHandle,
    ) -> Self {
        Self {
            config,
            publisher,
            repository,
            stop,
            prometheus,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Instant::now(),
        }
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub stream: StreamStatus,
}

/// Live-view status
#[derive(Debug, Serialize)]
pub struct StreamStatus {
    pub frames_published: u64,
    pub has_frame: bool,
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Result<Router, ApiError> {
    let config_routes = Router::new()
        .route(
            "/api/v1/config",
            get(routes::config::get_config).post(routes::config::update_config),
        )
        .layer(GovernorLayer {
            config: create_governor_config(&RateLimitConfig::default())?,
        });

    let persist_routes = Router::new()
        .route("/api/v1/config/persist", post(routes::config::persist_config))
        .layer(GovernorLayer {
            config: create_governor_config(&RateLimitConfig::strict())?,
        });

    Ok(Router::new()
        .route("/video_feed", get(routes::stream::video_feed))
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/history", get(routes::history::get_history))
        .route("/metrics", get(metrics_handler))
        .merge(config_routes)
        .merge(persist_routes)
        .nest_service("/captured_images", ServeDir::new(state.repository.snapshot_dir()))
        .nest_service("/captured_videos", ServeDir::new(state.repository.video_dir()))
        .with_state(state))
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    Json(HealthResponse {
        status: if state.stop.is_stopped() { "stopping" } else { "healthy" }.to_string(),
        timestamp,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        stream: StreamStatus {
            frames_published: state.publisher.sequence(),
            has_frame: state.publisher.latest().is_some(),
        },
    })
}

/// Prometheus text exposition
async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (StatusCode::OK, state.prometheus.render())
}

/// Initialize logging
pub fn init_logging() -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
}

/// Install the global metrics recorder
pub fn init_metrics() -> Result<PrometheusHandle, ApiError> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ApiError::Metrics(e.to_string()))
}

/// Periodically drain histogram buckets so the recorder does not grow
pub fn spawn_metrics_upkeep(handle: PrometheusHandle) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(5));
        loop {
            tick.tick().await;
            handle.run_upkeep();
        }
    })
}

/// Serve until `shutdown` resolves
pub async fn run_server<F>(state: Arc<AppState>, addr: &str, shutdown: F) -> Result<(), ApiError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state)?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Starting API server on {}", addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("API server stopped");
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use axum::body::Body;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health() {
        let root = scratch_dir("health");
        let state = state(&root);
        state.publisher.publish(b"jpeg".to_vec());
        let app = create_router(state).unwrap();

        let response = app
            .oneshot(request("GET", "/api/v1/health", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["stream"]["frames_published"], 1);
        assert_eq!(body["stream"]["has_frame"], true);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let root = scratch_dir("metrics");
        let app = create_router(state(&root)).unwrap();

        let response = app
            .oneshot(request("GET", "/metrics", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_captured_images_served() {
        let root = scratch_dir("serve");
        std::fs::create_dir_all(root.join("snapshots")).unwrap();
        std::fs::write(root.join("snapshots/drowsy_20240101_000000.jpg"), b"jpeg").unwrap();
        let app = create_router(state(&root)).unwrap();

        let response = app
            .oneshot(request("GET", "/captured_images/drowsy_20240101_000000.jpg", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"jpeg");
        std::fs::remove_dir_all(&root).unwrap();
    }
}
