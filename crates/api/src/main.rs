//! Drowsiness Monitor - Main Entry Point

use anyhow::{anyhow, Context};
use api::{init_logging, init_metrics, run_server, spawn_metrics_upkeep, AppState};
use camera_capture::VideoFrame;
use config_store::{ConfigStore, DEFAULT_CONFIG_PATH};
use monitor::{spawn_pipeline, FramePublisher, MonitorSettings, Pipeline, StopSignal};
use std::sync::Arc;
use storage::EvidenceRepository;
use tracing::info;

/// Quality of the frame shown before the camera delivers
const PLACEHOLDER_QUALITY: u8 = 45;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;

    info!("=== Drowsiness Monitor v{} ===", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::var("DROWSY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = Arc::new(ConfigStore::load_or_default(config_path));
    let settings = MonitorSettings::from_store(&config);

    let prometheus = init_metrics()?;
    spawn_metrics_upkeep(prometheus.clone());

    let placeholder = VideoFrame::blank(settings.camera.width, settings.camera.height)
        .encode_jpeg(PLACEHOLDER_QUALITY)
        .context("encoding placeholder frame")?;
    let publisher = FramePublisher::new(placeholder);
    let stop = StopSignal::new();

    let pipeline = Pipeline::from_settings(&settings, Arc::clone(&config), publisher.clone(), stop.clone())
        .context("initializing pipeline")?;
    let pipeline_thread = spawn_pipeline(pipeline)?;

    let state = Arc::new(AppState::new(
        config,
        publisher,
        EvidenceRepository::new(&settings.snapshot_dir, &settings.evidence_dir),
        stop.clone(),
        prometheus,
    ));

    let shutdown_stop = stop.clone();
    let served = run_server(state, &settings.http_addr, async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
        }
        info!("Shutdown requested");
        shutdown_stop.stop();
    })
    .await;

    // A server that failed to start must still stop the pipeline
    stop.stop();
    tokio::task::spawn_blocking(move || pipeline_thread.join())
        .await?
        .map_err(|_| anyhow!("pipeline thread panicked"))?;

    served?;
    info!("Shutdown complete");
    Ok(())
}
