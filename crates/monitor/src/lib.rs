//! Drowsiness Monitor Pipeline
//!
//! One long-lived thread runs every stage in order for each camera frame:
//! capture, crop, detection, classification, smoothing, drowsiness
//! tracking, then relay/evidence/publishing side effects.

pub mod annotate;
pub mod context;
pub mod params;
pub mod pipeline;
pub mod publisher;

pub use context::StopSignal;
pub use params::{CycleParams, MonitorSettings};
pub use pipeline::{spawn_pipeline, CycleReport, Pipeline};
pub use publisher::{Delivery, FramePublisher, FrameSubscriber};

use thiserror::Error;

/// Pipeline error types
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Camera error: {0}")]
    Camera(#[from] camera_capture::CameraError),

    #[error("Detection error: {0}")]
    Detection(#[from] dms::DmsError),

    #[error("Failed to start pipeline thread: {0}")]
    Spawn(std::io::Error),
}
