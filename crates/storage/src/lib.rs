//! Storage Layer
//!
//! File-backed persistence for alert evidence:
//! - Pre-event clip recording with a rolling frame buffer
//! - Still snapshots on alert onset
//! - Raw training-data capture
//! - Listing of saved evidence for the history view

mod dataset;
mod encoder;
mod recorder;
mod repository;
mod snapshot;

pub use dataset::DatasetCollector;
pub use encoder::{ClipSink, FfmpegClipWriter};
pub use recorder::{EvidenceRecorder, RecorderConfig, TriggerOutcome};
pub use repository::{EvidenceEntry, EvidenceRepository, DEFAULT_HISTORY_LIMIT};
pub use snapshot::SnapshotWriter;

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encoding error: {0}")]
    Encode(String),

    #[error("Transcode failed: {0}")]
    Transcode(String),

    #[error("Nothing to save")]
    Empty,
}

/// Local-time stamp used in evidence file names
pub(crate) fn file_stamp() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}
