//! Cabin camera input
//!
//! An ffmpeg child process decodes the USB camera's MJPEG stream from a
//! V4L2 node into raw RGB24, which is cut into `VideoFrame`s. The crop
//! rectangle applied before detection lives here too, since it only
//! depends on frame geometry.

pub mod frame;
pub mod region;
pub mod source;

pub use frame::VideoFrame;
pub use region::{CropRect, RegionSelector, Selection, MIN_CROP_SIZE};
pub use source::{FfmpegCamera, FrameSource};

use std::time::Duration;
use thiserror::Error;

/// Failures of the capture process or of frame handling
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Could not start ffmpeg capture on {0}")]
    Spawn(String),

    #[error("Frame geometry mismatch: {0}")]
    Format(String),

    #[error("Capture stream broke: {0}")]
    Stream(String),

    #[error("No frame from ffmpeg within {0:?}")]
    Timeout(Duration),

    #[error("Camera already released")]
    Released,

    #[error("JPEG encoding failed: {0}")]
    Encode(String),
}

/// V4L2 device and the raw RGB24 geometry ffmpeg is asked to emit
#[derive(Debug, Clone)]
pub struct CameraConfig {
    /// V4L2 node handed to ffmpeg's `-i`
    pub device: String,
    pub width: u32,
    pub height: u32,
    /// Requested capture rate; also the rate frames reach the pipeline
    pub fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            width: 1280,
            height: 720,
            fps: 30,
        }
    }
}

impl CameraConfig {
    /// Bytes ffmpeg writes per frame
    pub fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}
