//! Evidence recorder
//!
//! Keeps the last few seconds of raw frames and, when an alert starts,
//! hands them to a background writer. Frames are shared, not copied. At most one writer runs at a time
//! and saves are spaced by a cooldown.

use alerting::Cooldown;
use camera_capture::VideoFrame;
use metrics::counter;
use ring_buffer::RingBuffer;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::encoder::ClipSink;

/// Recorder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Seconds of pre-event context
    pub buffer_seconds: u32,
    /// Rate frames are pushed at. Sizes the buffer and sets clip playback.
    pub fps: u32,
    /// Minimum seconds between saves
    pub cooldown_seconds: f64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            buffer_seconds: 3,
            fps: 30,
            cooldown_seconds: 10.0,
        }
    }
}

impl RecorderConfig {
    pub fn capacity(&self) -> usize {
        (self.buffer_seconds.max(1) * self.fps.max(1)) as usize
    }
}

/// What a trigger did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// A writer was started with a snapshot of the buffer
    Started,
    /// A previous save is still running
    Busy,
    /// Too soon after the last save
    CoolingDown,
    /// No frames buffered yet
    Empty,
}

/// Clears the in-flight flag when the writer ends, however it ends
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct EvidenceRecorder {
    buffer: RingBuffer<Arc<VideoFrame>>,
    fps: u32,
    cooldown: Cooldown,
    in_flight: Arc<AtomicBool>,
    sink: Arc<dyn ClipSink>,
}

impl EvidenceRecorder {
    pub fn new(config: &RecorderConfig, sink: Arc<dyn ClipSink>) -> Self {
        info!(
            "Evidence buffer: {}s @ {}fps ({} frames), cooldown {}s",
            config.buffer_seconds,
            config.fps,
            config.capacity(),
            config.cooldown_seconds
        );
        Self {
            buffer: RingBuffer::new(config.capacity()),
            fps: config.fps.max(1),
            cooldown: Cooldown::from_secs_f64(config.cooldown_seconds),
            in_flight: Arc::new(AtomicBool::new(false)),
            sink,
        }
    }

    /// Add a raw frame, evicting the oldest once full
    pub fn push(&mut self, frame: Arc<VideoFrame>) {
        self.buffer.push(frame);
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_recording(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Called on an alert rising edge. Never blocks on the writer.
    pub fn trigger(&mut self, now: Instant) -> TriggerOutcome {
        if self.is_recording() {
            debug!("Evidence save already in progress");
            return TriggerOutcome::Busy;
        }
        if self.buffer.is_empty() {
            return TriggerOutcome::Empty;
        }
        if !self.cooldown.try_acquire(now) {
            return TriggerOutcome::CoolingDown;
        }

        let frames = self.buffer.snapshot();
        let sink = Arc::clone(&self.sink);
        let fps = self.fps;

        self.in_flight.store(true, Ordering::Release);
        let guard = InFlightGuard(Arc::clone(&self.in_flight));

        let spawned = thread::Builder::new()
            .name("evidence-writer".into())
            .spawn(move || {
                let _guard = guard;
                let started = Instant::now();
                match sink.write_clip(&frames, fps) {
                    Ok(path) => {
                        counter!("evidence_saves_total").increment(1);
                        info!(
                            "Saved evidence clip {} ({} frames in {:?})",
                            path.display(),
                            frames.len(),
                            started.elapsed()
                        );
                    }
                    Err(e) => {
                        counter!("evidence_save_failures_total").increment(1);
                        error!("Evidence save failed: {}", e);
                    }
                }
            });

        // On spawn failure the closure, and the guard with it, is dropped
        match spawned {
            Ok(_) => TriggerOutcome::Started,
            Err(e) => {
                error!("Failed to start evidence writer: {}", e);
                counter!("evidence_save_failures_total").increment(1);
                TriggerOutcome::Busy
            }
        }
    }

    /// Wait up to `timeout` for an in-flight save. Returns true when idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.is_recording() {
            if Instant::now() >= deadline {
                warn!("Evidence writer still running after {:?}", timeout);
                return false;
            }
            thread::sleep(Duration::from_millis(20));
        }
        true
    }
}
