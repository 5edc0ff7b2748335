//! Driver Monitoring System (DMS)
//!
//! Per-cycle operator eye analysis:
//! - Eye detection (frame-skipped) and worker-eye assignment
//! - Open/closed classification with temporal smoothing
//! - Sustained-closure timers combined into a single drowsiness flag
//! - Missing-eye watchdog

pub mod analysis;
pub mod assigner;
pub mod config;
pub mod detector;
pub mod smoother;
pub mod state;

pub use analysis::{DmsAnalysis, EyeObservation};
pub use assigner::{assign, Assignment, EyeSlot, LogicMode};
pub use config::DmsConfig;
pub use detector::{BoundingBox, EyeClassifier, EyeDetector, OnnxEyeClassifier, YoloEyeDetector};
pub use smoother::{TemporalSmoother, SMOOTHING_WINDOW};
pub use state::{DrowsinessTracker, EyeState};

use camera_capture::{Selection, VideoFrame};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, warn};

/// DMS error types
#[derive(Error, Debug)]
pub enum DmsError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Image processing failed: {0}")]
    ImageProcessing(String),
}

/// Driver monitoring module
pub struct DmsModule {
    config: DmsConfig,
    detector: Box<dyn EyeDetector>,
    classifier: Box<dyn EyeClassifier>,
    smoother: TemporalSmoother,
    tracker: DrowsinessTracker,
    assignment: Assignment,
    cycle: u64,
}

impl DmsModule {
    /// Load the ONNX models named in `config`
    pub fn from_config(config: DmsConfig) -> Result<Self, DmsError> {
        let detector = YoloEyeDetector::new(&config)?;
        let classifier = OnnxEyeClassifier::new(&config)?;
        Ok(Self::new(config, Box::new(detector), Box::new(classifier)))
    }

    /// Build around any detector/classifier pair
    pub fn new(config: DmsConfig, detector: Box<dyn EyeDetector>, classifier: Box<dyn EyeClassifier>) -> Self {
        let tracker = DrowsinessTracker::new(config.drowsy_time_threshold_s, config.max_missing_cycles);
        Self {
            config,
            detector,
            classifier,
            smoother: TemporalSmoother::default(),
            tracker,
            assignment: Assignment::default(),
            cycle: 0,
        }
    }

    pub fn config(&self) -> &DmsConfig {
        &self.config
    }

    /// Apply runtime-tunable parameters. Model paths and sizes are ignored.
    pub fn update_config(&mut self, config: DmsConfig) {
        if config.conf_threshold != self.config.conf_threshold
            || config.iou_threshold != self.config.iou_threshold
        {
            self.detector
                .set_thresholds(config.conf_threshold, config.iou_threshold);
        }
        if config.drowsy_time_threshold_s != self.config.drowsy_time_threshold_s {
            self.tracker.set_threshold(config.drowsy_time_threshold_s);
        }
        self.tracker.set_max_missing_cycles(config.max_missing_cycles);

        self.config = DmsConfig {
            yolo_model_path: self.config.yolo_model_path.take(),
            eye_model_path: self.config.eye_model_path.take(),
            yolo_img_size: self.config.yolo_img_size,
            eye_img_size: self.config.eye_img_size,
            ..config
        };
    }

    /// Analyze one cycle.
    ///
    /// `frame` is the full camera frame; `selection` is what the detector
    /// sees. Only a detector failure is returned as an error, and it leaves
    /// the cycle counter untouched so detection is retried next cycle.
    /// Per-eye classification failures skip that eye.
    pub fn analyze(&mut self, frame: &VideoFrame, selection: &Selection<'_>, now: Instant) -> Result<DmsAnalysis, DmsError> {
        let detection_ran = self.cycle % u64::from(self.config.detect_every.max(1)) == 0;
        if detection_ran {
            let (dx, dy) = selection.offset;
            let boxes: Vec<BoundingBox> = self
                .detector
                .detect(&selection.frame)?
                .into_iter()
                .map(|b| b.translate(dx, dy))
                .collect();
            self.assignment = assign(&boxes, frame.width, frame.height, self.config.logic_mode);
            debug!(
                "Detected {} boxes: {} worker, {} other",
                boxes.len(),
                self.assignment.worker.len(),
                self.assignment.other.len()
            );
        }
        self.cycle = self.cycle.wrapping_add(1);

        let mut analysis = DmsAnalysis {
            detection_ran,
            others: self.assignment.other.clone(),
            ..Default::default()
        };

        if self.assignment.is_empty() {
            self.smoother.clear_all();
            analysis.watchdog_tripped = self.tracker.mark_missing();
            analysis.missing_cycles = self.tracker.missing_cycles();
            analysis.drowsy = self.tracker.is_drowsy();
            return Ok(analysis);
        }
        self.tracker.mark_present();

        for slot in EyeSlot::ALL {
            if !self.assignment.has_slot(slot) {
                self.smoother.clear(slot);
            }
        }

        let threshold = self.config.eye_closed_threshold;
        let mut sustained = Vec::with_capacity(2);
        let workers: Vec<(EyeSlot, BoundingBox)> =
            self.assignment.slots().map(|(slot, b)| (slot, *b)).collect();

        for (slot, detection) in workers {
            let Some(bbox) = detection.eye_crop(frame.width, frame.height) else {
                debug!("Skipping degenerate {} eye crop", slot.label());
                continue;
            };
            let Some(crop) = frame.crop(
                bbox.x1 as u32,
                bbox.y1 as u32,
                bbox.width() as u32,
                bbox.height() as u32,
            ) else {
                continue;
            };

            let raw = match self.classifier.predict(&crop, threshold) {
                Ok((_, probability)) => probability,
                Err(e) => {
                    warn!("Classifier failed for {} eye: {}", slot.label(), e);
                    continue;
                }
            };

            let (state, probability) = self.smoother.update(slot, raw, threshold);
            let is_sustained = self.tracker.update_slot(slot, state, now);
            sustained.push(is_sustained);
            analysis.workers.push(EyeObservation {
                slot,
                bbox,
                state,
                probability,
                sustained: is_sustained,
            });
        }

        analysis.drowsy = self.tracker.resolve(&sustained, self.config.logic_mode);
        Ok(analysis)
    }

    /// Reset driver state (on driver change)
    pub fn reset_state(&mut self) {
        self.tracker.reset();
        self.smoother.clear_all();
        self.assignment = Assignment::default();
        self.cycle = 0;
    }
}
