//! DMS configuration

use serde::{Deserialize, Serialize};

use crate::assigner::LogicMode;

/// DMS configuration
///
/// Everything except the model paths can change between cycles; the
/// pipeline rebuilds this from the config store and hands it to
/// [`DmsModule::update_config`](crate::DmsModule::update_config).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DmsConfig {
    /// Detector confidence cutoff
    pub conf_threshold: f32,

    /// Detector NMS overlap cutoff
    pub iou_threshold: f32,

    /// Smoothed open-probability at or below which an eye counts as closed
    pub eye_closed_threshold: f32,

    /// Continuous closure before an eye is considered drowsy (seconds)
    pub drowsy_time_threshold_s: f64,

    /// Which worker eyes must agree before alerting
    pub logic_mode: LogicMode,

    /// Run the detector every Nth cycle, reusing boxes in between
    pub detect_every: u32,

    /// Consecutive empty cycles before tracker state is force-cleared
    pub max_missing_cycles: u32,

    /// Square detector input size
    pub yolo_img_size: u32,

    /// Square classifier input size
    pub eye_img_size: u32,

    /// Model paths
    pub yolo_model_path: Option<String>,
    pub eye_model_path: Option<String>,
}

impl Default for DmsConfig {
    fn default() -> Self {
        Self {
            conf_threshold: 0.3,
            iou_threshold: 0.35,
            eye_closed_threshold: 0.8,
            drowsy_time_threshold_s: 2.0,
            logic_mode: LogicMode::Dual,
            detect_every: 2,
            max_missing_cycles: 15,
            yolo_img_size: 224,
            eye_img_size: 128,
            yolo_model_path: None,
            eye_model_path: None,
        }
    }
}
