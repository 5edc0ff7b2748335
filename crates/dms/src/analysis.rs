//! DMS analysis results

use serde::{Deserialize, Serialize};

use crate::assigner::EyeSlot;
use crate::detector::BoundingBox;
use crate::state::EyeState;

/// One classified worker eye
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EyeObservation {
    pub slot: EyeSlot,

    /// Region the classifier saw (detection extended downward, frame-clamped)
    pub bbox: BoundingBox,

    /// Smoothed decision
    pub state: EyeState,

    /// Window mean of the open-probability
    pub probability: f32,

    /// Closed for at least the drowsy threshold
    pub sustained: bool,
}

/// Complete result of one pipeline cycle
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DmsAnalysis {
    /// Whether the detector ran this cycle (false on frame-skip cycles)
    pub detection_ran: bool,

    /// Classified worker eyes, left to right
    pub workers: Vec<EyeObservation>,

    /// Detections not attributed to the operator
    pub others: Vec<BoundingBox>,

    /// Combined alert state after this cycle
    pub drowsy: bool,

    /// Consecutive cycles without worker eyes
    pub missing_cycles: u32,

    /// The missing-eye watchdog cleared all state this cycle
    pub watchdog_tripped: bool,
}

impl DmsAnalysis {
    pub fn has_workers(&self) -> bool {
        !self.workers.is_empty()
    }

    pub fn closed_eyes(&self) -> usize {
        self.workers
            .iter()
            .filter(|w| w.state == EyeState::Closed)
            .count()
    }
}
