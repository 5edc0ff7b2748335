//! Worker-eye assignment
//!
//! Splits a cycle's detections into the eyes of the monitored operator and
//! everything else. Identity is positional and recomputed every detection
//! cycle; no track IDs survive between cycles.

use serde::{Deserialize, Serialize};

use crate::detector::BoundingBox;

/// How many worker eyes must agree before the alert fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicMode {
    /// Both eyes must show sustained closure
    #[default]
    Dual,
    /// The single most-central eye decides (side profiles, partial faces)
    Single,
}

impl LogicMode {
    /// Config encoding: 0 = dual, 1 = single. Anything else is dual.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => LogicMode::Single,
            _ => LogicMode::Dual,
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            LogicMode::Dual => 0,
            LogicMode::Single => 1,
        }
    }

    /// Number of eye statuses the combination rule requires
    pub fn required_eyes(&self) -> usize {
        match self {
            LogicMode::Dual => 2,
            LogicMode::Single => 1,
        }
    }
}

/// Per-cycle positional identity of a worker eye
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EyeSlot {
    Left,
    Right,
}

impl EyeSlot {
    pub const ALL: [EyeSlot; 2] = [EyeSlot::Left, EyeSlot::Right];

    pub fn index(&self) -> usize {
        match self {
            EyeSlot::Left => 0,
            EyeSlot::Right => 1,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EyeSlot::Left => "left",
            EyeSlot::Right => "right",
        }
    }
}

/// Worker eyes (ordered left to right) and the remaining detections
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assignment {
    pub worker: Vec<BoundingBox>,
    pub other: Vec<BoundingBox>,
}

impl Assignment {
    pub fn is_empty(&self) -> bool {
        self.worker.is_empty()
    }

    /// Worker boxes paired with their slot
    pub fn slots(&self) -> impl Iterator<Item = (EyeSlot, &BoundingBox)> {
        EyeSlot::ALL.into_iter().zip(self.worker.iter())
    }

    pub fn has_slot(&self, slot: EyeSlot) -> bool {
        slot.index() < self.worker.len()
    }
}

/// Anchor on the detection nearest the frame centre and, in dual mode,
/// pair it with the nearest detection at roughly the same height.
pub fn assign(boxes: &[BoundingBox], frame_width: u32, frame_height: u32, mode: LogicMode) -> Assignment {
    if boxes.is_empty() {
        return Assignment::default();
    }

    let (fcx, fcy) = ((frame_width / 2) as i64, (frame_height / 2) as i64);
    let mut ranked: Vec<&BoundingBox> = boxes.iter().collect();
    // Stable: equal distances keep detection order
    ranked.sort_by_key(|b| {
        let (cx, cy) = b.center();
        let (dx, dy) = (cx as i64 - fcx, cy as i64 - fcy);
        dx * dx + dy * dy
    });

    let primary = *ranked[0];
    let remaining = &ranked[1..];

    if mode == LogicMode::Single {
        return Assignment {
            worker: vec![primary],
            other: remaining.iter().map(|b| **b).collect(),
        };
    }

    let (pcx, pcy) = primary.center();
    let max_y_diff = primary.height() as f64 * 1.5;
    let partner = remaining
        .iter()
        .position(|c| ((c.center().1 - pcy).abs() as f64) < max_y_diff);

    match partner {
        Some(idx) => {
            let mate = *remaining[idx];
            let worker = if pcx < mate.center().0 {
                vec![primary, mate]
            } else {
                vec![mate, primary]
            };
            let other = remaining
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != idx)
                .map(|(_, b)| **b)
                .collect();
            Assignment { worker, other }
        }
        None => Assignment {
            worker: vec![primary],
            other: remaining.iter().map(|b| **b).collect(),
        },
    }
}
