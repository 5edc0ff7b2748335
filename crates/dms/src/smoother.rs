//! Trailing-window smoothing of classifier output

use std::collections::VecDeque;

use crate::assigner::EyeSlot;
use crate::state::EyeState;

/// Samples kept per eye slot
pub const SMOOTHING_WINDOW: usize = 5;

/// Per-slot FIFO of open-probabilities, averaged without weighting
#[derive(Debug, Clone)]
pub struct TemporalSmoother {
    windows: [VecDeque<f32>; 2],
    capacity: usize,
}

impl Default for TemporalSmoother {
    fn default() -> Self {
        Self::new(SMOOTHING_WINDOW)
    }
}

impl TemporalSmoother {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            windows: [
                VecDeque::with_capacity(capacity),
                VecDeque::with_capacity(capacity),
            ],
            capacity,
        }
    }

    /// Append a sample and return the window mean
    pub fn push(&mut self, slot: EyeSlot, probability: f32) -> f32 {
        let window = &mut self.windows[slot.index()];
        if window.len() == self.capacity {
            window.pop_front();
        }
        window.push_back(probability);
        window.iter().sum::<f32>() / window.len() as f32
    }

    /// Append a sample and decide: open iff the mean exceeds `closed_threshold`
    pub fn update(&mut self, slot: EyeSlot, probability: f32, closed_threshold: f32) -> (EyeState, f32) {
        let mean = self.push(slot, probability);
        let state = if mean > closed_threshold {
            EyeState::Open
        } else {
            EyeState::Closed
        };
        (state, mean)
    }

    pub fn len(&self, slot: EyeSlot) -> usize {
        self.windows[slot.index()].len()
    }

    pub fn clear(&mut self, slot: EyeSlot) {
        self.windows[slot.index()].clear();
    }

    pub fn clear_all(&mut self) {
        for window in self.windows.iter_mut() {
            window.clear();
        }
    }
}
