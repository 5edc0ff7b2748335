//! Process-wide stop signal

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Set once to ask the pipeline to finish its current cycle and exit
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
