//! Latest-frame mailbox between the pipeline and stream consumers
//!
//! The pipeline overwrites a single slot and never waits. Each subscriber
//! remembers the sequence number it last saw, so several viewers can follow
//! the same slot without stealing frames from each other.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

#[derive(Default)]
struct Slot {
    frame: Option<Arc<[u8]>>,
    seq: u64,
}

struct Shared {
    slot: Mutex<Slot>,
    fresh: Condvar,
    placeholder: Arc<[u8]>,
}

/// Producer side, cheap to clone
#[derive(Clone)]
pub struct FramePublisher {
    shared: Arc<Shared>,
}

/// What a subscriber got from one wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// A frame published since the previous wait
    Fresh(Arc<[u8]>),
    /// Timed out; the last frame this subscriber saw (or the placeholder)
    Backup(Arc<[u8]>),
}

impl Delivery {
    pub fn bytes(&self) -> &Arc<[u8]> {
        match self {
            Delivery::Fresh(b) | Delivery::Backup(b) => b,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, Delivery::Fresh(_))
    }
}

impl FramePublisher {
    /// `placeholder` is served to subscribers before the first frame arrives
    pub fn new(placeholder: Vec<u8>) -> Self {
        Self {
            shared: Arc::new(Shared {
                slot: Mutex::new(Slot::default()),
                fresh: Condvar::new(),
                placeholder: placeholder.into(),
            }),
        }
    }

    /// Replace the current frame and wake waiting subscribers
    pub fn publish(&self, jpeg: Vec<u8>) {
        let mut slot = self.shared.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.frame = Some(jpeg.into());
        slot.seq = slot.seq.wrapping_add(1);
        drop(slot);
        self.shared.fresh.notify_all();
    }

    /// Current frame without waiting
    pub fn latest(&self) -> Option<Arc<[u8]>> {
        self.shared
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .frame
            .clone()
    }

    /// Number of frames published so far
    pub fn sequence(&self) -> u64 {
        self.shared
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .seq
    }

    pub fn subscribe(&self) -> FrameSubscriber {
        FrameSubscriber {
            shared: Arc::clone(&self.shared),
            seen: 0,
            backup: Arc::clone(&self.shared.placeholder),
        }
    }
}

/// Consumer side; one per stream connection
pub struct FrameSubscriber {
    shared: Arc<Shared>,
    seen: u64,
    backup: Arc<[u8]>,
}

impl FrameSubscriber {
    /// Wait up to `timeout` for a frame this subscriber has not seen yet
    pub fn next(&mut self, timeout: Duration) -> Delivery {
        let seen = self.seen;
        let slot = self.shared.slot.lock().unwrap_or_else(PoisonError::into_inner);
        let (slot, _) = self
            .shared
            .fresh
            .wait_timeout_while(slot, timeout, |s| s.seq == seen)
            .unwrap_or_else(PoisonError::into_inner);

        match (&slot.frame, slot.seq != seen) {
            (Some(frame), true) => {
                self.seen = slot.seq;
                self.backup = Arc::clone(frame);
                Delivery::Fresh(Arc::clone(frame))
            }
            _ => Delivery::Backup(Arc::clone(&self.backup)),
        }
    }
}
