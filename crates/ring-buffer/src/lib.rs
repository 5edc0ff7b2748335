//! Ring Buffer
//!
//! Fixed-capacity storage that keeps the most recent N items, used for the
//! pre-alert frame window of the evidence recorder.

mod buffer;

pub use buffer::RingBuffer;
