//! Ring Buffer Implementation

/// Fixed-capacity ring buffer that overwrites its oldest entry when full.
///
/// Storage is allocated once up front; pushing never reallocates.
pub struct RingBuffer<T> {
    /// Pre-allocated storage
    storage: Box<[Option<T>]>,
    /// Next write position
    head: usize,
    /// Number of occupied slots
    len: usize,
}

impl<T> RingBuffer<T> {
    /// Create a new ring buffer with given capacity (at least one slot)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let storage: Vec<Option<T>> = (0..capacity).map(|_| None).collect();
        Self {
            storage: storage.into_boxed_slice(),
            head: 0,
            len: 0,
        }
    }

    /// Push an item (overwrites oldest if full)
    pub fn push(&mut self, item: T) {
        self.storage[self.head] = Some(item);
        self.head = (self.head + 1) % self.capacity();
        self.len = (self.len + 1).min(self.capacity());
    }

    /// Number of items currently in the buffer
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get the buffer capacity
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Index of the oldest occupied slot
    fn tail(&self) -> usize {
        (self.head + self.capacity() - self.len) % self.capacity()
    }

    /// Iterate from oldest to newest
    fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        let tail = self.tail();
        (0..self.len).filter_map(move |i| self.storage[(tail + i) % self.capacity()].as_ref())
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Copy of the whole contents, oldest first
    pub fn snapshot(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_partial_fill_in_order() {
        let mut buffer = RingBuffer::new(10);
        for i in 0..5 {
            buffer.push(i * 100);
        }

        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.snapshot(), vec![0, 100, 200, 300, 400]);
    }

    #[test]
    fn test_overwrite_oldest() {
        let mut buffer = RingBuffer::new(5);
        for i in 0..10 {
            buffer.push(i);
        }

        assert_eq!(buffer.len(), buffer.capacity());
        assert_eq!(buffer.snapshot(), vec![5, 6, 7, 8, 9]);
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut buffer = RingBuffer::new(0);
        buffer.push(1);
        buffer.push(2);
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.snapshot(), vec![2]);
    }

    proptest! {
        #[test]
        fn prop_keeps_most_recent(capacity in 1usize..64, count in 0usize..256) {
            let mut buffer = RingBuffer::new(capacity);
            for i in 0..count {
                buffer.push(i);
            }

            let expected: Vec<usize> = (count.saturating_sub(capacity)..count).collect();
            prop_assert_eq!(buffer.len(), count.min(capacity));
            prop_assert_eq!(buffer.snapshot(), expected);
        }
    }
}
