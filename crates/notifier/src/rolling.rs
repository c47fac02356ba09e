//! Fixed-capacity ring of call timestamps

/// Remembers the last `capacity` pushed values.
///
/// The slot after the write cursor always holds the oldest value, which
/// once the ring has wrapped is the value pushed `capacity` pushes ago.
#[derive(Debug, Clone)]
pub struct RollingWindowLimiter<T: Copy> {
    slots: Vec<Option<T>>,
    index: usize,
}

impl<T: Copy> RollingWindowLimiter<T> {
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "rolling window capacity must be non-zero");
        Self {
            slots: vec![None; capacity],
            index: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn oldest_index(&self) -> usize {
        (self.index + 1) % self.slots.len()
    }

    pub fn newest_index(&self) -> usize {
        self.index
    }

    pub fn push(&mut self, value: T) {
        self.index = self.oldest_index();
        self.slots[self.index] = Some(value);
    }

    /// `None` until the ring has filled once
    pub fn oldest(&self) -> Option<T> {
        self.slots[self.oldest_index()]
    }

    pub fn newest(&self) -> Option<T> {
        self.slots[self.index]
    }
}
