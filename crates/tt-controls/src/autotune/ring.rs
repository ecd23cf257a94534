//! Fixed-capacity circular buffer with newest-first indexing.

/// Circular buffer over an inline array.
///
/// Logical index 0 is the most recent entry. Pushing into a full buffer
/// evicts the oldest entry. The usable length can be set below `CAP` with
/// [`with_limit`](Self::with_limit).
#[derive(Debug, Clone, PartialEq)]
pub struct RingBuffer<T, const CAP: usize> {
    items: [T; CAP],
    head: usize,
    len: usize,
    limit: usize,
}

impl<T: Copy + Default, const CAP: usize> Default for RingBuffer<T, CAP> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + Default, const CAP: usize> RingBuffer<T, CAP> {
    pub fn new() -> Self {
        Self::with_limit(CAP)
    }

    /// Buffer holding at most `limit` entries, bounded to `1..=CAP`.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            items: [T::default(); CAP],
            head: 0,
            len: 0,
            limit: limit.min(CAP).max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.limit
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.limit
    }

    /// Insert `value` as the newest entry.
    pub fn push(&mut self, value: T) {
        self.head = (self.head + self.limit - 1) % self.limit;
        self.items[self.head] = value;
        if self.len < self.limit {
            self.len += 1;
        }
    }

    /// Entry `index` steps back from the newest.
    pub fn get(&self, index: usize) -> Option<T> {
        (index < self.len).then(|| self.items[self.slot(index)])
    }

    pub fn front(&self) -> Option<T> {
        self.get(0)
    }

    pub fn front_mut(&mut self) -> Option<&mut T> {
        if self.len == 0 {
            return None;
        }
        Some(&mut self.items[self.head])
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    /// Entries from newest to oldest.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        (0..self.len).map(move |i| self.items[self.slot(i)])
    }

    pub fn for_each_mut(&mut self, mut f: impl FnMut(&mut T)) {
        for i in 0..self.len {
            let slot = self.slot(i);
            f(&mut self.items[slot]);
        }
    }

    fn slot(&self, index: usize) -> usize {
        (self.head + index) % self.limit
    }
}
