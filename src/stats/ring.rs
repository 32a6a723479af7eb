//! Fixed-capacity history ring.

/// Circular buffer holding the most recent `capacity` values.
///
/// Pushing into a full ring overwrites the oldest value.
#[derive(Debug, Clone)]
pub struct HistoryRing<T> {
    slots: Box<[Option<T>]>,
    /// Index of the next write.
    head: usize,
    count: usize,
}

impl<T> HistoryRing<T> {
    /// Creates an empty ring; a capacity of zero is raised to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: std::iter::repeat_with(|| None).take(capacity).collect(),
            head: 0,
            count: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == self.slots.len()
    }

    /// Appends `value`, returning the value it displaced when full.
    pub fn push(&mut self, value: T) -> Option<T> {
        let displaced = self.slots[self.head].replace(value);
        self.head = (self.head + 1) % self.slots.len();
        self.count = (self.count + 1).min(self.slots.len());
        displaced
    }

    fn oldest_index(&self) -> usize {
        (self.head + self.slots.len() - self.count) % self.slots.len()
    }

    pub fn oldest(&self) -> Option<&T> {
        self.iter().next()
    }

    pub fn newest(&self) -> Option<&T> {
        if self.count == 0 {
            return None;
        }
        let index = (self.head + self.slots.len() - 1) % self.slots.len();
        self.slots[index].as_ref()
    }

    /// Iterates from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        let start = self.oldest_index();
        (0..self.count).filter_map(move |offset| {
            self.slots[(start + offset) % self.slots.len()].as_ref()
        })
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.head = 0;
        self.count = 0;
    }
}
