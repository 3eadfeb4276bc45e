/// Fixed-capacity ring buffer with drop-oldest overflow.
///
/// Storage is allocated once; `head` indexes the oldest slot and `len` counts
/// occupied slots. The buffer never grows past `capacity`.
#[derive(Debug)]
pub struct RingBuffer<T> {
    slots: Vec<Option<T>>,
    head: usize,
    len: usize,
}

impl<T> RingBuffer<T> {
    /// Create a ring holding at most `capacity` items. A capacity of zero is
    /// raised to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    fn index(&self, offset: usize) -> usize {
        (self.head + offset) % self.capacity()
    }

    /// Append at the tail. When full, the oldest item is removed first and
    /// returned.
    pub fn push_back(&mut self, item: T) -> Option<T> {
        let evicted = if self.is_full() { self.pop_front() } else { None };
        let tail = self.index(self.len);
        self.slots[tail] = Some(item);
        self.len += 1;
        evicted
    }

    /// Insert at the head. When full, `item` would be the oldest entry and is
    /// handed back instead of being stored.
    pub fn push_front(&mut self, item: T) -> Option<T> {
        if self.is_full() {
            return Some(item);
        }
        self.head = (self.head + self.capacity() - 1) % self.capacity();
        self.slots[self.head] = Some(item);
        self.len += 1;
        None
    }

    pub fn pop_front(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let item = self.slots[self.head].take();
        self.head = self.index(1);
        self.len -= 1;
        item
    }

    pub fn front(&self) -> Option<&T> {
        if self.is_empty() {
            None
        } else {
            self.slots[self.head].as_ref()
        }
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.len).filter_map(move |offset| self.slots[self.index(offset)].as_ref())
    }
}
