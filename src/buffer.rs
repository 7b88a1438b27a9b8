//! Limited chunk buffer.

/// Buffer limited by records count.
pub struct LimitedBuffer<T> {
    limit: usize,
    inner: Vec<T>,
}

impl<T> LimitedBuffer<T> {
    pub fn new(limit: usize) -> Self {
        LimitedBuffer {
            limit,
            inner: Vec::new(),
        }
    }

    /// Adds a new element to the buffer.
    pub fn push(&mut self, item: T) {
        debug_assert!(!self.is_full(), "buffer limit exceeded");
        self.inner.push(item);
    }

    /// Returns buffer length
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Checks if the buffer reached the limit.
    pub fn is_full(&self) -> bool {
        self.inner.len() >= self.limit
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Buffered items, to be reordered in place.
    pub fn items_mut(&mut self) -> &mut Vec<T> {
        &mut self.inner
    }

    /// Takes buffered items out leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<T> {
        std::mem::take(&mut self.inner)
    }
}

impl<T> IntoIterator for LimitedBuffer<T> {
    type Item = T;
    type IntoIter = <Vec<T> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}
