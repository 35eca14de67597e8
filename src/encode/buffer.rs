//! Growable record buffer with a per-client sizing hint.
//!
//! Records are assembled into a `RecordBuffer` that doubles its capacity
//! (plus the incoming run length) whenever an append would overflow. The
//! largest capacity any buffer ever reached is remembered in a `SizeHint`
//! owned by the client, so follow-up records start at a size that past
//! traffic actually needed instead of re-growing from scratch.

use bytes::Bytes;

/// Starting capacity before any record has been encoded.
pub const INITIAL_CAPACITY: usize = 0x100;

/// Largest buffer capacity a client has needed so far.
///
/// Scoped to one client on purpose: destinations with very different record
/// shapes must not inflate each other's allocations.
#[derive(Debug, Clone)]
pub struct SizeHint {
    largest: usize,
}

impl Default for SizeHint {
    fn default() -> Self {
        Self {
            largest: INITIAL_CAPACITY,
        }
    }
}

impl SizeHint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn largest(&self) -> usize {
        self.largest
    }

    pub fn observe(&mut self, capacity: usize) {
        if capacity > self.largest {
            self.largest = capacity;
        }
    }
}

/// Byte buffer for one in-progress batch of line-protocol records.
///
/// Capacity only grows while the buffer is alive; a fresh record starts
/// from a new buffer, never by shrinking an old one.
#[derive(Debug)]
pub struct RecordBuffer {
    data: Vec<u8>,
}

impl RecordBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Appends one run, doubling capacity (plus the run length) on overflow.
    pub fn append(&mut self, run: &[u8]) {
        let needed = self.data.len() + run.len();
        if needed > self.data.capacity() {
            let target = self.data.capacity() * 2 + run.len();
            self.data.reserve_exact(target - self.data.len());
        }
        self.data.extend_from_slice(run);
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn into_bytes(self) -> Bytes {
        Bytes::from(self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_tracks_length() {
        let mut buf = RecordBuffer::with_capacity(4);
        buf.append(b"abc");
        buf.append(b"def");
        assert_eq!(buf.len(), 6);
        assert_eq!(buf.as_bytes(), b"abcdef");
    }

    #[test]
    fn capacity_doubles_plus_run_on_overflow() {
        let mut buf = RecordBuffer::with_capacity(4);
        buf.append(b"abcd");
        assert_eq!(buf.capacity(), 4);
        buf.append(b"efgh");
        // 4 * 2 + 4 = 12
        assert!(buf.capacity() >= 12);
    }

    #[test]
    fn capacity_never_shrinks() {
        let mut buf = RecordBuffer::with_capacity(8);
        buf.append(&[b'x'; 100]);
        let grown = buf.capacity();
        buf.clear();
        assert_eq!(buf.capacity(), grown);
    }

    #[test]
    fn size_hint_is_monotone() {
        let mut hint = SizeHint::new();
        assert_eq!(hint.largest(), INITIAL_CAPACITY);
        hint.observe(1024);
        assert_eq!(hint.largest(), 1024);
        hint.observe(512);
        assert_eq!(hint.largest(), 1024);
    }
}
