/// Per-handle holding pen for bytes that were drained from the host input
/// stream but did not yet form a complete token (a split UTF-8 or DBCS
/// sequence, a VT sequence straddling two reads).
///
/// Capacity is fixed: any single sequence the decoder recognizes fits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingBytes {
    bytes: Vec<u8>,
}

pub const PENDING_CAPACITY: usize = 64;

impl PendingBytes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes; fails (leaving the buffer untouched) when the result
    /// would exceed capacity.
    pub fn append(&mut self, bytes: &[u8]) -> bool {
        if self.bytes.len() + bytes.len() > PENDING_CAPACITY {
            return false;
        }
        self.bytes.extend_from_slice(bytes);
        true
    }

    pub fn consume_prefix(&mut self, count: usize) {
        let count = count.min(self.bytes.len());
        self.bytes.drain(..count);
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Replace the contents with `bytes`, truncating at capacity. Used when
    /// a read parks its undecoded tail across a reply-pending wait; the
    /// tail is at most one partial sequence, which always fits.
    pub fn replace_with(&mut self, bytes: &[u8]) {
        self.bytes.clear();
        let keep = bytes.len().min(PENDING_CAPACITY);
        self.bytes.extend_from_slice(&bytes[..keep]);
    }
}
