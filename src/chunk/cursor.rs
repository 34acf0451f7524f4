use bytes::Bytes;
use std::ops::Range;

/// One byte range of the file, addressed by the index the server asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slice {
    pub index: u64,
    pub data: Bytes,
}

/// Slice arithmetic for one upload. Only the session that owns it moves it,
/// and only when the server names an index.
#[derive(Debug, Clone)]
pub struct SliceCursor {
    bytes: Bytes,
    chunk_size: usize,
    next_index: u64,
}

impl SliceCursor {
    pub fn new(bytes: Bytes, chunk_size: usize) -> Self {
        Self {
            bytes,
            chunk_size: chunk_size.max(1),
            next_index: 0,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn total_size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Index the cursor expects the server to ask for next.
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Number of slices the file splits into (at least one, even when empty).
    pub fn slice_count(&self) -> u64 {
        let len = self.bytes.len() as u64;
        let chunk = self.chunk_size as u64;
        len.div_ceil(chunk).max(1)
    }

    /// `[index*chunk, index*chunk + chunk)` clamped to the file length.
    pub fn range(&self, index: u64) -> Range<usize> {
        let len = self.bytes.len();
        let start = usize::try_from(index)
            .ok()
            .and_then(|i| i.checked_mul(self.chunk_size))
            .map_or(len, |s| s.min(len));
        let end = start.saturating_add(self.chunk_size).min(len);
        start..end
    }

    /// Cut the slice the server asked for and move the cursor past it.
    pub fn take(&mut self, index: u64) -> Slice {
        let data = self.bytes.slice(self.range(index));
        self.next_index = index.saturating_add(1);
        Slice { index, data }
    }

    /// Percentage reported after sending slice `index`.
    ///
    /// The seed slice (index 0) reports nothing, and 100 is reserved for the
    /// server's end-of-transfer event.
    pub fn progress_for(&self, index: u64) -> Option<u8> {
        if index == 0 || self.bytes.is_empty() {
            return None;
        }
        let sent = index as f64 * self.chunk_size as f64;
        let percent = (sent / self.bytes.len() as f64 * 100.0).round();
        Some(percent.clamp(0.0, 99.0) as u8)
    }
}
