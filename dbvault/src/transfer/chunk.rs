//! Part layout for chunked uploads.

use crate::error::{ArchiveError, Result};

pub const DEFAULT_PART_SIZE: u64 = 5 * 1024 * 1024;

/// S3 rejects multipart uploads with more parts than this.
pub const MAX_PARTS: u64 = 10_000;

/// Byte range `[offset, offset + len)` of 1-indexed part `part_number`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartRange {
    pub part_number: i32,
    pub offset: u64,
    pub len: u64,
}

impl PartRange {
    pub fn end(&self) -> u64 {
        self.offset + self.len
    }
}

/// Part size doubles as the single-put threshold: an artifact of at most
/// `part_size` bytes is stored with one put.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLayout {
    pub part_size: u64,
}

impl Default for ChunkLayout {
    fn default() -> Self {
        Self {
            part_size: DEFAULT_PART_SIZE,
        }
    }
}

impl ChunkLayout {
    pub fn new(part_size: u64) -> Self {
        Self { part_size }
    }

    pub fn is_multipart(&self, size: u64) -> bool {
        size > self.part_size
    }

    /// `None` for a zero part size.
    pub fn part_count(&self, size: u64) -> Option<u64> {
        (self.part_size > 0).then(|| size.div_ceil(self.part_size))
    }

    /// Splits `[0, size)` into parts. Fails for a zero part size or when the
    /// store's part limit would be exceeded.
    pub fn plan(&self, size: u64) -> Result<Vec<PartRange>> {
        let Some(count) = self.part_count(size) else {
            return Err(ArchiveError::InvalidLayout {
                size,
                reason: "part size must be positive".into(),
            });
        };
        if count > MAX_PARTS {
            return Err(ArchiveError::InvalidLayout {
                size,
                reason: format!(
                    "{count} parts of {} bytes exceeds the limit of {MAX_PARTS}",
                    self.part_size
                ),
            });
        }
        Ok((1..=count)
            .map(|n| {
                let offset = (n - 1) * self.part_size;
                let end = (n * self.part_size).min(size);
                PartRange {
                    part_number: n as i32,
                    offset,
                    len: end - offset,
                }
            })
            .collect())
    }
}
