use std::path::Path;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::TransferError;
use crate::types::{Chunk, PartRange};

// ---------------------------------------------------------------------------
// Partitioning
// ---------------------------------------------------------------------------

/// Number of parts a file of `file_size` bytes splits into.
pub fn total_parts(file_size: u64, part_size: u64) -> u64 {
    if part_size == 0 {
        return 0;
    }
    file_size.div_ceil(part_size)
}

/// Returns the ordered part ranges covering `[0, file_size)`.
///
/// Pure function of its inputs: calling it again restarts the sequence.
/// An empty file has no parts.
pub fn part_ranges(file_size: u64, part_size: u64) -> PartRanges {
    PartRanges {
        file_size,
        part_size,
        next: 0,
        total: total_parts(file_size, part_size),
    }
}

/// Iterator returned by [`part_ranges`].
#[derive(Debug, Clone)]
pub struct PartRanges {
    file_size: u64,
    part_size: u64,
    next: u64,
    total: u64,
}

impl Iterator for PartRanges {
    type Item = PartRange;

    fn next(&mut self) -> Option<PartRange> {
        if self.next >= self.total {
            return None;
        }
        let index = self.next;
        let start = index * self.part_size;
        let end = (start + self.part_size).min(self.file_size);
        self.next += 1;
        Some(PartRange { index, start, end })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.total - self.next) as usize;
        (left, Some(left))
    }
}

impl ExactSizeIterator for PartRanges {}

// ---------------------------------------------------------------------------
// PartReader
// ---------------------------------------------------------------------------

/// Reads a file sequentially, one part at a time.
///
/// The reader is the only handle on the source; chunks it yields own their
/// bytes and can be handed to other tasks.
pub struct PartReader<R> {
    reader: R,
    ranges: PartRanges,
    file_size: u64,
}

impl PartReader<tokio::fs::File> {
    /// Opens `path` for part-wise reading.
    pub async fn open(path: &Path, part_size: u64) -> Result<Self, TransferError> {
        let file = tokio::fs::File::open(path).await?;
        let file_size = file.metadata().await?.len();
        Ok(Self::new(file, file_size, part_size))
    }
}

impl<R: AsyncRead + Unpin> PartReader<R> {
    /// Wraps a reader positioned at offset 0 of a source of `file_size` bytes.
    pub fn new(reader: R, file_size: u64, part_size: u64) -> Self {
        Self {
            reader,
            ranges: part_ranges(file_size, part_size),
            file_size,
        }
    }

    /// Reads the next part. Returns `None` once every part has been read.
    pub async fn next_part(&mut self) -> Result<Option<Chunk>, TransferError> {
        let Some(range) = self.ranges.next() else {
            return Ok(None);
        };

        let mut data = vec![0u8; range.len() as usize];
        match self.reader.read_exact(&mut data).await {
            Ok(_) => Ok(Some(Chunk { range, data })),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Err(TransferError::ShortRead {
                    offset: range.start,
                    expected: range.len(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Total source size in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Parts not yet read.
    pub fn remaining_parts(&self) -> u64 {
        self.ranges.len() as u64
    }
}
