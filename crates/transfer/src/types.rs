use std::fmt;
use std::str::FromStr;

use crate::TransferError;

/// Byte range of one part within the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartRange {
    /// 0-based part index; defines byte order.
    pub index: u64,
    /// First byte offset (inclusive).
    pub start: u64,
    /// One past the last byte offset (exclusive).
    pub end: u64,
}

impl PartRange {
    /// Number of bytes covered.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Range header for this part within an archive of `total` bytes.
    pub fn content_range(&self, total: u64) -> ContentRange {
        ContentRange {
            first: self.start,
            last: self.end.saturating_sub(1),
            total,
        }
    }
}

/// A `bytes {first}-{last}/{total}` range header, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub first: u64,
    pub last: u64,
    pub total: u64,
}

impl ContentRange {
    /// Number of bytes covered.
    pub fn byte_count(&self) -> u64 {
        self.last - self.first + 1
    }
}

impl fmt::Display for ContentRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bytes {}-{}/{}", self.first, self.last, self.total)
    }
}

impl FromStr for ContentRange {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TransferError::InvalidRange(s.to_string());

        let spec = s.trim().strip_prefix("bytes ").ok_or_else(invalid)?;
        let (span, total) = spec.split_once('/').ok_or_else(invalid)?;
        let (first, last) = span.split_once('-').ok_or_else(invalid)?;

        let first: u64 = first.parse().map_err(|_| invalid())?;
        let last: u64 = last.parse().map_err(|_| invalid())?;
        let total: u64 = total.parse().map_err(|_| invalid())?;

        if first > last || last >= total {
            return Err(invalid());
        }
        Ok(Self { first, last, total })
    }
}

/// One part read from the source file, ready to be uploaded.
///
/// The payload is owned by whoever processes the chunk and dropped once the
/// upload attempt finishes.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub range: PartRange,
    pub data: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_range_formats_inclusive_bounds() {
        let range = PartRange {
            index: 1,
            start: 4194304,
            end: 8388608,
        };
        assert_eq!(
            range.content_range(10485760).to_string(),
            "bytes 4194304-8388607/10485760"
        );
    }

    #[test]
    fn content_range_parses() {
        let r: ContentRange = "bytes 0-1048575/3000000".parse().unwrap();
        assert_eq!(r.first, 0);
        assert_eq!(r.last, 1048575);
        assert_eq!(r.total, 3000000);
        assert_eq!(r.byte_count(), 1048576);
    }

    #[test]
    fn content_range_rejects_malformed() {
        for bad in [
            "",
            "0-10/20",
            "bytes 10-0/20",
            "bytes 0-20/20",
            "bytes a-b/c",
            "bytes 0-10",
            "items 0-1/2",
        ] {
            assert!(bad.parse::<ContentRange>().is_err(), "{bad:?} parsed");
        }
    }
}
