//! The sparse row index: `(totalRows, granularity, offsets[])`.
//!
//! `offsets[k]` is the byte offset of the first byte of record `k * granularity`.
//! `offsets[0]` is always `0`. The index never changes after it is built or
//! loaded; the slicer holds it behind a shared, read-only reference.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("index file {path} is missing its {expected}-byte header")]
    TruncatedHeader {
        path: std::path::PathBuf,
        expected: usize,
    },
    #[error("index file {path} has bad magic (expected {expected:?}, found {found:?})")]
    BadMagic {
        path: std::path::PathBuf,
        expected: [u8; 4],
        found: [u8; 4],
    },
    #[error("index file {path} has unsupported format version {found} (expected {expected})")]
    UnsupportedVersion {
        path: std::path::PathBuf,
        expected: u8,
        found: u8,
    },
    #[error("index file {path} body length {len} is not a multiple of 8 bytes")]
    MisalignedBody { path: std::path::PathBuf, len: usize },
    #[error("index file {path} declares {expected} offsets but only {found} are present")]
    OffsetCountMismatch {
        path: std::path::PathBuf,
        expected: usize,
        found: usize,
    },
}

/// A complete sparse row index for one data file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    pub total_rows: u64,
    pub granularity: u64,
    pub offsets: Vec<u64>,
    /// Data-file length and modification time observed at build time, used
    /// by the codec as a stronger freshness check than the row-count bucket
    /// alone (see `codec::is_fresh`).
    pub source_len: u64,
    pub source_mtime: Option<u64>,
}

impl Index {
    /// Anchor index `k = floor(row / granularity)` for a given row.
    #[inline]
    pub fn anchor_index(&self, row: u64) -> usize {
        (row / self.granularity) as usize
    }

    /// Records to skip past the anchor before reaching `row`.
    #[inline]
    pub fn skip_within_anchor(&self, row: u64) -> u64 {
        row % self.granularity
    }

    /// Byte offset of the anchor covering `row`, or `None` if `row` is out
    /// of the indexed range.
    pub fn anchor_offset(&self, row: u64) -> Option<u64> {
        self.offsets.get(self.anchor_index(row)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Index {
        Index {
            total_rows: 5,
            granularity: 2,
            offsets: vec![0, 26, 57],
            source_len: 69,
            source_mtime: None,
        }
    }

    #[test]
    fn anchor_arithmetic() {
        let idx = sample();
        assert_eq!(idx.anchor_index(0), 0);
        assert_eq!(idx.anchor_index(1), 0);
        assert_eq!(idx.anchor_index(2), 1);
        assert_eq!(idx.anchor_index(4), 2);
        assert_eq!(idx.skip_within_anchor(3), 1);
        assert_eq!(idx.anchor_offset(4), Some(57));
        assert_eq!(idx.anchor_offset(100), None);
    }

    #[test]
    fn offsets_strictly_increasing_and_bounded() {
        let idx = sample();
        for w in idx.offsets.windows(2) {
            assert!(w[0] < w[1]);
        }
        assert!(*idx.offsets.last().unwrap() < idx.source_len);
    }
}
