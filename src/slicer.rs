//! Row Slicer: random-access reads over the data file guided by the sparse
//! index. Safe to call concurrently from many request handlers — the file
//! is mapped read-only and the index is immutable after publication, so no
//! locking is needed on the read path (spec.md §5, §9).

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use memchr::memchr;
use memmap2::Mmap;
use serde::Serialize;
use thiserror::Error;

use crate::index::Index;

/// Minimum initial read size, in bytes (spec.md §4.3).
pub const READ_BUFFER_SIZE: u64 = 32 * 1024;
/// Tuning constant for the initial read-size estimate: expected bytes per
/// row to cover `skip + rowCount` records.
const INITIAL_ROW_BYTES_ESTIMATE: u64 = 30;
/// Tuning constant for enlarging the buffer on an under-read retry.
const RETRY_ROW_BYTES_ESTIMATE: u64 = 50;

const LINE_TERMINATOR: u8 = b'\n';

#[derive(Debug, Error)]
pub enum SlicerError {
    #[error("io error opening data file {path}: {source}")]
    Open {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("io error memory-mapping data file {path}: {source}")]
    Map {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A rectangular slice of the logical table, ready to send to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SliceResponse {
    pub start_row: u64,
    pub row_count: u64,
    pub start_col: u64,
    pub col_count: u64,
    pub col_letters: Vec<String>,
    pub cells_by_row: Vec<Vec<String>>,
}

/// Random-access reader over one data file, guided by its sparse index.
pub struct Slicer {
    mmap: Mmap,
    index: Arc<Index>,
    n_cols: u64,
    field_separator: u8,
}

impl Slicer {
    /// Opens `data_path` as a read-only memory map and pairs it with
    /// `index`. `n_cols` is the configured column count (reference: 2).
    pub fn open<P: AsRef<Path>>(
        data_path: P,
        index: Arc<Index>,
        n_cols: u64,
    ) -> Result<Self, SlicerError> {
        let path = data_path.as_ref();
        let file = File::open(path).map_err(|source| SlicerError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let mmap = unsafe { Mmap::map(&file) }.map_err(|source| SlicerError::Map {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            mmap,
            index,
            n_cols,
            field_separator: b';',
        })
    }

    pub fn total_rows(&self) -> u64 {
        self.index.total_rows
    }

    pub fn n_cols(&self) -> u64 {
        self.n_cols
    }

    /// Serves `(startRow, rowCount, startCol, colCount)`, clamping every
    /// input per spec.md §4.3 before doing any I/O.
    pub fn get_slice(
        &self,
        start_row: i64,
        row_count: i64,
        start_col: i64,
        col_count: i64,
    ) -> SliceResponse {
        let total_rows = self.index.total_rows as i64;
        let n_cols = self.n_cols as i64;

        let clamped_start_row = if total_rows == 0 {
            0
        } else {
            start_row.clamp(0, total_rows - 1)
        };
        let max_row_count = if total_rows == 0 {
            0
        } else {
            total_rows - clamped_start_row
        };
        let clamped_row_count = row_count.max(0).min(max_row_count);

        let clamped_start_col = if n_cols == 0 { 0 } else { start_col.clamp(0, n_cols - 1) };
        let max_col_count = if n_cols == 0 { 0 } else { n_cols - clamped_start_col };
        let clamped_col_count = col_count.max(0).min(max_col_count);

        let col_letters: Vec<String> = (clamped_start_col..clamped_start_col + clamped_col_count)
            .map(column_letters)
            .collect();

        if clamped_row_count <= 0 {
            return SliceResponse {
                start_row: clamped_start_row as u64,
                row_count: 0,
                start_col: clamped_start_col as u64,
                col_count: clamped_col_count as u64,
                col_letters,
                cells_by_row: Vec::new(),
            };
        }

        let start_row = clamped_start_row as u64;
        let row_count = clamped_row_count as u64;
        let start_col = clamped_start_col as u64;
        let col_count = clamped_col_count as u64;

        let row_ranges = self.locate_and_read(start_row, row_count);
        let cells_by_row = row_ranges
            .iter()
            .map(|&(s, e)| self.project_columns(s, e, start_col, col_count))
            .collect();

        SliceResponse {
            start_row,
            row_count: row_ranges.len() as u64,
            start_col,
            col_count,
            col_letters,
            cells_by_row,
        }
    }

    /// Locates the anchor for `start_row`, then reads (retrying with a
    /// larger buffer as needed) until `row_count` records are collected or
    /// EOF is reached. Returns byte ranges `(start, end)` into the mapped
    /// file, one per row actually produced.
    fn locate_and_read(&self, start_row: u64, row_count: u64) -> Vec<(u64, u64)> {
        let k = self.index.anchor_index(start_row);
        let anchor = self.index.offsets[k];
        let skip = self.index.skip_within_anchor(start_row);
        let file_len = self.mmap.len() as u64;
        let max_len = file_len - anchor;

        let mut read_len = READ_BUFFER_SIZE
            .max(INITIAL_ROW_BYTES_ESTIMATE.saturating_mul(skip + row_count))
            .min(max_len);

        loop {
            let at_file_end = anchor + read_len >= file_len;
            let attempt = self.attempt(anchor, read_len, at_file_end, skip, row_count);
            if !attempt.needs_more || read_len >= max_len {
                return attempt.rows;
            }
            let missing = row_count - attempt.rows.len() as u64;
            // The plain `prevLength + 50*missing` growth from spec.md §4.3
            // converges in one step when `missing` reflects the true
            // average row size, but stalls when a single record is far
            // longer than that estimate (e.g. one huge cell). Doubling as a
            // floor guarantees the loop still reaches EOF in O(log n)
            // retries; spec.md §9 calls the constants tuning parameters,
            // not a contract.
            let next_len = read_len
                .saturating_mul(2)
                .max(read_len + RETRY_ROW_BYTES_ESTIMATE.saturating_mul(missing.max(1)))
                .min(max_len);
            if next_len == read_len {
                return attempt.rows;
            }
            read_len = next_len;
        }
    }

    /// One read-and-parse pass over `[anchor, anchor+read_len)`.
    fn attempt(
        &self,
        anchor: u64,
        read_len: u64,
        at_file_end: bool,
        skip: u64,
        want: u64,
    ) -> AttemptResult {
        let window_end = anchor + read_len;
        let mut pos = anchor;
        let mut remaining_skip = skip;

        while remaining_skip > 0 {
            match self.next_line_end(pos, window_end) {
                Some(lt_pos) => {
                    pos = lt_pos + 1;
                    remaining_skip -= 1;
                }
                None => {
                    if at_file_end {
                        // Nothing left to skip through; no rows to emit.
                        return AttemptResult {
                            rows: Vec::new(),
                            needs_more: false,
                        };
                    }
                    return AttemptResult {
                        rows: Vec::new(),
                        needs_more: true,
                    };
                }
            }
        }

        let mut rows = Vec::with_capacity(want as usize);
        while (rows.len() as u64) < want {
            match self.next_line_end(pos, window_end) {
                Some(lt_pos) => {
                    rows.push((pos, lt_pos));
                    pos = lt_pos + 1;
                }
                None => {
                    if at_file_end && pos < window_end {
                        rows.push((pos, window_end));
                        pos = window_end;
                    }
                    break;
                }
            }
        }

        let needs_more = (rows.len() as u64) < want && !at_file_end;
        AttemptResult { rows, needs_more }
    }

    #[inline]
    fn next_line_end(&self, from: u64, window_end: u64) -> Option<u64> {
        let window = &self.mmap[from as usize..window_end as usize];
        memchr(LINE_TERMINATOR, window).map(|rel| from + rel as u64)
    }

    /// Splits the record `[start, end)` on the first field separator into
    /// two fields, then selects/pads `[start_col, start_col+col_count)`.
    fn project_columns(&self, start: u64, end: u64, start_col: u64, col_count: u64) -> Vec<String> {
        let record = &self.mmap[start as usize..end as usize];
        let (before, after) = match memchr(self.field_separator, record) {
            Some(pos) => (&record[..pos], &record[pos + 1..]),
            None => (record, &record[record.len()..]),
        };
        let fields = [before, after];

        let mut out = Vec::with_capacity(col_count as usize);
        for i in 0..col_count {
            let idx = (start_col + i) as usize;
            match fields.get(idx) {
                Some(bytes) => out.push(String::from_utf8_lossy(bytes).into_owned()),
                None => out.push(String::new()),
            }
        }
        out
    }
}

struct AttemptResult {
    rows: Vec<(u64, u64)>,
    needs_more: bool,
}

/// Spreadsheet-style column label: `0 -> A, 25 -> Z, 26 -> AA, ...`
/// (base-26, "A = 0, no zero digit" convention).
pub fn column_letters(n: i64) -> String {
    let mut n = n;
    let mut chars = Vec::new();
    loop {
        let rem = n.rem_euclid(26) as u8;
        chars.push(b'A' + rem);
        n = n / 26 - 1;
        if n < 0 {
            break;
        }
    }
    chars.reverse();
    String::from_utf8(chars).expect("column letters are always ASCII")
}
