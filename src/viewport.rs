//! Viewport Translator: a pure function mapping a client's pixel viewport to
//! a canonical row/column slice request. Holds no state and performs no I/O.

use serde::Deserialize;

/// Hard upper bound on rows in a single slice, regardless of viewport size.
pub const MAX_ROWS_PER_SLICE: u64 = 1000;
/// Hard upper bound on columns in a single slice, regardless of viewport size.
pub const MAX_COLS_PER_SLICE: u64 = 200;

/// A client's visible pixel window plus buffer margins, exactly as carried
/// by a `slice_request` message.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Viewport {
    pub screen_width: u64,
    pub screen_height: u64,
    pub default_column_width: u64,
    pub default_row_height: u64,
    pub scroll_left: u64,
    pub scroll_top: u64,
    pub horizontal_buffer: u64,
    pub vertical_buffer: u64,
}

/// Canonical slice parameters a viewport resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceParams {
    pub start_row: u64,
    pub row_count: u64,
    pub start_col: u64,
    pub col_count: u64,
}

/// Maps `viewport` to `(startRow, rowCount, startCol, colCount)` against a
/// table of `max_rows` rows and `max_cols` columns. Pure and idempotent:
/// calling twice with the same inputs returns the same result, and
/// increasing `scroll_top`/`scroll_left` never decreases `start_row`/
/// `start_col` (spec.md §8, invariant 6).
pub fn compute_slice_params(viewport: &Viewport, max_rows: u64, max_cols: u64) -> SliceParams {
    let raw_start_row = row_height_division(viewport.scroll_top, viewport.default_row_height);
    let start_row = if max_rows == 0 { 0 } else { raw_start_row.min(max_rows - 1) };

    let visible_rows = ceil_div(viewport.screen_height, viewport.default_row_height);
    let row_count = visible_rows
        .saturating_add(2 * viewport.vertical_buffer)
        .min(max_rows.saturating_sub(start_row))
        .min(MAX_ROWS_PER_SLICE);

    let start_col = row_height_division(viewport.scroll_left, viewport.default_column_width);
    let start_col = if max_cols == 0 { 0 } else { start_col.min(max_cols - 1) };

    let visible_cols = ceil_div(viewport.screen_width, viewport.default_column_width);
    let col_count = visible_cols
        .saturating_add(2 * viewport.horizontal_buffer)
        .min(max_cols.saturating_sub(start_col))
        .min(MAX_COLS_PER_SLICE);

    SliceParams {
        start_row,
        row_count,
        start_col,
        col_count,
    }
}

#[inline]
fn row_height_division(pixels: u64, cell_size: u64) -> u64 {
    if cell_size == 0 {
        0
    } else {
        pixels / cell_size
    }
}

#[inline]
fn ceil_div(a: u64, b: u64) -> u64 {
    if b == 0 {
        0
    } else {
        (a + b - 1) / b
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_viewport() -> Viewport {
        Viewport {
            screen_width: 1000,
            screen_height: 480,
            horizontal_buffer: 2,
            vertical_buffer: 5,
            default_column_width: 100,
            default_row_height: 24,
            scroll_left: 0,
            scroll_top: 0,
        }
    }

    #[test]
    fn seed_scenario_clamps_to_table_bounds() {
        let params = compute_slice_params(&seed_viewport(), 5, 2);
        assert_eq!(
            params,
            SliceParams {
                start_row: 0,
                row_count: 5,
                start_col: 0,
                col_count: 2,
            }
        );
    }

    #[test]
    fn unbounded_table_respects_safety_caps() {
        let params = compute_slice_params(&seed_viewport(), 1_000_000, 1_000_000);
        // visible_rows = ceil(480/24) = 20; +2*5 = 30, far under the 1000 cap.
        assert_eq!(params.row_count, 30);
        // visible_cols = ceil(1000/100) = 10; +2*2 = 14, far under the 200 cap.
        assert_eq!(params.col_count, 14);
    }

    #[test]
    fn safety_caps_bound_huge_buffers() {
        let mut vp = seed_viewport();
        vp.vertical_buffer = 10_000;
        vp.horizontal_buffer = 10_000;
        let params = compute_slice_params(&vp, 1_000_000, 1_000_000);
        assert_eq!(params.row_count, MAX_ROWS_PER_SLICE);
        assert_eq!(params.col_count, MAX_COLS_PER_SLICE);
    }

    #[test]
    fn idempotent_under_unchanged_inputs() {
        let vp = seed_viewport();
        let a = compute_slice_params(&vp, 5, 2);
        let b = compute_slice_params(&vp, 5, 2);
        assert_eq!(a, b);
    }

    #[test]
    fn monotonic_in_scroll_top() {
        let mut vp = seed_viewport();
        let mut last_start_row = 0;
        for scroll_top in [0u64, 100, 500, 10_000] {
            vp.scroll_top = scroll_top;
            let params = compute_slice_params(&vp, 1_000_000, 10);
            assert!(params.start_row >= last_start_row);
            last_start_row = params.start_row;
        }
    }

    #[test]
    fn empty_table_yields_empty_slice() {
        let params = compute_slice_params(&seed_viewport(), 0, 0);
        assert_eq!(params.start_row, 0);
        assert_eq!(params.row_count, 0);
        assert_eq!(params.start_col, 0);
        assert_eq!(params.col_count, 0);
    }
}
