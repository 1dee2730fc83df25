//! Windowed rendering for the resulting photo grid.
//!
//! `compute_window` is pure, so the UI can call it on every scroll event.

use std::ops::Range;

use serde::Serialize;

pub const DEFAULT_BUFFER_ROWS: usize = 5;

/// Collections at or below this size are rendered whole.
pub const VIRTUALIZATION_THRESHOLD: usize = 50;

const MIN_COLUMN_WIDTH: f64 = 320.0;
const COLUMN_BREAKPOINTS: [(f64, usize); 5] = [
    (1536.0, 6),
    (1280.0, 5),
    (1024.0, 4),
    (768.0, 3),
    (640.0, 2),
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualizationWindow {
    pub first_visible_row: usize,
    pub last_visible_row: usize,
    pub items_per_row: usize,
    pub total_height: f64,
    pub render_offset: f64,
    /// Items to materialize, as `start_index..end_index`.
    pub start_index: usize,
    pub end_index: usize,
}

impl VirtualizationWindow {
    pub fn item_range(&self) -> Range<usize> {
        self.start_index..self.end_index
    }

    pub fn is_empty(&self) -> bool {
        self.start_index >= self.end_index
    }
}

pub fn columns_for_width(container_width: f64) -> usize {
    let width = if container_width.is_finite() {
        container_width.max(0.0)
    } else {
        0.0
    };

    let stepped = COLUMN_BREAKPOINTS
        .iter()
        .find(|(min_width, _)| width >= *min_width)
        .map(|(_, columns)| *columns)
        .unwrap_or(1);
    let fit = ((width / MIN_COLUMN_WIDTH).floor() as usize).max(1);

    stepped.min(fit)
}

pub fn compute_window(
    collection_size: usize,
    item_height: f64,
    container_height: f64,
    scroll_top: f64,
    container_width: f64,
    buffer_rows: usize,
) -> VirtualizationWindow {
    let items_per_row = columns_for_width(container_width);
    let total_rows = collection_size.div_ceil(items_per_row);
    let last_row = total_rows.saturating_sub(1);
    let row_height = if item_height.is_finite() {
        item_height.max(0.0)
    } else {
        0.0
    };
    let total_height = total_rows as f64 * row_height;

    if collection_size <= VIRTUALIZATION_THRESHOLD || row_height == 0.0 {
        return VirtualizationWindow {
            first_visible_row: 0,
            last_visible_row: last_row,
            items_per_row,
            total_height,
            render_offset: 0.0,
            start_index: 0,
            end_index: collection_size,
        };
    }

    let scroll_top = finite_non_negative(scroll_top);
    let container_height = finite_non_negative(container_height);

    let top_row = (scroll_top / row_height).floor() as usize;
    let bottom_row = ((scroll_top + container_height) / row_height).floor() as usize;

    let first_visible_row = top_row.saturating_sub(buffer_rows).min(last_row);
    let last_visible_row = bottom_row.saturating_add(buffer_rows).min(last_row);

    VirtualizationWindow {
        first_visible_row,
        last_visible_row,
        items_per_row,
        total_height,
        render_offset: first_visible_row as f64 * row_height,
        start_index: first_visible_row * items_per_row,
        end_index: ((last_visible_row + 1) * items_per_row).min(collection_size),
    }
}

fn finite_non_negative(value: f64) -> f64 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_step_with_width_and_fit_the_minimum_column() {
        assert_eq!(columns_for_width(0.0), 1);
        assert_eq!(columns_for_width(639.0), 1);
        assert_eq!(columns_for_width(640.0), 2);
        assert_eq!(columns_for_width(768.0), 2);
        assert_eq!(columns_for_width(960.0), 3);
        assert_eq!(columns_for_width(1024.0), 3);
        assert_eq!(columns_for_width(1280.0), 4);
        assert_eq!(columns_for_width(1536.0), 4);
        assert_eq!(columns_for_width(1920.0), 6);
        assert_eq!(columns_for_width(4000.0), 6);
        assert_eq!(columns_for_width(f64::NAN), 1);
    }

    #[test]
    fn small_collections_render_whole() {
        for scroll_top in [0.0, 500.0, 1e9] {
            let window = compute_window(50, 200.0, 600.0, scroll_top, 1920.0, 5);
            assert_eq!(window.item_range(), 0..50);
            assert_eq!(window.first_visible_row, 0);
            assert_eq!(window.last_visible_row, 8);
            assert_eq!(window.render_offset, 0.0);
        }
    }

    #[test]
    fn large_collection_window_is_buffered() {
        // 1000 items, 3 columns, 334 rows of 100px.
        let window = compute_window(1000, 100.0, 500.0, 2_000.0, 1000.0, 5);
        assert_eq!(window.items_per_row, 3);
        assert_eq!(window.first_visible_row, 15);
        assert_eq!(window.last_visible_row, 30);
        assert_eq!(window.render_offset, 1_500.0);
        assert_eq!(window.total_height, 33_400.0);
        assert_eq!(window.item_range(), 45..93);
    }

    #[test]
    fn window_is_clamped_at_both_ends() {
        let top = compute_window(200, 100.0, 300.0, -50.0, 500.0, 5);
        assert_eq!(top.first_visible_row, 0);
        assert_eq!(top.item_range(), 0..9);

        let bottom = compute_window(200, 100.0, 300.0, 1e7, 500.0, 5);
        assert_eq!(bottom.last_visible_row, 199);
        assert_eq!(bottom.end_index, 200);
        assert!(bottom.first_visible_row <= bottom.last_visible_row);
    }

    #[test]
    fn identical_inputs_give_identical_windows() {
        let a = compute_window(5_000, 240.0, 900.0, 12_345.0, 1400.0, DEFAULT_BUFFER_ROWS);
        let b = compute_window(5_000, 240.0, 900.0, 12_345.0, 1400.0, DEFAULT_BUFFER_ROWS);
        assert_eq!(a, b);
        assert!(a.first_visible_row * a.items_per_row <= a.start_index);
    }

    #[test]
    fn empty_collection_has_an_empty_range() {
        let window = compute_window(0, 100.0, 500.0, 0.0, 800.0, 5);
        assert!(window.is_empty());
        assert_eq!(window.total_height, 0.0);
    }
}
