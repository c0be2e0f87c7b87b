use folio_core::{NormalizedRect, TextSettings};

/// Advance of one monospace cell, in points.
pub const CELL_WIDTH: f64 = 7.2;
pub const LINE_HEIGHT: f64 = 14.0;
pub const MARGIN: f64 = 36.0;

/// Maps (column, row) cells of a page onto normalized page space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid {
    pub columns: usize,
    pub rows: usize,
}

impl Grid {
    pub fn new(settings: &TextSettings) -> Self {
        Self {
            columns: settings.columns.max(1),
            rows: settings.lines_per_page.max(1),
        }
    }

    pub fn page_width(&self) -> f64 {
        self.columns as f64 * CELL_WIDTH + 2.0 * MARGIN
    }

    pub fn page_height(&self) -> f64 {
        self.rows as f64 * LINE_HEIGHT + 2.0 * MARGIN
    }

    pub fn row_top(&self, row: usize) -> f64 {
        (MARGIN + row as f64 * LINE_HEIGHT) / self.page_height()
    }

    pub fn cell(&self, column: usize, row: usize) -> NormalizedRect {
        let width = self.page_width();
        let left = (MARGIN + column as f64 * CELL_WIDTH) / width;
        let right = (MARGIN + (column + 1) as f64 * CELL_WIDTH) / width;
        let top = self.row_top(row);
        let bottom = self.row_top(row + 1);
        NormalizedRect::new(left, top, right, bottom)
    }

    /// Cells `start..end` of one row as a single rect.
    pub fn span(&self, start: usize, end: usize, row: usize) -> NormalizedRect {
        let first = self.cell(start, row);
        let last = self.cell(end.saturating_sub(1).max(start), row);
        first.union(&last)
    }
}
