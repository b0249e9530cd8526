//! Grid layout: cell bookkeeping at build time, cell-to-pixel mapping at
//! layout time.
//!
//! A grid of `cols` x `rows` cells is centered inside its area with a margin
//! around it and padding between cells. Margin and padding are abstract
//! units, scaled with the window like every other size.

use serde::{Deserialize, Serialize};

use crate::error::LayoutError;
use crate::geometry::{CellRect, Rect};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridStyle {
    pub margin: f32,
    pub padding: f32,
    /// Allow cells that are not square.
    pub rectangular: bool,
}

impl Default for GridStyle {
    fn default() -> Self {
        Self {
            margin: 20.0,
            padding: 15.0,
            rectangular: false,
        }
    }
}

/// Packing cursor. A "run" starts at the last `locate` and spans every
/// widget packed since.
#[derive(Debug, Clone, Copy, Default)]
struct Cursor {
    next_x: u16,
    next_y: u16,
    run_x: u16,
    run_y: u16,
    run_right: u16,
    row_y: u16,
    row_bottom: u16,
}

#[derive(Debug, Clone)]
pub struct Grid {
    cols: u16,
    rows: u16,
    style: GridStyle,
    spans: Vec<CellRect>,
    cursor: Cursor,
}

impl Grid {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self {
            cols,
            rows,
            style: GridStyle::default(),
            spans: Vec::new(),
            cursor: Cursor::default(),
        }
    }

    pub fn with_style(mut self, style: GridStyle) -> Self {
        self.style = style;
        self
    }

    pub fn rectangular(mut self) -> Self {
        self.style.rectangular = true;
        self
    }

    pub fn cols(&self) -> u16 {
        self.cols
    }

    pub fn rows(&self) -> u16 {
        self.rows
    }

    pub fn style(&self) -> &GridStyle {
        &self.style
    }

    pub fn spans(&self) -> &[CellRect] {
        &self.spans
    }

    /// Check that `span` is non-empty, inside the grid, and free.
    pub fn check(&self, span: CellRect) -> Result<(), LayoutError> {
        if span.is_empty() {
            return Err(LayoutError::EmptySpan(span));
        }
        if !span.fits(self.cols, self.rows) {
            return Err(LayoutError::OutOfBounds {
                span,
                cols: self.cols,
                rows: self.rows,
            });
        }
        if let Some(existing) = self.spans.iter().find(|s| s.intersects(&span)) {
            return Err(LayoutError::Overlap {
                span,
                existing: *existing,
            });
        }
        Ok(())
    }

    /// Reserve `span` without touching the packing cursor.
    pub fn reserve(&mut self, span: CellRect) -> Result<(), LayoutError> {
        self.check(span)?;
        self.spans.push(span);
        Ok(())
    }

    /// Reserve `span` and move the packing cursor to its right.
    pub fn claim(&mut self, span: CellRect) -> Result<(), LayoutError> {
        self.reserve(span)?;
        let right = span.right() as u16;
        let bottom = span.bottom() as u16;
        let c = &mut self.cursor;
        c.next_x = right;
        c.next_y = span.y;
        c.run_right = c.run_right.max(right);
        c.row_bottom = c.row_bottom.max(bottom);
        Ok(())
    }

    /// Start a new packing run at `(x, y)`.
    pub fn locate(&mut self, x: u16, y: u16) {
        self.cursor = Cursor {
            next_x: x,
            next_y: y,
            run_x: x,
            run_y: y,
            run_right: x,
            row_y: y,
            row_bottom: y,
        };
    }

    /// The span a `w` x `h` widget would take at the cursor.
    pub fn next_span(&self, w: u16, h: u16) -> CellRect {
        CellRect::new(self.cursor.next_x, self.cursor.next_y, w, h)
    }

    /// Continue the run on the row below the tallest widget of the current row.
    pub fn newline(&mut self) {
        let c = &mut self.cursor;
        c.row_y = c.row_bottom.max(c.row_y.saturating_add(1));
        c.row_bottom = c.row_y;
        c.next_x = c.run_x;
        c.next_y = c.row_y;
    }

    /// The one-row span directly above the current run.
    pub fn group_label_span(&self) -> Result<CellRect, LayoutError> {
        let c = &self.cursor;
        let span = CellRect::new(c.run_x, c.run_y.saturating_sub(1), c.run_right - c.run_x, 1);
        if c.run_y == 0 {
            return Err(LayoutError::OutOfBounds {
                span,
                cols: self.cols,
                rows: self.rows,
            });
        }
        Ok(span)
    }

    /// Pixel geometry of this grid inside `area`.
    pub fn metrics(&self, area: Rect, scale: f32) -> GridMetrics {
        let cols = self.cols.max(1) as f32;
        let rows = self.rows.max(1) as f32;
        let margin = (self.style.margin * scale).round();
        let padding = (self.style.padding * scale).round();
        let mut csx = ((area.w - 2.0 * margin - (cols - 1.0) * padding) / cols).floor() + padding;
        let mut csy = ((area.h - 2.0 * margin - (rows - 1.0) * padding) / rows).floor() + padding;
        if !self.style.rectangular {
            let cs = csx.min(csy);
            csx = cs;
            csy = cs;
        }
        GridMetrics {
            x0: ((2.0 * area.x + area.w - csx * cols + padding) / 2.0).floor(),
            y0: ((2.0 * area.y + area.h - csy * rows + padding) / 2.0).floor(),
            cell_w: csx,
            cell_h: csy,
            padding,
        }
    }
}

/// Resolved pixel geometry of a grid for one window size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridMetrics {
    pub x0: f32,
    pub y0: f32,
    /// Cell pitch including padding.
    pub cell_w: f32,
    pub cell_h: f32,
    pub padding: f32,
}

impl GridMetrics {
    pub fn cell_rect(&self, span: CellRect) -> Rect {
        Rect::from_edges(
            self.x0 + self.cell_w * span.x as f32,
            self.y0 + self.cell_h * span.y as f32,
            self.x0 + self.cell_w * span.right() as f32 - self.padding,
            self.y0 + self.cell_h * span.bottom() as f32 - self.padding,
        )
    }
}
