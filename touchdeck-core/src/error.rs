//! Layout errors. These are programmer errors raised while a panel is being
//! built, before the loop starts.

use thiserror::Error;

use crate::geometry::CellRect;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("span {span} does not fit a {cols}x{rows} grid")]
    OutOfBounds { span: CellRect, cols: u16, rows: u16 },

    #[error("span {span} overlaps {existing}")]
    Overlap { span: CellRect, existing: CellRect },

    #[error("span {0} covers no cells")]
    EmptySpan(CellRect),

    #[error("no page with index {0}")]
    UnknownPage(usize),

    #[error("no widget {index} on page {page}")]
    UnknownWidget { page: usize, index: usize },

    #[error("widget {0} cannot hold children")]
    NotAContainer(usize),
}
