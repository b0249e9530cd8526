//! Composite container with its own inner grid.

use crate::canvas::{Align, Painter};
use crate::color::{Rgba, hex};
use crate::geometry::Rect;
use crate::layout::{Grid, GridStyle};

pub struct Group {
    pub grid: Grid,
    pub caption: Option<String>,
    pub frame: bool,
    pub color: Rgba,
    /// Caption strip height in abstract units.
    pub caption_size: f32,
}

impl Group {
    /// A group holding a `cols` x `rows` grid with tighter spacing than a page.
    pub fn new(cols: u16, rows: u16) -> Self {
        let style = GridStyle {
            margin: 10.0,
            ..GridStyle::default()
        };
        Self {
            grid: Grid::new(cols, rows).with_style(style),
            caption: None,
            frame: false,
            color: hex("fff8"),
            caption_size: 40.0,
        }
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    pub fn framed(mut self) -> Self {
        self.frame = true;
        self
    }

    /// Where children go: the group's rect minus frame and caption strip.
    pub fn inner(&self, rect: Rect, scale: f32) -> Rect {
        let mut inner = rect;
        if self.frame {
            inner = inner.inset((3.0 * scale).round());
        }
        if self.caption.is_some() {
            let strip = (self.caption_size * scale).round();
            inner = Rect::from_edges(inner.x, inner.y + strip, inner.right(), inner.bottom());
        }
        inner
    }

    pub fn render(&self, painter: &mut Painter<'_>, rect: Rect) {
        let line = painter.px(3.0);
        if self.frame && line > 0.0 {
            painter.fill(Rect::new(rect.x, rect.y, rect.w, line), self.color, 0.0);
            painter.fill(Rect::new(rect.x, rect.bottom() - line, rect.w, line), self.color, 0.0);
            painter.fill(Rect::new(rect.x, rect.y, line, rect.h), self.color, 0.0);
            painter.fill(Rect::new(rect.right() - line, rect.y, line, rect.h), self.color, 0.0);
        }
        if let Some(caption) = &self.caption {
            let strip = painter.px(self.caption_size);
            let pad = painter.px(10.0);
            let area = Rect::new(rect.x + pad, rect.y + line, (rect.w - 2.0 * pad).max(0.0), strip);
            let lines = painter.fit(area, strip * 0.8, caption, Align::Start, Align::Center);
            painter.fitted(&lines, self.color);
        }
    }
}
