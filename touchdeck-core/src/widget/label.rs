//! Static text, optionally flanked by a horizontal bar.

use crate::canvas::{Align, Painter};
use crate::color::{Rgba, hex};
use crate::geometry::Rect;

pub struct Label {
    pub text: String,
    pub size: f32,
    pub halign: Align,
    pub valign: Align,
    pub color: Rgba,
    /// Bar thickness in abstract units; 0 draws no bar.
    pub bar: f32,
}

impl Label {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            size: 50.0,
            halign: Align::Center,
            valign: Align::Center,
            color: hex("fffc"),
            bar: 0.0,
        }
    }

    /// A caption sitting on the bottom edge with bars to both sides.
    pub fn caption(text: impl Into<String>) -> Self {
        Self {
            valign: Align::End,
            bar: 3.0,
            ..Label::new(text)
        }
    }

    pub fn with_align(mut self, halign: Align, valign: Align) -> Self {
        self.halign = halign;
        self.valign = valign;
        self
    }

    pub fn with_color(mut self, color: Rgba) -> Self {
        self.color = color;
        self
    }

    pub fn with_size(mut self, size: f32) -> Self {
        self.size = size;
        self
    }

    pub fn with_bar(mut self, bar: f32) -> Self {
        self.bar = bar;
        self
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn render(&self, painter: &mut Painter<'_>, rect: Rect) {
        let size = painter.px(self.size);
        let lines = painter.fit(rect, size, &self.text, self.halign, self.valign);
        painter.fitted(&lines, self.color);

        let bar = painter.px(self.bar);
        let (Some(first), Some(last)) = (lines.first(), lines.last()) else {
            return;
        };
        if bar <= 0.0 {
            return;
        }
        let keepout = (size / 3.0).floor();
        let left = lines.iter().map(|l| l.rect.x).fold(f32::MAX, f32::min) - keepout;
        let right = lines.iter().map(|l| l.rect.right()).fold(f32::MIN, f32::max) + keepout;
        let y0 = ((first.rect.y + last.rect.bottom() - bar) * 0.5).round();
        if left > rect.x {
            painter.fill(Rect::from_edges(rect.x, y0, left, y0 + bar), self.color, bar * 0.5);
        }
        if right < rect.right() {
            painter.fill(Rect::from_edges(right, y0, rect.right(), y0 + bar), self.color, bar * 0.5);
        }
    }
}
