//! The drawing surface the panel renders into, and the `Painter` that sits
//! between widgets and that surface.
//!
//! A `Canvas` only knows three primitives: rounded gradient boxes, single
//! lines of text, and text measurement. Everything else (outlines, shadows,
//! fitted text, gamma) is built on top of those in `Painter`.

use crate::color::Rgba;
use crate::geometry::Rect;

/// Horizontal or vertical text placement inside a box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Align {
    Start,
    End,
    #[default]
    Center,
}

/// A filled, optionally rounded and blurred box with a vertical gradient.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fill {
    pub rect: Rect,
    pub top: Rgba,
    pub bottom: Rgba,
    /// Clamped by the backend to half the shorter side.
    pub radius: f32,
    /// Edge softness in pixels; 1.0 is plain antialiasing.
    pub blur: f32,
}

/// One line of text with its upper-left corner at `x`/`y`.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub text: String,
    pub color: Rgba,
}

pub trait Canvas {
    /// Surface size in pixels.
    fn size(&self) -> (u32, u32);

    fn clear(&mut self, color: Rgba);

    fn fill(&mut self, fill: Fill);

    fn text(&mut self, run: TextRun);

    fn text_width(&self, text: &str, size: f32) -> f32;

    fn line_height(&self, size: f32) -> f32 {
        size
    }
}

// ════════════════════════════════════════════════════════════════════
// Text fitting
// ════════════════════════════════════════════════════════════════════

/// A laid-out line produced by `fit_text`.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedLine {
    pub rect: Rect,
    pub size: f32,
    pub text: String,
}

pub const MIN_TEXT_SIZE: f32 = 6.0;

/// Greedy word wrap; `\n` forces a break. Words wider than `width` get a
/// line of their own.
pub fn wrap_text(metrics: &dyn Canvas, width: f32, size: f32, text: &str) -> Vec<(String, f32)> {
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{} {}", current, word)
            };
            if current.is_empty() || metrics.text_width(&candidate, size) <= width {
                current = candidate;
            } else {
                let w = metrics.text_width(&current, size);
                lines.push((std::mem::take(&mut current), w));
                current = word.to_string();
            }
        }
        let w = metrics.text_width(&current, size);
        lines.push((current, w));
    }
    lines
}

/// Lay out `text` inside `rect`, shrinking from `initial_size` by 10% steps
/// until it fits or reaches `MIN_TEXT_SIZE`.
pub fn fit_text(
    metrics: &dyn Canvas,
    rect: Rect,
    initial_size: f32,
    text: &str,
    halign: Align,
    valign: Align,
) -> Vec<FittedLine> {
    let mut size = initial_size.max(MIN_TEXT_SIZE);
    let (lines, line_height, height) = loop {
        let lines = wrap_text(metrics, rect.w, size, text);
        let line_height = metrics.line_height(size);
        let width = lines.iter().map(|(_, w)| *w).fold(0.0, f32::max);
        let height = line_height * lines.len() as f32;
        if size <= MIN_TEXT_SIZE || (width <= rect.w && height <= rect.h) {
            break (lines, line_height, height);
        }
        size = (size * 0.9).min(size - 1.0).max(MIN_TEXT_SIZE);
    };

    let mut y = match valign {
        Align::Start => rect.y,
        Align::End => rect.bottom() - height,
        Align::Center => (rect.y + rect.bottom() - height) * 0.5,
    };
    let mut out = Vec::with_capacity(lines.len());
    for (line, width) in lines {
        let x = match halign {
            Align::Start => rect.x,
            Align::End => rect.right() - width,
            Align::Center => (rect.x + rect.right() - width) * 0.5,
        };
        out.push(FittedLine {
            rect: Rect::new(x, y, width, line_height),
            size,
            text: line,
        });
        y += line_height;
    }
    out
}

// ════════════════════════════════════════════════════════════════════
// Painter
// ════════════════════════════════════════════════════════════════════

/// Drop shadow parameters for `Painter::outline_box`, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Shadow {
    pub offset: f32,
    pub blur: f32,
    pub grow: f32,
}

/// Widget-facing drawing API. Applies the display gamma to every color and
/// converts abstract size units to pixels.
pub struct Painter<'a> {
    canvas: &'a mut dyn Canvas,
    gamma: f32,
    scale: f32,
}

impl<'a> Painter<'a> {
    pub fn new(canvas: &'a mut dyn Canvas, gamma: f32, scale: f32) -> Self {
        Self {
            canvas,
            gamma,
            scale,
        }
    }

    /// Abstract units to whole pixels.
    pub fn px(&self, units: f32) -> f32 {
        (units * self.scale).round()
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn metrics(&self) -> &dyn Canvas {
        &*self.canvas
    }

    pub fn clear(&mut self, color: Rgba) {
        self.canvas.clear(color.gamma(self.gamma));
    }

    pub fn fill(&mut self, rect: Rect, color: Rgba, radius: f32) {
        self.gradient(rect, color, color, radius);
    }

    pub fn gradient(&mut self, rect: Rect, top: Rgba, bottom: Rgba, radius: f32) {
        if rect.w <= 0.0 || rect.h <= 0.0 {
            return;
        }
        self.canvas.fill(Fill {
            rect,
            top: top.gamma(self.gamma),
            bottom: bottom.gamma(self.gamma),
            radius: radius.max(0.0),
            blur: 1.0,
        });
    }

    /// Box with an outline of width `border` and an optional drop shadow.
    pub fn outline_box(
        &mut self,
        rect: Rect,
        border: f32,
        outline: Rgba,
        top: Rgba,
        bottom: Rgba,
        radius: f32,
        shadow: Shadow,
    ) {
        if shadow.offset > 0.0 || shadow.grow > 0.0 {
            let r = rect.offset(shadow.offset, shadow.offset).inset(-shadow.grow);
            self.canvas.fill(Fill {
                rect: r,
                top: Rgba::BLACK,
                bottom: Rgba::BLACK,
                radius: radius + shadow.grow,
                blur: shadow.blur + 1.0,
            });
        }
        self.fill(rect, outline, radius);
        self.gradient(rect.inset(border), top, bottom, radius - border);
    }

    pub fn text_line(&mut self, x: f32, y: f32, size: f32, text: &str, color: Rgba) {
        if text.is_empty() {
            return;
        }
        self.canvas.text(TextRun {
            x,
            y,
            size,
            text: text.to_string(),
            color: color.gamma(self.gamma),
        });
    }

    pub fn fit(&self, rect: Rect, size: f32, text: &str, halign: Align, valign: Align) -> Vec<FittedLine> {
        fit_text(&*self.canvas, rect, size, text, halign, valign)
    }

    pub fn fitted(&mut self, lines: &[FittedLine], color: Rgba) {
        for line in lines {
            self.text_line(line.rect.x, line.rect.y, line.size, &line.text, color);
        }
    }

    pub fn text_width(&self, text: &str, size: f32) -> f32 {
        self.canvas.text_width(text, size)
    }

    pub fn line_height(&self, size: f32) -> f32 {
        self.canvas.line_height(size)
    }
}
