//! The `Canvas` the panel draws into for one GPU frame.
//!
//! Boxes and text go to separate pipelines. To keep painter's order, a box
//! that follows text opens a new layer; the renderer then draws each
//! layer's boxes before its text.

use std::ops::Range;

use touchdeck_core::{Canvas, Fill, Rgba, TextRun};

use super::quad::{QuadInstance, QuadPipeline};
use super::text::{LINE_SPACING, TextEngine};

/// One batch of boxes followed by the text drawn on top of them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Layer {
    pub quads: Range<u32>,
    pub texts: usize,
}

/// Splits a stream of fills and texts into layers.
#[derive(Debug, Clone, Default)]
pub struct LayerPlan {
    layers: Vec<Layer>,
}

impl LayerPlan {
    /// Record vertices `start..end` as drawn after everything so far.
    pub fn fill(&mut self, start: u32, end: u32) {
        match self.layers.last_mut() {
            Some(layer) if layer.texts == 0 && layer.quads.end == start => layer.quads.end = end,
            _ => self.layers.push(Layer {
                quads: start..end,
                texts: 0,
            }),
        }
    }

    /// Record one text run; returns the layer it belongs to.
    pub fn text(&mut self) -> usize {
        if self.layers.is_empty() {
            self.layers.push(Layer::default());
        }
        let index = self.layers.len() - 1;
        self.layers[index].texts += 1;
        index
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }
}

pub struct FrameCanvas<'a> {
    quads: &'a mut QuadPipeline,
    text: &'a mut TextEngine,
    size: (u32, u32),
    clear: Rgba,
    plan: LayerPlan,
}

impl<'a> FrameCanvas<'a> {
    pub fn new(quads: &'a mut QuadPipeline, text: &'a mut TextEngine, size: (u32, u32)) -> Self {
        Self {
            quads,
            text,
            size,
            clear: Rgba::BLACK,
            plan: LayerPlan::default(),
        }
    }

    /// Clear color and layer plan for the renderer.
    pub fn finish(self) -> (Rgba, LayerPlan) {
        (self.clear, self.plan)
    }
}

impl Canvas for FrameCanvas<'_> {
    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn clear(&mut self, color: Rgba) {
        self.clear = color;
        self.quads.clear();
        self.text.clear();
        self.plan = LayerPlan::default();
    }

    fn fill(&mut self, fill: Fill) {
        let Some(quad) = QuadInstance::from_fill(&fill) else {
            return;
        };
        let start = self.quads.mark();
        self.quads.push(quad);
        self.plan.fill(start, self.quads.mark());
    }

    fn text(&mut self, run: TextRun) {
        if run.text.is_empty() || run.color.a <= 0.0 {
            return;
        }
        let layer = self.plan.text();
        self.text.push(layer, run);
    }

    fn text_width(&self, text: &str, size: f32) -> f32 {
        self.text.measure(text, size)
    }

    fn line_height(&self, size: f32) -> f32 {
        size * LINE_SPACING
    }
}
