//! Glyphon-based text rendering engine.
//!
//! Shapes each distinct (text, size) pair once and keeps the shaped buffer
//! for as long as it is drawn every frame. Measurement for layout goes
//! through the same cache, so a label is shaped once for fitting and
//! drawing alike.

use std::cell::RefCell;
use std::collections::HashMap;

use glyphon::{
    Attrs, Buffer as GlyphonBuffer, Cache, Color as GColor, ColorMode, Family, FontSystem, Metrics,
    Resolution, Shaping, SwashCache, TextArea, TextAtlas, TextBounds, TextRenderer, Viewport,
};
use wgpu::{Device, MultisampleState, Queue, RenderPass, TextureFormat};

use touchdeck_core::{Rgba, TextRun};

/// Line height as a multiple of the font size.
pub const LINE_SPACING: f32 = 1.2;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ShapeKey {
    text: String,
    size: u32,
}

impl ShapeKey {
    fn new(text: &str, size: f32) -> Self {
        Self {
            text: text.to_string(),
            size: size.to_bits(),
        }
    }
}

struct Shaped {
    buffer: GlyphonBuffer,
    width: f32,
    used: bool,
}

fn shape(fonts: &mut FontSystem, text: &str, size: f32) -> Shaped {
    let mut buffer = GlyphonBuffer::new(fonts, Metrics::new(size, size * LINE_SPACING));
    buffer.set_size(fonts, None, None);
    buffer.set_text(fonts, text, Attrs::new().family(Family::SansSerif), Shaping::Advanced);
    buffer.shape_until_scroll(fonts, false);
    let width = buffer.layout_runs().map(|run| run.line_w).fold(0.0, f32::max);
    Shaped {
        buffer,
        width,
        used: false,
    }
}

fn to_glyphon(color: Rgba) -> GColor {
    let c = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    GColor::rgba(c(color.r), c(color.g), c(color.b), c(color.a))
}

/// The text rendering engine. Wraps glyphon's font system and atlas.
pub struct TextEngine {
    fonts: RefCell<FontSystem>,
    shaped: RefCell<HashMap<ShapeKey, Shaped>>,
    swash_cache: SwashCache,
    atlas: TextAtlas,
    viewport: Viewport,
    /// One renderer per layer; layers interleave with box drawing.
    renderers: Vec<TextRenderer>,
    layers: Vec<Vec<TextRun>>,
}

impl TextEngine {
    pub fn new(device: &Device, queue: &Queue, format: TextureFormat) -> Self {
        let cache = Cache::new(device);
        let mode = if format.is_srgb() {
            ColorMode::Accurate
        } else {
            ColorMode::Web
        };
        let atlas = TextAtlas::with_color_mode(device, queue, &cache, format, mode);
        let viewport = Viewport::new(device, &cache);
        Self {
            fonts: RefCell::new(FontSystem::new()),
            shaped: RefCell::new(HashMap::new()),
            swash_cache: SwashCache::new(),
            atlas,
            viewport,
            renderers: Vec::new(),
            layers: Vec::new(),
        }
    }

    /// Width of `text` on one line at `size` pixels.
    pub fn measure(&self, text: &str, size: f32) -> f32 {
        if text.is_empty() || size <= 0.0 {
            return 0.0;
        }
        let key = ShapeKey::new(text, size);
        let mut shaped = self.shaped.borrow_mut();
        if let Some(entry) = shaped.get(&key) {
            return entry.width;
        }
        let entry = shape(&mut self.fonts.borrow_mut(), text, size);
        let width = entry.width;
        shaped.insert(key, entry);
        width
    }

    /// Queue a run for `layer` of this frame.
    pub fn push(&mut self, layer: usize, run: TextRun) {
        if self.layers.len() <= layer {
            self.layers.resize_with(layer + 1, Vec::new);
        }
        self.layers[layer].push(run);
    }

    /// Drop everything queued without drawing it.
    pub fn clear(&mut self) {
        self.layers.clear();
    }

    /// Shape, upload and lay out every queued run. Call before the render pass.
    pub fn prepare(&mut self, device: &Device, queue: &Queue, viewport: [u32; 2]) {
        self.viewport.update(
            queue,
            Resolution {
                width: viewport[0],
                height: viewport[1],
            },
        );
        while self.renderers.len() < self.layers.len() {
            self.renderers.push(TextRenderer::new(
                &mut self.atlas,
                device,
                MultisampleState::default(),
                None,
            ));
        }

        {
            let mut shaped = self.shaped.borrow_mut();
            let mut fonts = self.fonts.borrow_mut();
            for run in self.layers.iter().flatten() {
                let entry = shaped
                    .entry(ShapeKey::new(&run.text, run.size))
                    .or_insert_with(|| shape(&mut fonts, &run.text, run.size));
                entry.used = true;
            }
        }

        let bounds = TextBounds {
            left: 0,
            top: 0,
            right: viewport[0] as i32,
            bottom: viewport[1] as i32,
        };
        let shaped = self.shaped.borrow();
        let mut fonts = self.fonts.borrow_mut();
        for (layer, runs) in self.layers.iter().enumerate() {
            let areas: Vec<TextArea<'_>> = runs
                .iter()
                .filter_map(|run| {
                    let entry = shaped.get(&ShapeKey::new(&run.text, run.size))?;
                    Some(TextArea {
                        buffer: &entry.buffer,
                        left: run.x,
                        top: run.y,
                        scale: 1.0,
                        bounds,
                        default_color: to_glyphon(run.color),
                        custom_glyphs: &[],
                    })
                })
                .collect();
            if let Err(e) = self.renderers[layer].prepare(
                device,
                queue,
                &mut fonts,
                &mut self.atlas,
                &self.viewport,
                areas,
                &mut self.swash_cache,
            ) {
                tracing::warn!("Text prepare failed: {:?}", e);
            }
        }
    }

    /// Draw the runs of one prepared layer.
    pub fn render(&self, layer: usize, pass: &mut RenderPass<'_>) {
        let Some(renderer) = self.renderers.get(layer) else {
            return;
        };
        if self.layers.get(layer).is_none_or(|runs| runs.is_empty()) {
            return;
        }
        if let Err(e) = renderer.render(&self.atlas, &self.viewport, pass) {
            tracing::warn!("Text render failed: {:?}", e);
        }
    }

    /// Forget this frame's runs and any shaped text that was not drawn.
    pub fn finish_frame(&mut self) {
        self.layers.clear();
        self.atlas.trim();
        self.shaped.get_mut().retain(|_, entry| std::mem::take(&mut entry.used));
    }
}
