//! GPU Rendering Subsystem.
//!
//! Manages the wgpu device, surface, and rendering pipelines.
//! Sub-modules:
//!   renderer: wgpu device/surface lifecycle, frame orchestration
//!   canvas  : the panel's drawing surface, split into layers
//!   quad    : rounded gradient box pipeline
//!   text    : glyphon-based text rendering

mod canvas;
mod quad;
mod renderer;
mod text;

pub use canvas::{FrameCanvas, Layer, LayerPlan};
pub use quad::{QuadInstance, QuadPipeline, QuadVertex};
pub use renderer::GpuState;
pub use text::{LINE_SPACING, TextEngine};
