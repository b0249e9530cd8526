//! Rounded box pipeline.
//!
//! Draws every `Fill` the panel emits (buttons, tabs, dots, shadows) with
//! the shapes.wgsl shader. Each box is two triangles; the fragment shader
//! cuts the rounded corners and the soft edge.

use std::ops::Range;

use wgpu::util::DeviceExt;
use wgpu::{Buffer, BufferUsages, Device, Queue, RenderPass, RenderPipeline, TextureFormat};

use touchdeck_core::Fill;

// ════════════════════════════════════════════════════════════════════
// Vertex Layout
// ════════════════════════════════════════════════════════════════════

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct QuadVertex {
    pub pos: [f32; 2],
    pub rect: [f32; 4],
    pub top: [f32; 4],
    pub bottom: [f32; 4],
    pub shape: [f32; 2],
}

impl QuadVertex {
    const ATTRIBS: [wgpu::VertexAttribute; 5] = wgpu::vertex_attr_array![
        0 => Float32x2,
        1 => Float32x4,
        2 => Float32x4,
        3 => Float32x4,
        4 => Float32x2,
    ];

    fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct Globals {
    resolution: [f32; 2],
    _pad: [f32; 2],
}

// ════════════════════════════════════════════════════════════════════
// Quad Instance
// ════════════════════════════════════════════════════════════════════

/// One box ready for the GPU. Coordinates in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadInstance {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
    pub top: [f32; 4],
    pub bottom: [f32; 4],
    pub radius: f32,
    pub blur: f32,
}

impl QuadInstance {
    /// `None` for boxes that would draw nothing.
    pub fn from_fill(fill: &Fill) -> Option<Self> {
        let r = fill.rect;
        if r.w <= 0.0 || r.h <= 0.0 || (fill.top.a <= 0.0 && fill.bottom.a <= 0.0) {
            return None;
        }
        Some(Self {
            x0: r.x,
            y0: r.y,
            x1: r.right(),
            y1: r.bottom(),
            top: fill.top.to_array(),
            bottom: fill.bottom.to_array(),
            radius: fill.radius.clamp(0.0, r.w.min(r.h) * 0.5),
            blur: fill.blur.max(1.0),
        })
    }

    /// Two triangles covering the box plus its soft edge.
    pub fn vertices(&self) -> [QuadVertex; 6] {
        let grow = self.blur * 0.5;
        let (x0, y0, x1, y1) = (self.x0 - grow, self.y0 - grow, self.x1 + grow, self.y1 + grow);
        let v = |x: f32, y: f32| QuadVertex {
            pos: [x, y],
            rect: [self.x0, self.y0, self.x1, self.y1],
            top: self.top,
            bottom: self.bottom,
            shape: [self.radius, self.blur],
        };
        [v(x0, y0), v(x1, y0), v(x0, y1), v(x1, y0), v(x1, y1), v(x0, y1)]
    }
}

// ════════════════════════════════════════════════════════════════════
// Pipeline
// ════════════════════════════════════════════════════════════════════

pub struct QuadPipeline {
    pipeline: RenderPipeline,
    globals_buffer: Buffer,
    globals_bind_group: wgpu::BindGroup,
    vertices: Vec<QuadVertex>,
}

impl QuadPipeline {
    pub fn new(device: &Device, format: TextureFormat) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("shapes.wgsl"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shapes.wgsl").into()),
        });

        let globals_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("quad-globals"),
            size: std::mem::size_of::<Globals>() as u64,
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("quad-bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let globals_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("quad-bg"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: globals_buffer.as_entire_binding(),
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("quad-pl"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("quad-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[QuadVertex::layout()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Self {
            pipeline,
            globals_buffer,
            globals_bind_group,
            vertices: Vec::new(),
        }
    }

    /// Queue a box for this frame.
    pub fn push(&mut self, quad: QuadInstance) {
        self.vertices.extend_from_slice(&quad.vertices());
    }

    /// Number of vertices queued so far; layer boundaries are recorded with it.
    pub fn mark(&self) -> u32 {
        self.vertices.len() as u32
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
    }

    /// Upload this frame's vertices. Must happen before the render pass opens.
    pub fn upload(&self, device: &Device, queue: &Queue, viewport: [u32; 2]) -> Option<Buffer> {
        if self.vertices.is_empty() {
            return None;
        }
        let globals = Globals {
            resolution: [viewport[0] as f32, viewport[1] as f32],
            _pad: [0.0; 2],
        };
        queue.write_buffer(&self.globals_buffer, 0, bytemuck::bytes_of(&globals));
        Some(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("quad-vb"),
            contents: bytemuck::cast_slice(&self.vertices),
            usage: BufferUsages::VERTEX,
        }))
    }

    /// Draw one layer's worth of queued boxes.
    pub fn draw(&self, pass: &mut RenderPass<'_>, vertices: &Buffer, range: Range<u32>) {
        if range.is_empty() {
            return;
        }
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.globals_bind_group, &[]);
        pass.set_vertex_buffer(0, vertices.slice(..));
        pass.draw(range, 0..1);
    }
}
