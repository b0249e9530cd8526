//! Surface setup and frame submission for the panel window.
//!
//! `GpuState` holds the wgpu device, the surface and both pipelines. Each
//! frame the panel draws into a `FrameCanvas` first; the recorded layers
//! are then replayed into a single render pass.

use std::sync::Arc;

use wgpu::{
    Backends, Device, DeviceDescriptor, Instance, InstanceDescriptor, PowerPreference, Queue,
    RequestAdapterOptions, Surface, SurfaceConfiguration, TextureFormat, TextureUsages,
    TextureViewDescriptor,
};
use winit::dpi::PhysicalSize;
use winit::window::Window;

use super::canvas::FrameCanvas;
use super::quad::QuadPipeline;
use super::text::TextEngine;

/// Everything wgpu needs to draw one panel window.
pub struct GpuState {
    pub surface: Surface<'static>,
    pub device: Device,
    pub queue: Queue,
    pub config: SurfaceConfiguration,
    pub size: PhysicalSize<u32>,
    pub format: TextureFormat,

    // Pipelines
    pub quads: QuadPipeline,
    pub text: TextEngine,
}

impl GpuState {
    /// Pick a low-power adapter and configure a surface for `window`.
    pub fn new(window: Arc<Window>) -> anyhow::Result<Self> {
        let size = window.inner_size();
        let width = size.width.max(1);
        let height = size.height.max(1);

        let instance = Instance::new(&InstanceDescriptor {
            backends: Backends::all(),
            ..Default::default()
        });

        let surface = instance.create_surface(window.clone())?;

        let adapter = pollster::block_on(instance.request_adapter(&RequestAdapterOptions {
            power_preference: PowerPreference::LowPower,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| anyhow::anyhow!("No suitable GPU adapter found"))?;

        tracing::info!(
            "GPU adapter: {} ({:?})",
            adapter.get_info().name,
            adapter.get_info().backend
        );

        let (device, queue) = pollster::block_on(adapter.request_device(
            &DeviceDescriptor {
                label: Some("touchdeck-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_webgl2_defaults()
                    .using_resolution(adapter.limits()),
                ..Default::default()
            },
            None,
        ))?;

        // Colors are gamma-corrected by the panel, so blend in display space.
        let surface_caps = surface.get_capabilities(&adapter);
        let format = surface_caps
            .formats
            .iter()
            .find(|f| !f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or_else(|| anyhow::anyhow!("Surface reports no texture formats"))?;

        let config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format,
            width,
            height,
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let quads = QuadPipeline::new(&device, format);
        let text = TextEngine::new(&device, &queue, format);

        Ok(Self {
            surface,
            device,
            queue,
            config,
            size: PhysicalSize::new(width, height),
            format,
            quads,
            text,
        })
    }

    /// Reconfigure the surface after the window changed size. Zero sizes are ignored.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        self.size = new_size;
        self.config.width = new_size.width;
        self.config.height = new_size.height;
        self.surface.configure(&self.device, &self.config);
    }

    /// Run `draw` against a fresh canvas, then present what it drew.
    ///
    /// `draw` always runs, so the panel keeps ticking even when the surface
    /// is lost and the frame has to be skipped.
    pub fn render_frame<R>(
        &mut self,
        draw: impl FnOnce(&mut FrameCanvas<'_>) -> R,
    ) -> anyhow::Result<R> {
        let viewport = [self.config.width, self.config.height];

        let mut canvas = FrameCanvas::new(&mut self.quads, &mut self.text, (viewport[0], viewport[1]));
        let result = draw(&mut canvas);
        let (clear_color, plan) = canvas.finish();

        let output = match self.surface.get_current_texture() {
            Ok(tex) => tex,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.config);
                self.discard_frame();
                return Ok(result);
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                self.discard_frame();
                return Err(anyhow::anyhow!("GPU out of memory"));
            }
            Err(e) => {
                tracing::warn!("Surface error: {:?}", e);
                self.discard_frame();
                return Ok(result);
            }
        };

        let view = output
            .texture
            .create_view(&TextureViewDescriptor::default());

        let vertices = self.quads.upload(&self.device, &self.queue, viewport);
        self.text.prepare(&self.device, &self.queue, viewport);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame-encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("main-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: clear_color.r as f64,
                            g: clear_color.g as f64,
                            b: clear_color.b as f64,
                            a: clear_color.a as f64,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            for (index, layer) in plan.layers().iter().enumerate() {
                if let Some(vertices) = &vertices {
                    self.quads.draw(&mut pass, vertices, layer.quads.clone());
                }
                if layer.texts > 0 {
                    self.text.render(index, &mut pass);
                }
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        self.discard_frame();
        Ok(result)
    }

    fn discard_frame(&mut self) {
        self.quads.clear();
        self.text.finish_frame();
    }
}
