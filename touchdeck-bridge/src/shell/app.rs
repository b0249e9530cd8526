//! Application state and winit event loop.
//!
//! The window, the GPU and the `Deck` live here. Winit events are turned
//! into `InputEvent`s and queued; every redraw hands the queue to one
//! `Deck::tick` running inside the GPU frame.

use std::sync::Arc;
use std::time::Instant;

use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Fullscreen, Window, WindowId};

use touchdeck_core::{Deck, Environment, InputEvent, LaunchConfig, LoopState, Panel};

use super::events::{PointerTracker, key_input};
use crate::error::StartupError;
use crate::gfx::GpuState;

// ════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════

pub struct PanelApp {
    config: LaunchConfig,
    // Handed to the deck once the window exists.
    pending: Option<(Panel, Environment)>,
    deck: Option<Deck>,

    window: Option<Arc<Window>>,
    gpu: Option<GpuState>,

    pointer: PointerTracker,
    queue: Vec<InputEvent>,
    failure: Option<StartupError>,
}

impl PanelApp {
    pub fn new(config: LaunchConfig, panel: Panel, env: Environment) -> Self {
        Self {
            config,
            pending: Some((panel, env)),
            deck: None,
            window: None,
            gpu: None,
            pointer: PointerTracker::new(),
            queue: Vec::new(),
            failure: None,
        }
    }

    fn request_redraw(&self) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: StartupError) {
        tracing::error!("{}", error);
        self.failure.get_or_insert(error);
        if let Some(deck) = &mut self.deck {
            deck.shutdown();
        }
        event_loop.exit();
    }

    fn push(&mut self, event: Option<InputEvent>) {
        if let Some(event) = event {
            self.queue.push(event);
            self.request_redraw();
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let (Some(gpu), Some(deck)) = (&mut self.gpu, &mut self.deck) else {
            return;
        };
        let events = std::mem::take(&mut self.queue);
        match gpu.render_frame(|canvas| deck.tick(events, canvas, Instant::now())) {
            Ok(LoopState::Running) => {}
            Ok(LoopState::ShuttingDown) => {
                tracing::info!("Panel loop finished");
                event_loop.exit();
            }
            Err(e) => self.fail(event_loop, StartupError::Render(format!("{:#}", e))),
        }
    }
}

// ════════════════════════════════════════════════════════════════════
// ApplicationHandler
// ════════════════════════════════════════════════════════════════════

impl ApplicationHandler for PanelApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let mut attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));
        if self.config.fullscreen {
            attrs = attrs.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window = match event_loop.create_window(attrs) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                self.fail(event_loop, StartupError::WindowInit(e.to_string()));
                return;
            }
        };
        window.set_cursor_visible(self.config.show_cursor);

        match GpuState::new(window.clone()) {
            Ok(gpu) => self.gpu = Some(gpu),
            Err(e) => {
                self.fail(event_loop, StartupError::RenderInit(format!("{:#}", e)));
                return;
            }
        }
        self.window = Some(window);
        tracing::info!("Window + GPU initialized");

        if let Some((panel, env)) = self.pending.take() {
            self.deck = Some(Deck::new(panel, env, &self.config));
        }
        self.request_redraw();
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                tracing::info!("Window close requested");
                self.push(Some(InputEvent::Quit));
            }
            WindowEvent::Resized(size) => {
                if let Some(gpu) = &mut self.gpu {
                    gpu.resize(size);
                }
                if size.width > 0 && size.height > 0 {
                    self.push(Some(InputEvent::Resize {
                        width: size.width,
                        height: size.height,
                    }));
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                let event = self.pointer.cursor_moved(position.x, position.y);
                self.push(event);
            }
            WindowEvent::CursorLeft { .. } => self.pointer.cursor_left(),
            WindowEvent::MouseInput { state, button, .. } => {
                let event = self.pointer.mouse_button(button, state);
                self.push(event);
            }
            WindowEvent::Touch(touch) => {
                let event = self
                    .pointer
                    .touch(touch.id, touch.phase, touch.location.x, touch.location.y);
                self.push(event);
            }
            WindowEvent::KeyboardInput { event, .. } => {
                self.push(key_input(&event.logical_key, event.state));
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(deck) = &self.deck else {
            return;
        };
        match deck.next_frame() {
            Some(at) => {
                if Instant::now() >= at || !self.queue.is_empty() {
                    self.request_redraw();
                }
                event_loop.set_control_flow(ControlFlow::WaitUntil(at));
            }
            None => {
                self.request_redraw();
                event_loop.set_control_flow(ControlFlow::Poll);
            }
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(deck) = &mut self.deck {
            deck.shutdown();
        }
    }
}

// ════════════════════════════════════════════════════════════════════
// Entry Point
// ════════════════════════════════════════════════════════════════════

/// Open the window and run `panel` until it quits.
pub fn run(config: LaunchConfig, panel: Panel, env: Environment) -> Result<(), StartupError> {
    let event_loop = EventLoop::new().map_err(|e| StartupError::WindowInit(e.to_string()))?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = PanelApp::new(config, panel, env);
    event_loop
        .run_app(&mut app)
        .map_err(|e| StartupError::WindowInit(e.to_string()))?;

    match app.failure.take() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}
