//! The render and input loop.
//!
//! `Deck::tick` is one iteration: input, device polling, rendering, pacing.
//! It owns no window; the caller feeds it events and a `Canvas` each frame
//! and sleeps until `next_frame`.

use std::time::{Duration, Instant};

use chrono::{Local, NaiveDateTime, Timelike};

use crate::canvas::{Canvas, Painter};
use crate::color::Rgba;
use crate::config::LaunchConfig;
use crate::env::{Environment, Viewport};
use crate::event::{Context, Event, EventDetail, EventKind};
use crate::panel::Panel;
use crate::widget::{Builtin, Frame, WidgetHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    ShuttingDown,
}

/// Input from the windowing layer, in window pixels.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    PointerDown { x: f32, y: f32 },
    PointerMove { x: f32, y: f32 },
    PointerUp { x: f32, y: f32 },
    Resize { width: u32, height: u32 },
    Key(char),
    Quit,
}

// ════════════════════════════════════════════════════════════════════
// Quit gesture and frame pacing
// ════════════════════════════════════════════════════════════════════

/// Two taps in the top-right corner within `window` request quit.
#[derive(Debug, Clone)]
pub struct QuitGesture {
    pub corner: f32,
    pub window: Duration,
    armed_until: Option<Instant>,
}

impl Default for QuitGesture {
    fn default() -> Self {
        Self {
            corner: 20.0,
            window: Duration::from_millis(500),
            armed_until: None,
        }
    }
}

impl QuitGesture {
    /// Feed one pointer-down; true when it completes the gesture.
    pub fn tap(&mut self, x: f32, y: f32, width: f32, now: Instant) -> bool {
        if x <= width - self.corner || y >= self.corner {
            self.armed_until = None;
            return false;
        }
        match self.armed_until.take() {
            Some(deadline) if now <= deadline => true,
            _ => {
                self.armed_until = Some(now + self.window);
                false
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FramePacer {
    interval: Option<Duration>,
    next: Option<Instant>,
}

impl FramePacer {
    pub fn new(interval: Option<Duration>) -> Self {
        Self { interval, next: None }
    }

    /// When the frame after the one started at `now` is due; `None` when
    /// uncapped. A late frame does not make later frames hurry.
    pub fn schedule(&mut self, now: Instant) -> Option<Instant> {
        let interval = self.interval?;
        let next = match self.next {
            Some(previous) if previous + interval > now => previous + interval,
            _ => now + interval,
        };
        self.next = Some(next);
        Some(next)
    }
}

// ════════════════════════════════════════════════════════════════════
// Deck
// ════════════════════════════════════════════════════════════════════

pub struct Deck {
    panel: Panel,
    env: Environment,
    state: LoopState,
    pressed: Option<WidgetHandle>,
    /// Where the current press started.
    press_at: (f32, f32),
    quit: QuitGesture,
    pacer: FramePacer,
    next_frame: Option<Instant>,
    gamma: f32,
    background: Rgba,
    grace: Duration,
    last_minute: Option<(u32, u32)>,
}

impl Deck {
    pub fn new(panel: Panel, env: Environment, config: &LaunchConfig) -> Self {
        tracing::info!(
            "panel ready: {} pages, {} devices",
            panel.page_count(),
            env.devices().len()
        );
        Self {
            panel,
            env,
            state: LoopState::Running,
            pressed: None,
            press_at: (0.0, 0.0),
            quit: QuitGesture::default(),
            pacer: FramePacer::new(config.frame_interval()),
            next_frame: None,
            gamma: config.gamma,
            background: Rgba::BLACK,
            grace: config.shutdown_grace(),
            last_minute: None,
        }
    }

    pub fn panel(&self) -> &Panel {
        &self.panel
    }

    pub fn panel_mut(&mut self) -> &mut Panel {
        &mut self.panel
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// The widget currently held down, if any.
    pub fn pressed(&self) -> Option<WidgetHandle> {
        self.pressed
    }

    /// When the next tick is due; `None` when running uncapped.
    pub fn next_frame(&self) -> Option<Instant> {
        self.next_frame
    }

    /// Run one iteration using the local wall clock.
    pub fn tick<I>(&mut self, events: I, canvas: &mut dyn Canvas, now: Instant) -> LoopState
    where
        I: IntoIterator<Item = InputEvent>,
    {
        self.tick_at(events, canvas, now, Local::now().naive_local())
    }

    pub fn tick_at<I>(&mut self, events: I, canvas: &mut dyn Canvas, now: Instant, wall: NaiveDateTime) -> LoopState
    where
        I: IntoIterator<Item = InputEvent>,
    {
        if self.state == LoopState::ShuttingDown {
            return self.state;
        }
        self.env.clock_mut().advance(now, wall);
        if self.env.viewport().width == 0 || self.env.viewport().height == 0 {
            let (width, height) = canvas.size();
            self.env.set_viewport(Viewport { width, height });
        }
        self.update_corner_clock(wall);
        self.ensure_layout(canvas);

        for event in events {
            self.handle_input(event, canvas, now);
            if self.env.quit_requested() {
                self.state = LoopState::ShuttingDown;
            }
            if self.state == LoopState::ShuttingDown {
                break;
            }
        }

        if self.state == LoopState::Running {
            self.route_outcomes(now);
        }
        if self.env.quit_requested() {
            self.state = LoopState::ShuttingDown;
        }
        if self.state == LoopState::ShuttingDown {
            self.shutdown();
            return self.state;
        }

        self.ensure_layout(canvas);
        self.render(canvas);
        self.next_frame = self.pacer.schedule(now);
        self.state
    }

    /// Stop the loop and the device clients. Safe to call more than once.
    pub fn shutdown(&mut self) {
        self.state = LoopState::ShuttingDown;
        self.pressed = None;
        if !self.env.is_shut_down() {
            tracing::info!("shutting down");
            self.env.shutdown(self.grace);
        }
    }

    fn update_corner_clock(&mut self, wall: NaiveDateTime) {
        if !self.panel.shows_clock() {
            return;
        }
        let minute = (wall.hour(), wall.minute());
        if self.last_minute != Some(minute) {
            self.last_minute = Some(minute);
            self.panel.set_corner_text(Some(format!("{}:{:02}", minute.0, minute.1)));
        }
    }

    fn ensure_layout(&mut self, canvas: &dyn Canvas) {
        let viewport = self.env.viewport();
        let size = (viewport.width, viewport.height);
        if self.panel.needs_layout(size) {
            self.panel.layout(canvas, size.0, size.1);
        }
    }

    fn render(&mut self, canvas: &mut dyn Canvas) {
        let scale = self.env.viewport().scale();
        let clock = *self.env.clock();
        let mut painter = Painter::new(canvas, self.gamma, scale);
        painter.clear(self.background);
        let frame = Frame {
            now: clock.now(),
            wall: clock.wall(),
            devices: self.env.devices(),
        };
        self.panel.render(&mut painter, &frame);
    }

    // ════════════════════════════════════════════════════════════════════
    // Input
    // ════════════════════════════════════════════════════════════════════

    fn handle_input(&mut self, event: InputEvent, canvas: &dyn Canvas, now: Instant) {
        match event {
            InputEvent::Quit => {
                tracing::info!("quit requested by window");
                self.state = LoopState::ShuttingDown;
            }
            InputEvent::Key('q' | 'Q') => {
                tracing::info!("quit requested by key");
                self.state = LoopState::ShuttingDown;
            }
            InputEvent::Key(_) => {}
            InputEvent::Resize { width, height } => {
                tracing::debug!("resized to {}x{}", width, height);
                self.env.set_viewport(Viewport { width, height });
                self.ensure_layout(canvas);
            }
            InputEvent::PointerDown { x, y } => self.pointer_down(x, y, now),
            InputEvent::PointerMove { x, y } => self.pointer_move(x, y),
            InputEvent::PointerUp { x, y } => self.pointer_up(x, y),
        }
    }

    fn set_pressed_flag(&mut self, widget: WidgetHandle, pressed: bool) {
        if let Some(slot) = self.panel.page_at_mut(widget.page).and_then(|p| p.slot_mut(widget)) {
            slot.state.pressed = pressed;
        }
    }

    fn accepts_input(&self, widget: WidgetHandle) -> bool {
        let Some(page) = self.panel.pages().nth(widget.page) else {
            return false;
        };
        match (page.widget(widget), page.state(widget)) {
            (Some(w), Some(state)) => page.is_shown(widget) && w.accepts_input(state),
            _ => false,
        }
    }

    fn pointer_down(&mut self, x: f32, y: f32, now: Instant) {
        let width = self.env.viewport().width as f32;
        if self.quit.tap(x, y, width, now) {
            tracing::info!("quit requested by corner gesture");
            self.state = LoopState::ShuttingDown;
            return;
        }
        if let Some(previous) = self.pressed.take() {
            self.set_pressed_flag(previous, false);
        }
        if let Some(tab) = self.panel.tab_at(x, y) {
            if let Err(e) = self.panel.set_active(tab) {
                tracing::warn!("tab switch failed: {}", e);
            }
            return;
        }
        let Some(widget) = self.panel.hit_test(x, y) else {
            return;
        };
        if !self.accepts_input(widget) {
            return;
        }
        self.pressed = Some(widget);
        self.press_at = (x, y);
        self.set_pressed_flag(widget, true);
        self.dispatch(Event {
            kind: EventKind::Pressed,
            widget,
            detail: EventDetail::Pointer { x, y },
        });
    }

    fn pointer_move(&mut self, x: f32, y: f32) {
        if let Some(widget) = self.pressed {
            let over = self.panel.hit_test(x, y) == Some(widget);
            self.set_pressed_flag(widget, over);
        }
    }

    fn pointer_up(&mut self, x: f32, y: f32) {
        let Some(widget) = self.pressed.take() else {
            return;
        };
        self.set_pressed_flag(widget, false);
        self.dispatch(Event {
            kind: EventKind::Released,
            widget,
            detail: EventDetail::Pointer { x, y },
        });
        if self.panel.hit_test(x, y) != Some(widget) || !self.accepts_input(widget) {
            return;
        }

        let rect = self.panel.widget_rect(widget).unwrap_or_default();
        let scale = self.env.viewport().scale();
        let builtin = match self.panel.widget_mut(widget) {
            Some(w) => w.activate(rect, self.press_at, (x, y), scale, self.env.devices()),
            None => None,
        };
        if let Some(Builtin::Send(device, command)) = builtin {
            let kind = command.kind();
            if let Err(e) = self.env.send_for(widget, device, command) {
                tracing::warn!("{} from {} to {} not sent: {}", kind, widget, device, e);
            }
        }
        self.dispatch(Event {
            kind: EventKind::Activated,
            widget,
            detail: EventDetail::Pointer { x, y },
        });
    }

    // ════════════════════════════════════════════════════════════════════
    // Dispatch
    // ════════════════════════════════════════════════════════════════════

    /// Run the handlers bound to the event's widget and kind, in order.
    fn dispatch(&mut self, event: Event) {
        let widget = event.widget;
        let Some(slot) = self.panel.page_at_mut(widget.page).and_then(|p| p.slot_mut(widget)) else {
            return;
        };
        // Handlers borrow the panel mutably, so they run detached from it.
        let mut bindings = std::mem::take(&mut slot.bindings);
        let mut ran = 0;
        {
            let mut cx = Context::new(&mut self.panel, &mut self.env, widget);
            for binding in bindings.iter_mut().filter(|b| b.kind == event.kind) {
                (binding.handler)(&mut cx, &event);
                ran += 1;
            }
        }
        if let Some(slot) = self.panel.page_at_mut(widget.page).and_then(|p| p.slot_mut(widget)) {
            bindings.append(&mut slot.bindings);
            slot.bindings = bindings;
        }
        tracing::trace!("{:?} on {}: {} handlers", event.kind, widget, ran);
    }

    fn route_outcomes(&mut self, now: Instant) {
        for (device, outcome) in self.env.devices_mut().poll_all(now) {
            let Some(widget) = self.env.take_route(device, outcome.ticket) else {
                continue;
            };
            let ticket = outcome.ticket;
            match outcome.result {
                Ok(reply) => self.dispatch(Event {
                    kind: EventKind::CommandCompleted,
                    widget,
                    detail: EventDetail::Completed { device, ticket, reply },
                }),
                Err(error) if error.is_transport() => {
                    tracing::debug!("{} for {} lost on {}: {}", ticket, widget, device, error);
                }
                Err(error) => {
                    tracing::warn!("{} rejected {} from {}: {}", device, ticket, widget, error);
                    self.dispatch(Event {
                        kind: EventKind::CommandFailed,
                        widget,
                        detail: EventDetail::Failed { device, ticket, error },
                    });
                }
            }
        }
    }
}
