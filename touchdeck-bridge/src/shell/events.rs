//! Winit input translation.
//!
//! Mouse and touch both become one pointer. Only the left button and the
//! first finger down drive it; further fingers are ignored until that
//! finger lifts.

use winit::event::{ElementState, MouseButton, TouchPhase};
use winit::keyboard::Key;

use touchdeck_core::InputEvent;

/// Where the pointer lands when a touch is cancelled. No widget sits there,
/// so the release activates nothing.
const CANCELLED: (f32, f32) = (-1.0, -1.0);

#[derive(Debug, Clone, Default)]
pub struct PointerTracker {
    position: Option<(f32, f32)>,
    mouse_down: bool,
    finger: Option<u64>,
}

impl PointerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_down(&self) -> bool {
        self.mouse_down || self.finger.is_some()
    }

    pub fn cursor_moved(&mut self, x: f64, y: f64) -> Option<InputEvent> {
        let (x, y) = (x as f32, y as f32);
        self.position = Some((x, y));
        self.mouse_down.then_some(InputEvent::PointerMove { x, y })
    }

    pub fn cursor_left(&mut self) {
        self.position = None;
    }

    pub fn mouse_button(&mut self, button: MouseButton, state: ElementState) -> Option<InputEvent> {
        if button != MouseButton::Left || self.finger.is_some() {
            return None;
        }
        match state {
            ElementState::Pressed => {
                let (x, y) = self.position?;
                self.mouse_down = true;
                Some(InputEvent::PointerDown { x, y })
            }
            ElementState::Released if self.mouse_down => {
                self.mouse_down = false;
                let (x, y) = self.position.unwrap_or(CANCELLED);
                Some(InputEvent::PointerUp { x, y })
            }
            ElementState::Released => None,
        }
    }

    pub fn touch(&mut self, id: u64, phase: TouchPhase, x: f64, y: f64) -> Option<InputEvent> {
        let (x, y) = (x as f32, y as f32);
        match phase {
            TouchPhase::Started if self.finger.is_none() && !self.mouse_down => {
                self.finger = Some(id);
                Some(InputEvent::PointerDown { x, y })
            }
            TouchPhase::Moved if self.finger == Some(id) => Some(InputEvent::PointerMove { x, y }),
            TouchPhase::Ended if self.finger == Some(id) => {
                self.finger = None;
                Some(InputEvent::PointerUp { x, y })
            }
            TouchPhase::Cancelled if self.finger == Some(id) => {
                self.finger = None;
                let (x, y) = CANCELLED;
                Some(InputEvent::PointerUp { x, y })
            }
            _ => None,
        }
    }
}

/// A pressed character key; everything else is not panel input.
pub fn key_input(key: &Key, state: ElementState) -> Option<InputEvent> {
    if state != ElementState::Pressed {
        return None;
    }
    match key {
        Key::Character(text) => text.chars().next().map(InputEvent::Key),
        _ => None,
    }
}
