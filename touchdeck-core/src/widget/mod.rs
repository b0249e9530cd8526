//! The widget set. A closed enum with one capability interface:
//! render, hit-test, and a built-in reaction to activation.

pub mod button;
pub mod clock;
pub mod group;
pub mod label;
pub mod lamp;
pub mod player_status;

use std::fmt;
use std::time::Instant;

use chrono::NaiveDateTime;
use touchdeck_io::DeviceCommand;

use crate::canvas::Painter;
use crate::env::{DeviceId, DeviceSet};
use crate::geometry::Rect;

pub use button::{Button, ButtonPalette, Indicator, StateColors, fade_indicator};
pub use clock::{Clock, ClockStyle, digit_pattern};
pub use group::Group;
pub use label::Label;
pub use lamp::StatusLamp;
pub use player_status::{PlayerStatus, Transport};

/// Addresses one widget: its page and its slot on that page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WidgetHandle {
    pub page: usize,
    pub index: usize,
}

impl fmt::Display for WidgetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "widget {}/{}", self.page, self.index)
    }
}

/// Flags every widget carries regardless of kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WidgetState {
    pub visible: bool,
    pub enabled: bool,
    /// A pointer went down on the widget and is still over it.
    pub pressed: bool,
}

impl Default for WidgetState {
    fn default() -> Self {
        Self {
            visible: true,
            enabled: true,
            pressed: false,
        }
    }
}

/// Per-frame inputs to rendering.
pub struct Frame<'a> {
    pub now: Instant,
    pub wall: NaiveDateTime,
    pub devices: &'a DeviceSet,
}

/// What a widget does on its own when activated, before bound handlers run.
#[derive(Debug, Clone, PartialEq)]
pub enum Builtin {
    Send(DeviceId, DeviceCommand),
}

pub enum Widget {
    Button(Button),
    Label(Label),
    Clock(Clock),
    PlayerStatus(PlayerStatus),
    Group(Group),
    Lamp(StatusLamp),
}

impl Widget {
    pub fn kind(&self) -> &'static str {
        match self {
            Widget::Button(_) => "button",
            Widget::Label(_) => "label",
            Widget::Clock(_) => "clock",
            Widget::PlayerStatus(_) => "player status",
            Widget::Group(_) => "group",
            Widget::Lamp(_) => "status lamp",
        }
    }

    pub fn render(&self, painter: &mut Painter<'_>, rect: Rect, state: WidgetState, frame: &Frame<'_>) {
        match self {
            Widget::Button(w) => w.render(painter, rect, state, frame),
            Widget::Label(w) => w.render(painter, rect),
            Widget::Clock(w) => w.render(painter, rect, frame),
            Widget::PlayerStatus(w) => w.render(painter, rect, frame),
            Widget::Group(w) => w.render(painter, rect),
            Widget::Lamp(w) => w.render(painter, rect, frame),
        }
    }

    pub fn hit_test(&self, rect: Rect, x: f32, y: f32) -> bool {
        rect.contains(x, y)
    }

    /// Whether pointer input should reach this widget at all.
    pub fn accepts_input(&self, state: WidgetState) -> bool {
        state.visible && state.enabled
    }

    /// Built-in reaction to a press at `press` released at `release`.
    pub fn activate(
        &mut self,
        rect: Rect,
        press: (f32, f32),
        release: (f32, f32),
        scale: f32,
        devices: &DeviceSet,
    ) -> Option<Builtin> {
        match self {
            Widget::Button(w) => {
                w.on_activate();
                None
            }
            Widget::PlayerStatus(w) => w.on_activate(rect, press, release, scale, devices),
            _ => None,
        }
    }

    pub fn as_button(&self) -> Option<&Button> {
        match self {
            Widget::Button(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_button_mut(&mut self) -> Option<&mut Button> {
        match self {
            Widget::Button(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_label_mut(&mut self) -> Option<&mut Label> {
        match self {
            Widget::Label(l) => Some(l),
            _ => None,
        }
    }
}

impl From<Button> for Widget {
    fn from(w: Button) -> Self {
        Widget::Button(w)
    }
}

impl From<Label> for Widget {
    fn from(w: Label) -> Self {
        Widget::Label(w)
    }
}

impl From<Clock> for Widget {
    fn from(w: Clock) -> Self {
        Widget::Clock(w)
    }
}

impl From<PlayerStatus> for Widget {
    fn from(w: PlayerStatus) -> Self {
        Widget::PlayerStatus(w)
    }
}

impl From<Group> for Widget {
    fn from(w: Group) -> Self {
        Widget::Group(w)
    }
}

impl From<StatusLamp> for Widget {
    fn from(w: StatusLamp) -> Self {
        Widget::Lamp(w)
    }
}
