//! Push and toggle buttons with Oklch-derived palettes.

use std::time::Duration;

use touchdeck_io::{DeviceView, FadeInfo};

use crate::canvas::{Align, Painter, Shadow};
use crate::color::{Lab, Rgba, hex};
use crate::env::{DeviceId, DeviceSet};
use crate::geometry::Rect;

use super::{Frame, WidgetState};

/// Lights a button from device state, e.g. while a fade is running.
pub type Indicator = Box<dyn Fn(&DeviceSet) -> bool>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateColors {
    pub outline: Rgba,
    pub fill1: Rgba,
    pub fill2: Rgba,
    pub text: Rgba,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ButtonPalette {
    pub normal: StateColors,
    pub active: StateColors,
    pub disabled: StateColors,
}

impl ButtonPalette {
    /// Derive all three states from a base hue (degrees), saturation
    /// (Oklch chroma, 0.37 is fully saturated) and lightness.
    pub fn from_oklch(hue: f32, sat: f32, light: f32, text: Rgba) -> Self {
        let (h, c, l) = (hue, sat, light);
        let lab_light = Lab::from_lch(0.98, 0.05, 100.0);
        let t_light = 0.75;
        let lab_text = text.to_oklab();
        let lab_outline = Lab::from_lch(l * 0.5, c * 0.5, h);
        let lab_fill1 = Lab::from_lch(l + 0.05, c, h);
        let lab_fill2 = Lab::from_lch(l - 0.05, c, h);
        ButtonPalette {
            normal: StateColors {
                outline: lab_outline.to_rgba(),
                fill1: lab_fill1.to_rgba(),
                fill2: lab_fill2.to_rgba(),
                text,
            },
            active: StateColors {
                outline: lab_outline.lerp(lab_light, t_light * 0.5).to_rgba(),
                fill1: lab_fill1.lerp(lab_light, t_light).to_rgba(),
                fill2: lab_fill2.lerp(lab_light, t_light).to_rgba(),
                text: lab_text.lerp(lab_light, t_light * 0.5).to_rgba(),
            },
            disabled: StateColors {
                outline: Lab::from_lch(l * 0.3, c * 0.25, h).to_rgba(),
                fill1: Lab::from_lch(l * 0.6 + 0.05, c * 0.5, h).to_rgba(),
                fill2: Lab::from_lch(l * 0.6 - 0.05, c * 0.5, h).to_rgba(),
                text,
            },
        }
    }
}

impl Default for ButtonPalette {
    fn default() -> Self {
        ButtonPalette::from_oklch(30.0, 0.0, 0.75, hex("000"))
    }
}

pub struct Button {
    pub text: String,
    pub palette: ButtonPalette,
    pub size: f32,
    pub border: f32,
    pub shadow: f32,
    pub radius: f32,
    /// Stay active after activation until activated again.
    pub toggle: bool,
    active: bool,
    indicator: Option<Indicator>,
}

impl Button {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            palette: ButtonPalette::default(),
            size: 50.0,
            border: 3.0,
            shadow: 15.0,
            radius: 25.0,
            toggle: false,
            active: false,
            indicator: None,
        }
    }

    pub fn with_hue(mut self, hue: f32, sat: f32) -> Self {
        self.palette = ButtonPalette::from_oklch(hue, sat, 0.75, self.palette.normal.text);
        self
    }

    pub fn with_palette(mut self, palette: ButtonPalette) -> Self {
        self.palette = palette;
        self
    }

    pub fn with_size(mut self, size: f32) -> Self {
        self.size = size;
        self
    }

    pub fn toggle(mut self) -> Self {
        self.toggle = true;
        self
    }

    pub fn lit_by(mut self, indicator: Indicator) -> Self {
        self.indicator = Some(indicator);
        self
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub(crate) fn on_activate(&mut self) {
        if self.toggle {
            self.active = !self.active;
        }
    }

    pub fn colors(&self, state: WidgetState, devices: &DeviceSet) -> StateColors {
        let lit = self.indicator.as_ref().is_some_and(|f| f(devices));
        if !state.enabled {
            self.palette.disabled
        } else if self.active || state.pressed || lit {
            self.palette.active
        } else {
            self.palette.normal
        }
    }

    pub fn render(&self, painter: &mut Painter<'_>, rect: Rect, state: WidgetState, frame: &Frame<'_>) {
        let colors = self.colors(state, frame.devices);
        let border = painter.px(self.border);
        let shadow = painter.px(self.shadow);
        painter.outline_box(
            rect,
            border,
            colors.outline,
            colors.fill1,
            colors.fill2,
            painter.px(self.radius),
            Shadow {
                offset: shadow * 0.25,
                blur: shadow,
                grow: shadow,
            },
        );
        let text_box = Rect::from_edges(
            rect.x + border * 1.5,
            rect.y + border,
            rect.right() - border * 1.5,
            rect.bottom() - border,
        );
        let lines = painter.fit(text_box, painter.px(self.size), &self.text, Align::Center, Align::Center);
        painter.fitted(&lines, colors.text);
    }
}

/// Lit while `device` runs a fade of exactly `duration`.
pub fn fade_indicator(device: DeviceId, duration: Duration) -> Indicator {
    Box::new(move |devices: &DeviceSet| match devices.view(device) {
        Some(DeviceView::Player(snapshot)) => {
            matches!(snapshot.fade, Some(FadeInfo { duration: d, .. }) if d == duration)
        }
        _ => false,
    })
}
