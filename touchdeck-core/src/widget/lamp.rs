//! Connection-status lamp for one device.

use touchdeck_io::LinkState;

use crate::canvas::{Align, Painter};
use crate::color::{Rgba, hex};
use crate::env::DeviceId;
use crate::geometry::Rect;

use super::Frame;

pub struct StatusLamp {
    pub device: DeviceId,
    pub caption: String,
    pub background: Rgba,
    pub text: Rgba,
}

impl StatusLamp {
    pub fn new(device: DeviceId, caption: impl Into<String>) -> Self {
        Self {
            device,
            caption: caption.into(),
            background: hex("111"),
            text: hex("ccc"),
        }
    }

    pub fn lamp_color(state: Option<LinkState>) -> Rgba {
        match state {
            Some(LinkState::Connected) => hex("3c4"),
            Some(LinkState::Connecting) => hex("fb2"),
            Some(LinkState::Disconnected) | Some(LinkState::Error) | None => hex("e33"),
        }
    }

    pub fn render(&self, painter: &mut Painter<'_>, rect: Rect, frame: &Frame<'_>) {
        let state = frame.devices.status(self.device).map(|s| s.state);
        let margin = painter.px(15.0);
        painter.fill(rect, self.background, painter.px(20.0));

        let inner = rect.inset(margin);
        let d = inner.h.min(inner.w * 0.3) * 0.6;
        let lamp = Rect::new(inner.x, inner.y + (inner.h - d) * 0.5, d, d);
        painter.fill(lamp, Self::lamp_color(state), d * 0.5);

        let text_x = lamp.right() + margin;
        let label = match state {
            Some(s) => format!("{}\n{}", self.caption, s.label()),
            None => self.caption.clone(),
        };
        let area = Rect::from_edges(text_x, inner.y, inner.right(), inner.bottom());
        let lines = painter.fit(area, painter.px(40.0), &label, Align::Start, Align::Center);
        painter.fitted(&lines, self.text);
    }
}
