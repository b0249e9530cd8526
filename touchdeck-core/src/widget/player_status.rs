//! Media-player display: metadata lines, track and time counters, and a row
//! of transport buttons that drive the bound player.

use touchdeck_io::{DeviceCommand, PlayerCommand, PlayerSnapshot};

use crate::canvas::{Align, Painter};
use crate::color::{Rgba, hex};
use crate::env::{DeviceId, DeviceSet};
use crate::geometry::Rect;

use super::{Builtin, Frame};

/// Seconds skipped by the seek buttons.
pub const SEEK_STEP: i32 = 10;

const ICONS: [&str; 3] = ["\u{266B}", "\u{263A}", "\u{2680}"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Previous,
    SeekBack,
    PlayPause,
    SeekForward,
    Next,
}

impl Transport {
    /// Left to right.
    pub const ALL: [Transport; 5] = [
        Transport::Previous,
        Transport::SeekBack,
        Transport::PlayPause,
        Transport::SeekForward,
        Transport::Next,
    ];

    pub fn icon(self, playing: bool) -> &'static str {
        match self {
            Transport::Previous => "\u{23EE}",
            Transport::SeekBack => "\u{23EA}",
            Transport::PlayPause if playing => "\u{23F8}",
            Transport::PlayPause => "\u{23F5}",
            Transport::SeekForward => "\u{23E9}",
            Transport::Next => "\u{23ED}",
        }
    }

    pub fn command(self, playing: bool) -> PlayerCommand {
        match self {
            Transport::Previous => PlayerCommand::Previous,
            Transport::SeekBack => PlayerCommand::Seek(-SEEK_STEP),
            Transport::PlayPause if playing => PlayerCommand::Pause,
            Transport::PlayPause => PlayerCommand::Play,
            Transport::SeekForward => PlayerCommand::Seek(SEEK_STEP),
            Transport::Next => PlayerCommand::Next,
        }
    }
}

/// Pixel geometry for one widget rect.
struct Layout {
    icons: [Rect; 3],
    lines: [Rect; 3],
    controls: Rect,
    buttons: [Rect; 5],
    base_size: f32,
}

pub struct PlayerStatus {
    pub device: DeviceId,
    pub background: Rgba,
    pub text: Rgba,
    pub icons: Rgba,
    pub time_color: Rgba,
    pub buttons: Rgba,
    /// Alpha of the transport icons while disconnected.
    pub disabled_alpha: f32,
    pub size: f32,
    pub margin: f32,
    pub radius: f32,
    pub icon_gap: f32,
    pub time_size: f32,
    /// Height of the controls row relative to a metadata line.
    pub controls: f32,
}

impl PlayerStatus {
    pub fn new(device: DeviceId) -> Self {
        Self {
            device,
            background: hex("111"),
            text: hex("fff"),
            icons: hex("888"),
            time_color: hex("ccc"),
            buttons: hex("fff"),
            disabled_alpha: 0.5,
            size: 50.0,
            margin: 20.0,
            radius: 20.0,
            icon_gap: 20.0,
            time_size: 0.75,
            controls: 1.0,
        }
    }

    fn layout(&self, rect: Rect, scale: f32) -> Layout {
        let px = |u: f32| (u * scale).round();
        let inner = rect.inset(px(self.margin));
        let row = (inner.h / (3.0 + self.controls)).floor();
        let text_x = inner.x + row + px(self.icon_gap);
        let icons = [0, 1, 2].map(|i| Rect::new(inner.x, inner.y + i as f32 * row, row, row));
        let lines = [0, 1, 2].map(|i| {
            Rect::from_edges(text_x, inner.y + i as f32 * row, inner.right(), inner.y + (i + 1) as f32 * row)
        });
        let controls = Rect::from_edges(inner.x, inner.y + 3.0 * row, inner.right(), inner.bottom());
        let bh = controls.h;
        let bx0 = ((inner.x + inner.right() - 5.0 * bh) / 2.0).floor();
        let buttons = [0, 1, 2, 3, 4].map(|i| Rect::new(bx0 + i as f32 * bh, controls.y, bh, bh));
        Layout {
            icons,
            lines,
            controls,
            buttons,
            base_size: px(self.size),
        }
    }

    /// The transport button under `(x, y)`, if any.
    pub fn transport_at(&self, rect: Rect, scale: f32, x: f32, y: f32) -> Option<Transport> {
        let layout = self.layout(rect, scale);
        layout
            .buttons
            .iter()
            .position(|b| b.contains(x, y))
            .map(|i| Transport::ALL[i])
    }

    /// The transport button a press at `press` released at `release` fires.
    /// Both ends must land on the same button.
    pub fn transport_for(
        &self,
        rect: Rect,
        scale: f32,
        press: (f32, f32),
        release: (f32, f32),
    ) -> Option<Transport> {
        let pressed = self.transport_at(rect, scale, press.0, press.1)?;
        let released = self.transport_at(rect, scale, release.0, release.1)?;
        (pressed == released).then_some(pressed)
    }

    pub(crate) fn on_activate(
        &mut self,
        rect: Rect,
        press: (f32, f32),
        release: (f32, f32),
        scale: f32,
        devices: &DeviceSet,
    ) -> Option<Builtin> {
        let snapshot = devices.player(self.device)?;
        if !snapshot.connected {
            return None;
        }
        let transport = self.transport_for(rect, scale, press, release)?;
        let command = transport.command(snapshot.is_playing());
        Some(Builtin::Send(self.device, DeviceCommand::Player(command)))
    }

    pub fn render(&self, painter: &mut Painter<'_>, rect: Rect, frame: &Frame<'_>) {
        let layout = self.layout(rect, painter.scale());
        let empty = PlayerSnapshot::default();
        let snapshot = frame.devices.player(self.device).unwrap_or(&empty);

        painter.fill(rect, self.background, painter.px(self.radius));

        for (icon, area) in ICONS.iter().zip(layout.icons) {
            let lines = painter.fit(area, layout.base_size, icon, Align::Start, Align::Center);
            painter.fitted(&lines, self.icons);
        }
        let meta = [&snapshot.title, &snapshot.artist, &snapshot.album];
        for (text, area) in meta.into_iter().zip(layout.lines) {
            let lines = painter.fit(area, layout.base_size, text, Align::Start, Align::Center);
            painter.fitted(&lines, self.text);
        }

        let c = layout.controls;
        let tt_size = (c.h.min(layout.base_size) * self.time_size).floor();
        let tt_y = (c.y + c.bottom() - painter.line_height(tt_size)) / 2.0;
        painter.text_line(c.x, tt_y, tt_size, &snapshot.track_text(), self.time_color);
        let time = snapshot.time_text();
        let time_x = c.right() - painter.text_width(&time, tt_size);
        painter.text_line(time_x, tt_y, tt_size, &time, self.time_color);

        let color = if snapshot.connected {
            self.buttons
        } else {
            self.buttons.alpha(self.disabled_alpha)
        };
        let playing = snapshot.is_playing();
        for (transport, area) in Transport::ALL.iter().zip(layout.buttons) {
            let lines = painter.fit(area, area.h, transport.icon(playing), Align::Center, Align::Center);
            painter.fitted(&lines, color);
        }
    }
}
