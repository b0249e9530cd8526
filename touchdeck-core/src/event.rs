//! Events, handler bindings, and the context handlers run with.

use std::time::Instant;

use chrono::NaiveDateTime;
use touchdeck_io::{DeviceCommand, DeviceError, LinkStatus, PlayerSnapshot, Reply, Ticket};

use crate::env::{DeviceId, Environment};
use crate::page::PageHandle;
use crate::panel::Panel;
use crate::widget::WidgetHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Pointer went down on the widget.
    Pressed,
    /// The pointer that pressed the widget went up, wherever it landed.
    Released,
    /// Pointer went down and up on the same widget.
    Activated,
    /// A command this widget issued succeeded.
    CommandCompleted,
    /// A command this widget issued was rejected by the device.
    CommandFailed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventDetail {
    Pointer { x: f32, y: f32 },
    Completed { device: DeviceId, ticket: Ticket, reply: Reply },
    Failed { device: DeviceId, ticket: Ticket, error: DeviceError },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    pub widget: WidgetHandle,
    pub detail: EventDetail,
}

pub type Handler = Box<dyn FnMut(&mut Context<'_>, &Event)>;

/// Returned by `bind`; pass to `Panel::unbind` to remove the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingHandle {
    pub widget: WidgetHandle,
    pub kind: EventKind,
    pub id: u64,
}

pub(crate) struct Binding {
    pub id: u64,
    pub kind: EventKind,
    pub handler: Handler,
}

/// Everything a handler may touch while it runs.
pub struct Context<'a> {
    panel: &'a mut Panel,
    env: &'a mut Environment,
    source: WidgetHandle,
}

impl<'a> Context<'a> {
    pub(crate) fn new(panel: &'a mut Panel, env: &'a mut Environment, source: WidgetHandle) -> Self {
        Self { panel, env, source }
    }

    /// The widget whose event is being handled.
    pub fn source(&self) -> WidgetHandle {
        self.source
    }

    pub fn now(&self) -> Instant {
        self.env.clock().now()
    }

    pub fn wall(&self) -> NaiveDateTime {
        self.env.clock().wall()
    }

    pub fn panel(&self) -> &Panel {
        &*self.panel
    }

    pub fn panel_mut(&mut self) -> &mut Panel {
        &mut *self.panel
    }

    pub fn env(&self) -> &Environment {
        &*self.env
    }

    pub fn env_mut(&mut self) -> &mut Environment {
        &mut *self.env
    }

    /// Issue a command on behalf of the source widget. Its outcome comes
    /// back to that widget as `CommandCompleted` or `CommandFailed`.
    pub fn send(&mut self, device: DeviceId, command: impl Into<DeviceCommand>) -> Result<Ticket, DeviceError> {
        let command = command.into();
        let kind = command.kind();
        let result = self.env.send_for(self.source, device, command);
        if let Err(e) = &result {
            tracing::warn!("{} from {} to {} not sent: {}", kind, self.source, device, e);
        }
        result
    }

    pub fn status(&self, device: DeviceId) -> Option<LinkStatus> {
        self.env.devices().status(device)
    }

    pub fn player(&self, device: DeviceId) -> Option<&PlayerSnapshot> {
        self.env.devices().player(device)
    }

    pub fn switch_page(&mut self, page: PageHandle) -> bool {
        self.panel.set_active(page).is_ok()
    }

    pub fn request_quit(&mut self) {
        self.env.request_quit();
    }
}
