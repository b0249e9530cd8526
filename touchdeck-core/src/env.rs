//! The Environment: clock, device clients and the async runtime they run on.
//! Built once at startup and handed by reference to every handler.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDateTime};
use tokio::runtime::{Handle, Runtime};
use touchdeck_io::{
    CommandOutcome, DeviceClient, DeviceCommand, DeviceError, DeviceView, HttpClient, HttpConfig,
    LinkStatus, MatrixConfig, MatrixKind, PlayerClient, PlayerConfig, PlayerSnapshot, Ticket,
    matrix_client,
};

use crate::widget::WidgetHandle;

// ════════════════════════════════════════════════════════════════════
// Devices
// ════════════════════════════════════════════════════════════════════

/// Index of a device client within the Environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub usize);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device {}", self.0)
    }
}

/// The configured device clients, in registration order.
#[derive(Default)]
pub struct DeviceSet {
    clients: Vec<Box<dyn DeviceClient>>,
}

impl DeviceSet {
    pub fn add(&mut self, client: Box<dyn DeviceClient>) -> DeviceId {
        self.clients.push(client);
        DeviceId(self.clients.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn get(&self, id: DeviceId) -> Option<&dyn DeviceClient> {
        self.clients.get(id.0).map(|c| c.as_ref())
    }

    pub fn get_mut(&mut self, id: DeviceId) -> Option<&mut (dyn DeviceClient + 'static)> {
        self.clients.get_mut(id.0).map(|c| c.as_mut())
    }

    pub fn status(&self, id: DeviceId) -> Option<LinkStatus> {
        self.get(id).map(|c| c.status())
    }

    pub fn view(&self, id: DeviceId) -> Option<DeviceView<'_>> {
        self.get(id).map(|c| c.view())
    }

    pub fn player(&self, id: DeviceId) -> Option<&PlayerSnapshot> {
        match self.view(id)? {
            DeviceView::Player(snapshot) => Some(snapshot),
            _ => None,
        }
    }

    pub fn send(&mut self, id: DeviceId, command: DeviceCommand) -> Result<Ticket, DeviceError> {
        match self.get_mut(id) {
            Some(client) => client.send_command(command),
            None => Err(DeviceError::Setup(format!("no {}", id))),
        }
    }

    pub fn poll_all(&mut self, now: Instant) -> Vec<(DeviceId, CommandOutcome)> {
        let mut out = Vec::new();
        for (i, client) in self.clients.iter_mut().enumerate() {
            out.extend(client.poll(now).into_iter().map(|o| (DeviceId(i), o)));
        }
        out
    }

    pub fn shutdown_all(&mut self) {
        for client in &mut self.clients {
            client.shutdown();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (DeviceId, &dyn DeviceClient)> {
        self.clients
            .iter()
            .enumerate()
            .map(|(i, c)| (DeviceId(i), c.as_ref()))
    }
}

// ════════════════════════════════════════════════════════════════════
// Clock
// ════════════════════════════════════════════════════════════════════

/// Time as seen by one tick: monotonic for pacing and timeouts, local wall
/// time for clock displays.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    started: Instant,
    now: Instant,
    wall: NaiveDateTime,
}

impl Clock {
    pub fn new(now: Instant) -> Self {
        Self {
            started: now,
            now,
            wall: Local::now().naive_local(),
        }
    }

    pub fn advance(&mut self, now: Instant, wall: NaiveDateTime) {
        self.now = now;
        self.wall = wall;
    }

    pub fn now(&self) -> Instant {
        self.now
    }

    pub fn wall(&self) -> NaiveDateTime {
        self.wall
    }

    pub fn uptime(&self) -> Duration {
        self.now.saturating_duration_since(self.started)
    }
}

/// Window size and the abstract-unit scale derived from it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    /// Abstract units are thousandths of the shorter window side.
    pub fn scale(&self) -> f32 {
        self.width.min(self.height) as f32 / 1000.0
    }
}

// ════════════════════════════════════════════════════════════════════
// Environment
// ════════════════════════════════════════════════════════════════════

pub struct Environment {
    runtime: Option<Runtime>,
    handle: Handle,
    devices: DeviceSet,
    clock: Clock,
    viewport: Viewport,
    /// Which widget issued which command, for routing outcomes back.
    routes: HashMap<(DeviceId, Ticket), WidgetHandle>,
    quit_requested: bool,
}

impl Environment {
    /// Starts a small multi-thread runtime for the device clients.
    pub fn new() -> io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("touchdeck-io")
            .enable_all()
            .build()?;
        let handle = runtime.handle().clone();
        Ok(Self {
            runtime: Some(runtime),
            handle,
            devices: DeviceSet::default(),
            clock: Clock::new(Instant::now()),
            viewport: Viewport {
                width: 0,
                height: 0,
            },
            routes: HashMap::new(),
            quit_requested: false,
        })
    }

    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    pub fn devices(&self) -> &DeviceSet {
        &self.devices
    }

    pub fn devices_mut(&mut self) -> &mut DeviceSet {
        &mut self.devices
    }

    pub fn add_device(&mut self, client: Box<dyn DeviceClient>) -> DeviceId {
        let id = self.devices.add(client);
        if let Some(c) = self.devices.get(id) {
            tracing::info!("registered {} as {}", c.name(), id);
        }
        id
    }

    pub fn add_player(&mut self, config: PlayerConfig) -> DeviceId {
        let client = PlayerClient::new(config, self.handle());
        self.add_device(Box::new(client))
    }

    pub fn add_matrix(&mut self, kind: MatrixKind, config: MatrixConfig) -> DeviceId {
        let client = matrix_client(kind, config, self.handle());
        self.add_device(client)
    }

    pub fn add_http(&mut self, config: HttpConfig) -> Result<DeviceId, DeviceError> {
        let client = HttpClient::new(config, self.handle())?;
        Ok(self.add_device(Box::new(client)))
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut Clock {
        &mut self.clock
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub(crate) fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    /// Send on behalf of `widget`; the outcome is dispatched back to it.
    pub fn send_for(
        &mut self,
        widget: WidgetHandle,
        device: DeviceId,
        command: DeviceCommand,
    ) -> Result<Ticket, DeviceError> {
        let ticket = self.devices.send(device, command)?;
        self.routes.insert((device, ticket), widget);
        Ok(ticket)
    }

    /// The widget that issued `ticket`, forgetting the route.
    pub(crate) fn take_route(&mut self, device: DeviceId, ticket: Ticket) -> Option<WidgetHandle> {
        self.routes.remove(&(device, ticket))
    }

    pub fn pending_routes(&self) -> usize {
        self.routes.len()
    }

    pub fn request_quit(&mut self) {
        self.quit_requested = true;
    }

    pub fn quit_requested(&self) -> bool {
        self.quit_requested
    }

    /// Stop all device clients and give their background work `grace` to
    /// finish. Anything still running afterwards is abandoned.
    pub fn shutdown(&mut self, grace: Duration) {
        self.devices.shutdown_all();
        self.routes.clear();
        if let Some(runtime) = self.runtime.take() {
            tracing::info!("stopping device runtime (grace {:?})", grace);
            runtime.shutdown_timeout(grace);
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.runtime.is_none()
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            self.devices.shutdown_all();
            runtime.shutdown_background();
        }
    }
}
