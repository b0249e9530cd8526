//! The contract every device client implements, plus the pieces of link
//! bookkeeping they share.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DeviceError;
use crate::http::HttpRequest;
use crate::matrix::{Geometry, Tie};
use crate::player::{PlayerCommand, PlayerSnapshot};

// ════════════════════════════════════════════════════════════════════
// Link state
// ════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    /// The peer answered but is not the device we expected.
    Error,
}

impl LinkState {
    pub fn label(self) -> &'static str {
        match self {
            LinkState::Disconnected => "offline",
            LinkState::Connecting => "connecting",
            LinkState::Connected => "online",
            LinkState::Error => "error",
        }
    }
}

/// Snapshot of a link for status displays.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkStatus {
    pub state: LinkState,
    pub last_error: Option<DeviceError>,
    /// Connection attempts since the last successful connect.
    pub attempts: u32,
    /// Time left until the next connection attempt.
    pub retry_in: Option<Duration>,
    /// Full backoff delay chosen for that attempt.
    pub retry_delay: Option<Duration>,
}

impl LinkStatus {
    pub fn new(state: LinkState) -> Self {
        Self {
            state,
            last_error: None,
            attempts: 0,
            retry_in: None,
            retry_delay: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
    }
}

/// Reconnect delay schedule: starts at `initial`, doubles per failure, stops at `cap`.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    cap: Duration,
    current: Option<Duration>,
}

impl Backoff {
    pub const DEFAULT_INITIAL: Duration = Duration::from_millis(250);
    pub const DEFAULT_CAP: Duration = Duration::from_secs(10);

    pub fn new(initial: Duration, cap: Duration) -> Self {
        Self {
            initial,
            cap: cap.max(initial),
            current: None,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = match self.current {
            None => self.initial,
            Some(prev) => prev.saturating_mul(2).min(self.cap),
        };
        self.current = Some(delay);
        delay
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INITIAL, Self::DEFAULT_CAP)
    }
}

// ════════════════════════════════════════════════════════════════════
// Commands and outcomes
// ════════════════════════════════════════════════════════════════════

/// Identifies one issued command within a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(pub u64);

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    Player(PlayerCommand),
    Route(Vec<Tie>),
    Http(HttpRequest),
}

impl DeviceCommand {
    pub fn kind(&self) -> &'static str {
        match self {
            DeviceCommand::Player(_) => "player command",
            DeviceCommand::Route(_) => "routing",
            DeviceCommand::Http(_) => "http request",
        }
    }
}

impl From<PlayerCommand> for DeviceCommand {
    fn from(cmd: PlayerCommand) -> Self {
        DeviceCommand::Player(cmd)
    }
}

impl From<HttpRequest> for DeviceCommand {
    fn from(req: HttpRequest) -> Self {
        DeviceCommand::Http(req)
    }
}

impl From<Tie> for DeviceCommand {
    fn from(tie: Tie) -> Self {
        DeviceCommand::Route(vec![tie])
    }
}

/// What a device said back to a successful command.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Reply {
    #[default]
    Ack,
    Fields(Vec<(String, String)>),
    Json(Value),
    Text(String),
}

impl Reply {
    pub fn field(&self, key: &str) -> Option<&str> {
        match self {
            Reply::Fields(fields) => fields
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    pub ticket: Ticket,
    pub result: Result<Reply, DeviceError>,
}

// ════════════════════════════════════════════════════════════════════
// Client contract
// ════════════════════════════════════════════════════════════════════

/// Read-only view of what a client knows about its device.
#[derive(Debug, Clone, Copy)]
pub enum DeviceView<'a> {
    Player(&'a PlayerSnapshot),
    Matrix(Geometry),
    Http,
}

/// A device client as the panel loop sees it.
///
/// `send_command` and `poll` never block: work happens on session threads
/// or runtime tasks, and results come back through `poll`.
pub trait DeviceClient: Send {
    fn name(&self) -> &str;

    fn status(&self) -> LinkStatus;

    fn view(&self) -> DeviceView<'_>;

    fn send_command(&mut self, command: DeviceCommand) -> Result<Ticket, DeviceError>;

    /// Advance timers, reconnect if due, and collect finished commands.
    fn poll(&mut self, now: Instant) -> Vec<CommandOutcome>;

    fn shutdown(&mut self);
}
