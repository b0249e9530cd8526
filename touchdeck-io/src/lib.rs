//! # Touchdeck IO
//!
//! The Device Bridge.
//! Talks to the equipment a panel controls: MPD media players, video
//! matrix switchers (Extron, Lightware, Kramer) and plain HTTP/JSON
//! endpoints.
//!
//! Every client is polled from the panel loop and never blocks it.
//! Byte-stream links run in a dedicated blocking session per connection;
//! HTTP requests run as tasks on the shared Tokio runtime.

pub mod endpoint;
pub mod error;
pub mod http;
pub mod link;
pub mod matrix;
pub mod player;
pub mod session;

pub use endpoint::Endpoint;
pub use error::DeviceError;
pub use http::{HttpBody, HttpClient, HttpConfig, HttpMethod, HttpRequest};
pub use link::{
    Backoff, CommandOutcome, DeviceClient, DeviceCommand, DeviceView, LinkState, LinkStatus,
    Reply, Ticket,
};
pub use matrix::{
    Extron, Geometry, Kramer, Lightware, MatrixClient, MatrixConfig, MatrixKind, Tie, Vendor,
    flatten_ties, matrix_client,
};
pub use player::{
    FadeDirection, FadeInfo, PlayState, PlayerClient, PlayerCommand, PlayerConfig, PlayerSnapshot,
};
