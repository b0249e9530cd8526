//! Error type shared by every device client.

use std::io;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// The link is down; the command was not sent.
    #[error("device is not connected")]
    NotConnected,

    /// The device did not answer within the configured timeout.
    #[error("device did not answer in time")]
    Timeout,

    /// The device answered, but the answer was a rejection or unreadable.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The command kind does not apply to this device.
    #[error("{0} is not supported by this device")]
    Unsupported(&'static str),

    /// None of the requested ties fit the matrix geometry.
    #[error("no valid tie in request")]
    InvalidTie,

    /// The client could not be constructed.
    #[error("client setup failed: {0}")]
    Setup(String),
}

impl DeviceError {
    /// Transport-level failures are retried by the link and only surface as
    /// link status; the rest are reported back to the issuer.
    pub fn is_transport(&self) -> bool {
        matches!(self, DeviceError::NotConnected | DeviceError::Timeout)
    }
}

impl From<io::Error> for DeviceError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => DeviceError::Timeout,
            _ => DeviceError::NotConnected,
        }
    }
}
