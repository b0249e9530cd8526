//! Where a byte-stream device lives: a TCP socket or a serial port.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serialport::SerialPort;

/// Smallest read timeout handed to the OS; zero means "block forever" on some platforms.
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endpoint {
    Tcp { host: String, port: u16 },
    Serial { path: String, baud: u32 },
}

impl Endpoint {
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Endpoint::Tcp {
            host: host.into(),
            port,
        }
    }

    pub fn serial(path: impl Into<String>, baud: u32) -> Self {
        Endpoint::Serial {
            path: path.into(),
            baud,
        }
    }

    /// Parse `host` or `host:port`, falling back to `default_port`.
    pub fn parse_tcp(spec: &str, default_port: u16) -> Self {
        let spec = spec.trim();
        match spec.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && !host.contains(':') => {
                match port.parse::<u16>() {
                    Ok(port) => Endpoint::tcp(host, port),
                    Err(_) => Endpoint::tcp(spec, default_port),
                }
            }
            _ => Endpoint::tcp(spec, default_port),
        }
    }

    /// Open the transport. Blocking; only ever called from a session thread.
    pub fn open(&self, connect_timeout: Duration) -> io::Result<Box<dyn Transport>> {
        match self {
            Endpoint::Tcp { host, port } => {
                let mut last_err = None;
                for addr in (host.as_str(), *port).to_socket_addrs()? {
                    match TcpStream::connect_timeout(&addr, connect_timeout) {
                        Ok(stream) => {
                            stream.set_nodelay(true)?;
                            return Ok(Box::new(stream));
                        }
                        Err(e) => last_err = Some(e),
                    }
                }
                Err(last_err.unwrap_or_else(|| {
                    io::Error::new(io::ErrorKind::NotFound, format!("{} did not resolve", host))
                }))
            }
            Endpoint::Serial { path, baud } => {
                let port = serialport::new(path, *baud)
                    .timeout(connect_timeout)
                    .open()
                    .map_err(io::Error::from)?;
                Ok(Box::new(port))
            }
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { host, port } => write!(f, "{}:{}", host, port),
            Endpoint::Serial { path, baud } => write!(f, "{}@{}", path, baud),
        }
    }
}

/// A connected byte stream with an adjustable read timeout.
pub trait Transport: Read + Write + Send {
    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()>;
}

impl Transport for TcpStream {
    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        TcpStream::set_read_timeout(self, Some(timeout.max(MIN_READ_TIMEOUT)))
    }
}

impl Transport for Box<dyn SerialPort> {
    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.set_timeout(timeout.max(MIN_READ_TIMEOUT))
            .map_err(io::Error::from)
    }
}
