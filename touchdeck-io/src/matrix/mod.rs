//! Video matrix switchers ("crossbars").
//!
//! Ties are zero-based everywhere in this crate; vendors add one when they
//! put numbers on the wire. One [`MatrixClient`] drives any vendor
//! protocol implementing [`Vendor`].

mod extron;
mod kramer;
mod lightware;

use std::fmt;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;

use crate::endpoint::Endpoint;
use crate::error::DeviceError;
use crate::link::{
    Backoff, CommandOutcome, DeviceClient, DeviceCommand, DeviceView, LinkStatus, Ticket,
};
use crate::session::{Link, LinkNotice, LinkTiming, Protocol, Step};

pub use extron::Extron;
pub use kramer::Kramer;
pub use lightware::Lightware;

static GEOMETRY_PATTERN: OnceLock<Regex> = OnceLock::new();

/// Route one input to one or more outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tie {
    pub input: usize,
    pub outputs: Vec<usize>,
}

impl Tie {
    pub fn new(input: usize, outputs: impl IntoIterator<Item = usize>) -> Self {
        Self {
            input,
            outputs: outputs.into_iter().collect(),
        }
    }
}

/// Expand ties into `(input, output)` pairs.
pub fn flatten_ties(ties: &[Tie]) -> Vec<(usize, usize)> {
    ties.iter()
        .flat_map(|t| t.outputs.iter().map(move |o| (t.input, *o)))
        .collect()
}

/// Input and output counts. Zero means not known yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Geometry {
    pub inputs: usize,
    pub outputs: usize,
}

impl Geometry {
    pub fn new(inputs: usize, outputs: usize) -> Self {
        Self { inputs, outputs }
    }

    pub fn is_known(&self) -> bool {
        self.inputs > 0 && self.outputs > 0
    }

    /// Fill in whichever counts are still unknown.
    pub fn merge(&mut self, other: Geometry) {
        if self.inputs == 0 {
            self.inputs = other.inputs;
        }
        if self.outputs == 0 {
            self.outputs = other.outputs;
        }
    }

    /// Find an `8x16`-style substring.
    pub fn parse(text: &str) -> Option<Geometry> {
        let re = GEOMETRY_PATTERN
            .get_or_init(|| Regex::new(r"(\d+)[xX](\d+)").expect("Invalid geometry Regex"));
        let caps = re.captures(text)?;
        Some(Geometry::new(caps[1].parse().ok()?, caps[2].parse().ok()?))
    }

    fn accepts(&self, tie: &Tie) -> bool {
        !tie.outputs.is_empty()
            && tie.input < self.inputs
            && tie.outputs.iter().all(|o| *o < self.outputs)
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.inputs, self.outputs)
    }
}

/// Field name vendors use to report discovered geometry during the handshake.
pub(crate) const GEOMETRY_FIELD: &str = "geometry";

/// A vendor's wire protocol.
pub trait Vendor: Protocol {
    const KIND: MatrixKind;

    /// Number of ports per side the wire format can address, if bounded.
    const PORT_LIMIT: Option<usize> = None;

    fn new(geometry: Geometry) -> Self;

    /// Steps that execute `ties`, already validated and non-empty.
    fn encode(&self, ties: &[Tie]) -> Vec<Step>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatrixKind {
    Extron,
    Lightware,
    Kramer,
}

impl MatrixKind {
    pub fn default_port(self) -> u16 {
        match self {
            MatrixKind::Extron => 23,
            MatrixKind::Lightware => 10001,
            MatrixKind::Kramer => 5000,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MatrixKind::Extron => "Extron",
            MatrixKind::Lightware => "Lightware",
            MatrixKind::Kramer => "Kramer",
        }
    }
}

impl std::str::FromStr for MatrixKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "extron" => Ok(MatrixKind::Extron),
            "lightware" | "lw" => Ok(MatrixKind::Lightware),
            "kramer" => Ok(MatrixKind::Kramer),
            other => Err(format!("unknown matrix kind '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixConfig {
    pub name: String,
    pub endpoint: Endpoint,
    /// Leave at zero to ask the device, where the protocol allows it.
    pub geometry: Geometry,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub backoff_initial: Duration,
    pub backoff_cap: Duration,
}

impl MatrixConfig {
    pub fn new(name: impl Into<String>, endpoint: Endpoint) -> Self {
        Self {
            name: name.into(),
            endpoint,
            geometry: Geometry::default(),
            timeout: Duration::from_millis(100),
            connect_timeout: Duration::from_secs(1),
            backoff_initial: Backoff::DEFAULT_INITIAL,
            backoff_cap: Backoff::DEFAULT_CAP,
        }
    }

    pub fn with_geometry(mut self, inputs: usize, outputs: usize) -> Self {
        self.geometry = Geometry::new(inputs, outputs);
        self
    }
}

pub struct MatrixClient<V: Vendor> {
    link: Link<V>,
    geometry: Geometry,
}

impl<V: Vendor> MatrixClient<V> {
    pub fn new(config: MatrixConfig, runtime: Handle) -> Self {
        let timing = LinkTiming {
            connect_timeout: config.connect_timeout,
            timeout: config.timeout,
            backoff: Backoff::new(config.backoff_initial, config.backoff_cap),
        };
        let protocol = V::new(config.geometry);
        Self {
            link: Link::new(config.name, config.endpoint, timing, protocol, runtime),
            geometry: config.geometry,
        }
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Validate and send `ties`. Invalid ties are dropped with a warning;
    /// if none survive, nothing is sent.
    pub fn tie(&mut self, ties: &[Tie]) -> Result<Ticket, DeviceError> {
        let valid: Vec<Tie> = ties
            .iter()
            .filter(|t| match self.rejection(t) {
                Some(reason) => {
                    tracing::warn!(device = %self.link.name(), "dropping tie {:?}: {}", t, reason);
                    false
                }
                None => true,
            })
            .cloned()
            .collect();
        if valid.is_empty() {
            return Err(DeviceError::InvalidTie);
        }
        tracing::info!(device = %self.link.name(), "TIE {:?}", flatten_ties(&valid));
        let steps = self.link.protocol().encode(&valid);
        self.link.submit(steps)
    }

    fn rejection(&self, tie: &Tie) -> Option<String> {
        if tie.outputs.is_empty() {
            return Some("no outputs".into());
        }
        if self.geometry.is_known() && !self.geometry.accepts(tie) {
            return Some(format!("outside {}", self.geometry));
        }
        match V::PORT_LIMIT {
            Some(limit) if tie.input >= limit || tie.outputs.iter().any(|o| *o >= limit) => Some(
                format!("{} addresses at most {} ports", V::KIND.label(), limit),
            ),
            _ => None,
        }
    }
}

impl<V: Vendor> DeviceClient for MatrixClient<V> {
    fn name(&self) -> &str {
        self.link.name()
    }

    fn status(&self) -> LinkStatus {
        self.link.status()
    }

    fn view(&self) -> DeviceView<'_> {
        DeviceView::Matrix(self.geometry)
    }

    fn send_command(&mut self, command: DeviceCommand) -> Result<Ticket, DeviceError> {
        match command {
            DeviceCommand::Route(ties) => self.tie(&ties),
            other => Err(DeviceError::Unsupported(other.kind())),
        }
    }

    fn poll(&mut self, now: Instant) -> Vec<CommandOutcome> {
        let mut outcomes = Vec::new();
        for notice in self.link.poll(now) {
            match notice {
                LinkNotice::Connected(fields) => {
                    let found = fields
                        .iter()
                        .find(|(k, _)| k == GEOMETRY_FIELD)
                        .and_then(|(_, v)| Geometry::parse(v));
                    if let Some(found) = found {
                        if !self.geometry.is_known() {
                            tracing::info!(device = %self.link.name(), "{} matrix reports {}", V::KIND.label(), found);
                        }
                        self.geometry.merge(found);
                        self.link.set_protocol(V::new(self.geometry));
                    }
                }
                LinkNotice::Completed(ticket, result) => {
                    if let Err(e) = &result {
                        tracing::error!(device = %self.link.name(), "tie {} failed: {}", ticket, e);
                    }
                    outcomes.push(CommandOutcome { ticket, result });
                }
                LinkNotice::Lost => {}
            }
        }
        outcomes
    }

    fn shutdown(&mut self) {
        self.link.shutdown();
    }
}

/// Build a boxed client for a matrix kind chosen at runtime.
pub fn matrix_client(
    kind: MatrixKind,
    config: MatrixConfig,
    runtime: Handle,
) -> Box<dyn DeviceClient> {
    match kind {
        MatrixKind::Extron => Box::new(MatrixClient::<Extron>::new(config, runtime)),
        MatrixKind::Lightware => Box::new(MatrixClient::<Lightware>::new(config, runtime)),
        MatrixKind::Kramer => Box::new(MatrixClient::<Kramer>::new(config, runtime)),
    }
}
