//! Byte-stream sessions.
//!
//! A [`Link`] owns the reconnect state machine and lives on the panel
//! loop. Each connection attempt spawns one blocking session thread that
//! opens the transport, runs the protocol handshake, then executes jobs
//! one at a time. Dropping the job sender ends the session.

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use crate::endpoint::{Endpoint, Transport};
use crate::error::DeviceError;
use crate::link::{Backoff, LinkState, LinkStatus, Reply, Ticket};

/// Commands accepted while a connection is still being established.
const MAX_QUEUED_JOBS: usize = 32;

/// How many times a job may be sent before a lost connection fails it.
const MAX_JOB_ATTEMPTS: u32 = 2;

// ════════════════════════════════════════════════════════════════════
// Protocol contract
// ════════════════════════════════════════════════════════════════════

/// One write followed by the replies that complete it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub payload: Vec<u8>,
    /// Acknowledgements to collect before the step is done. Zero means fire and forget.
    pub replies: usize,
}

impl Step {
    pub fn new(payload: impl Into<Vec<u8>>, replies: usize) -> Self {
        Self {
            payload: payload.into(),
            replies,
        }
    }

    pub fn line(text: &str) -> Self {
        Self::new(format!("{}\n", text), 1)
    }
}

/// How a protocol reads one received frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Field(String, String),
    Ack(Vec<(String, String)>),
    Reject(String),
    /// Banners, echoes and anything else unrelated to the pending step.
    Noise,
}

pub trait Protocol: Clone + Send + 'static {
    /// Cut one complete frame off the front of `buf`.
    fn split(&self, buf: &mut Vec<u8>) -> Option<Vec<u8>>;

    fn classify(&mut self, frame: &[u8]) -> Frame;

    /// Called before `step` is written, so replies can be matched to it.
    fn begin(&mut self, _step: &Step) {}

    /// Step run right after the transport opens, if the device needs one.
    fn handshake(&self) -> Option<Step> {
        None
    }

    /// Decide whether the handshake fields identify the right kind of peer.
    fn verify_handshake(&self, _fields: &[(String, String)]) -> Result<(), String> {
        Ok(())
    }
}

/// Split on `\n` or `\r`, skipping empty lines.
pub fn split_line(buf: &mut Vec<u8>) -> Option<Vec<u8>> {
    loop {
        let end = buf.iter().position(|b| *b == b'\n' || *b == b'\r')?;
        let line: Vec<u8> = buf.drain(..=end).take(end).collect();
        if !line.is_empty() {
            return Some(line);
        }
    }
}

// ════════════════════════════════════════════════════════════════════
// Session thread
// ════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub(crate) struct Job {
    pub ticket: Ticket,
    pub steps: Vec<Step>,
    pub attempts: u32,
}

#[derive(Debug)]
enum SessionEvent {
    Connected(Vec<(String, String)>),
    Refused(DeviceError),
    Done(Ticket, Result<Reply, DeviceError>),
    Lost(DeviceError),
}

struct Session<P: Protocol> {
    name: String,
    io: Box<dyn Transport>,
    protocol: P,
    buf: Vec<u8>,
    timeout: Duration,
}

impl<P: Protocol> Session<P> {
    fn exchange(&mut self, step: &Step) -> Result<Vec<(String, String)>, DeviceError> {
        self.protocol.begin(step);
        if !step.payload.is_empty() {
            tracing::debug!(device = %self.name, "SEND {:?}", String::from_utf8_lossy(&step.payload));
            self.io.write_all(&step.payload)?;
            self.io.flush()?;
        }

        let deadline = Instant::now() + self.timeout;
        let mut fields = Vec::new();
        let mut acks = 0;
        if step.replies == 0 {
            return Ok(fields);
        }

        let mut chunk = [0u8; 1024];
        loop {
            while let Some(frame) = self.protocol.split(&mut self.buf) {
                tracing::trace!(device = %self.name, "RECV {:?}", String::from_utf8_lossy(&frame));
                match self.protocol.classify(&frame) {
                    Frame::Field(key, value) => fields.push((key, value)),
                    Frame::Ack(mut extra) => {
                        fields.append(&mut extra);
                        acks += 1;
                        if acks >= step.replies {
                            return Ok(fields);
                        }
                    }
                    Frame::Reject(msg) => return Err(DeviceError::Protocol(msg)),
                    Frame::Noise => {}
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(DeviceError::Timeout);
            }
            self.io.set_read_timeout(deadline - now)?;
            match self.io.read(&mut chunk) {
                Ok(0) => return Err(DeviceError::NotConnected),
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                    ) => {}
                Err(_) => return Err(DeviceError::NotConnected),
            }
        }
    }
}

fn run_session<P: Protocol>(
    name: String,
    endpoint: Endpoint,
    connect_timeout: Duration,
    timeout: Duration,
    protocol: P,
    mut jobs: mpsc::UnboundedReceiver<Job>,
    events: mpsc::UnboundedSender<SessionEvent>,
) {
    let io = match endpoint.open(connect_timeout) {
        Ok(io) => io,
        Err(e) => {
            tracing::debug!(device = %name, "open {} failed: {}", endpoint, e);
            let _ = events.send(SessionEvent::Lost(DeviceError::from(e)));
            return;
        }
    };

    let mut session = Session {
        name,
        io,
        protocol,
        buf: Vec::new(),
        timeout,
    };

    let greeting = match session.protocol.handshake() {
        Some(step) => match session.exchange(&step) {
            Ok(fields) => fields,
            Err(DeviceError::Protocol(msg)) => {
                let _ = events.send(SessionEvent::Refused(DeviceError::Protocol(msg)));
                return;
            }
            Err(error) => {
                let _ = events.send(SessionEvent::Lost(error));
                return;
            }
        },
        None => Vec::new(),
    };
    if let Err(msg) = session.protocol.verify_handshake(&greeting) {
        let _ = events.send(SessionEvent::Refused(DeviceError::Protocol(msg)));
        return;
    }
    if events.send(SessionEvent::Connected(greeting)).is_err() {
        return;
    }

    while let Some(job) = jobs.blocking_recv() {
        let mut result = Ok(Reply::Ack);
        for step in &job.steps {
            match session.exchange(step) {
                Ok(fields) if fields.is_empty() => result = Ok(Reply::Ack),
                Ok(fields) => result = Ok(Reply::Fields(fields)),
                Err(DeviceError::Protocol(msg)) => {
                    result = Err(DeviceError::Protocol(msg));
                    break;
                }
                Err(error) => {
                    let _ = events.send(SessionEvent::Lost(error));
                    return;
                }
            }
        }
        if events.send(SessionEvent::Done(job.ticket, result)).is_err() {
            return;
        }
    }
    tracing::debug!(device = %session.name, "session closed");
}

// ════════════════════════════════════════════════════════════════════
// Link state machine
// ════════════════════════════════════════════════════════════════════

/// Link timing knobs shared by every byte-stream client.
#[derive(Debug, Clone)]
pub struct LinkTiming {
    pub connect_timeout: Duration,
    pub timeout: Duration,
    pub backoff: Backoff,
}

/// What happened on a link since the previous poll.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkNotice {
    Connected(Vec<(String, String)>),
    Completed(Ticket, Result<Reply, DeviceError>),
    Lost,
}

pub struct Link<P: Protocol> {
    name: String,
    endpoint: Endpoint,
    timing: LinkTiming,
    protocol: P,
    runtime: Handle,
    status: LinkStatus,
    next_attempt: Option<Instant>,
    jobs: Option<mpsc::UnboundedSender<Job>>,
    events: Option<mpsc::UnboundedReceiver<SessionEvent>>,
    queued: VecDeque<Job>,
    /// Handed to the session thread and not reported done yet, in order.
    in_flight: VecDeque<Job>,
    next_ticket: u64,
    closed: bool,
}

impl<P: Protocol> Link<P> {
    /// The first connection attempt happens on the first poll.
    pub fn new(
        name: impl Into<String>,
        endpoint: Endpoint,
        timing: LinkTiming,
        protocol: P,
        runtime: Handle,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint,
            timing,
            protocol,
            runtime,
            status: LinkStatus::new(LinkState::Disconnected),
            next_attempt: None,
            jobs: None,
            events: None,
            queued: VecDeque::new(),
            in_flight: VecDeque::new(),
            next_ticket: 1,
            closed: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn state(&self) -> LinkState {
        self.status.state
    }

    pub fn status(&self) -> LinkStatus {
        let mut status = self.status.clone();
        if let Some(at) = self.next_attempt {
            status.retry_in = Some(at.saturating_duration_since(Instant::now()));
        } else {
            status.retry_delay = None;
        }
        status
    }

    pub fn protocol(&self) -> &P {
        &self.protocol
    }

    /// Replace the protocol used for future connections.
    pub fn set_protocol(&mut self, protocol: P) {
        self.protocol = protocol;
    }

    /// A ticket for a command that completes without device traffic.
    pub fn reserve_ticket(&mut self) -> Ticket {
        let ticket = Ticket(self.next_ticket);
        self.next_ticket += 1;
        ticket
    }

    /// Queue `steps` as one job. Accepted while connected or connecting.
    pub fn submit(&mut self, steps: Vec<Step>) -> Result<Ticket, DeviceError> {
        if self.closed {
            return Err(DeviceError::NotConnected);
        }
        let ticket = Ticket(self.next_ticket);
        let job = Job {
            ticket,
            steps,
            attempts: 1,
        };
        match self.status.state {
            LinkState::Connected => {
                self.queued.push_back(job);
                self.flush_queue();
            }
            LinkState::Connecting if self.queued.len() < MAX_QUEUED_JOBS => {
                self.queued.push_back(job);
            }
            _ => return Err(DeviceError::NotConnected),
        }
        self.next_ticket += 1;
        Ok(ticket)
    }

    pub fn poll(&mut self, now: Instant) -> Vec<LinkNotice> {
        let mut notices = Vec::new();
        if self.closed {
            return notices;
        }

        loop {
            let event = match self.events.as_mut() {
                Some(rx) => rx.try_recv(),
                None => break,
            };
            match event {
                Ok(SessionEvent::Connected(fields)) => {
                    tracing::info!(device = %self.name, "connected to {}", self.endpoint);
                    self.status.state = LinkState::Connected;
                    self.status.attempts = 0;
                    self.status.last_error = None;
                    self.timing.backoff.reset();
                    self.next_attempt = None;
                    self.flush_queue();
                    notices.push(LinkNotice::Connected(fields));
                }
                Ok(SessionEvent::Done(ticket, result)) => {
                    self.in_flight.retain(|job| job.ticket != ticket);
                    notices.push(LinkNotice::Completed(ticket, result));
                }
                Ok(SessionEvent::Refused(error)) => {
                    tracing::warn!(device = %self.name, "{} refused: {}", self.endpoint, error);
                    self.drop_session();
                    self.status.state = LinkState::Error;
                    self.status.last_error = Some(error);
                    self.fail_queue(&mut notices, DeviceError::NotConnected);
                    self.schedule_retry(now);
                }
                Ok(SessionEvent::Lost(error)) => {
                    self.on_lost(now, error, &mut notices);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.on_lost(now, DeviceError::NotConnected, &mut notices);
                }
            }
        }

        let due = self.next_attempt.is_none_or(|at| now >= at);
        if matches!(self.status.state, LinkState::Disconnected | LinkState::Error) && due {
            self.connect();
        }
        notices
    }

    pub fn shutdown(&mut self) {
        if !self.closed {
            tracing::info!(device = %self.name, "closing link");
        }
        self.closed = true;
        self.drop_session();
        self.queued.clear();
        self.in_flight.clear();
        self.status.state = LinkState::Disconnected;
        self.next_attempt = None;
    }

    fn connect(&mut self) {
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        self.jobs = Some(job_tx);
        self.events = Some(event_rx);
        self.status.state = LinkState::Connecting;
        self.status.attempts += 1;
        self.next_attempt = None;
        tracing::debug!(device = %self.name, "connecting to {} (attempt {})", self.endpoint, self.status.attempts);

        let name = self.name.clone();
        let endpoint = self.endpoint.clone();
        let protocol = self.protocol.clone();
        let connect_timeout = self.timing.connect_timeout;
        let timeout = self.timing.timeout;
        self.runtime.spawn_blocking(move || {
            run_session(name, endpoint, connect_timeout, timeout, protocol, job_rx, event_tx)
        });
    }

    fn on_lost(&mut self, now: Instant, error: DeviceError, notices: &mut Vec<LinkNotice>) {
        let was_connected = self.status.state == LinkState::Connected;
        self.drop_session();
        self.status.state = LinkState::Disconnected;
        self.status.last_error = Some(error.clone());

        // Jobs the session never finished, including any it had not picked up
        // yet, retry once ahead of anything queued after them.
        let unfinished = std::mem::take(&mut self.in_flight);
        for mut job in unfinished.into_iter().rev() {
            if job.attempts < MAX_JOB_ATTEMPTS {
                job.attempts += 1;
                self.queued.push_front(job);
            } else {
                notices.push(LinkNotice::Completed(job.ticket, Err(error.clone())));
            }
        }

        if was_connected {
            tracing::warn!(device = %self.name, "connection to {} lost: {}", self.endpoint, error);
            notices.push(LinkNotice::Lost);
            self.status.retry_delay = Some(Duration::ZERO);
            self.next_attempt = Some(now);
        } else {
            self.fail_queue(notices, error);
            self.schedule_retry(now);
        }
    }

    fn schedule_retry(&mut self, now: Instant) {
        let delay = self.timing.backoff.next_delay();
        tracing::debug!(device = %self.name, "retrying {} in {:?}", self.endpoint, delay);
        self.status.retry_delay = Some(delay);
        self.next_attempt = Some(now + delay);
    }

    /// Jobs that were waiting on a connection that never came up fail now,
    /// except those still owed their retry.
    fn fail_queue(&mut self, notices: &mut Vec<LinkNotice>, error: DeviceError) {
        let mut kept = VecDeque::new();
        for job in self.queued.drain(..) {
            if job.attempts < MAX_JOB_ATTEMPTS {
                kept.push_back(Job {
                    attempts: MAX_JOB_ATTEMPTS,
                    ..job
                });
            } else {
                notices.push(LinkNotice::Completed(job.ticket, Err(error.clone())));
            }
        }
        self.queued = kept;
    }

    fn flush_queue(&mut self) {
        let Some(tx) = self.jobs.as_ref() else {
            return;
        };
        while let Some(job) = self.queued.pop_front() {
            if let Err(e) = tx.send(job.clone()) {
                self.queued.push_front(e.0);
                break;
            }
            self.in_flight.push_back(job);
        }
    }

    fn drop_session(&mut self) {
        self.jobs = None;
        self.events = None;
    }
}
