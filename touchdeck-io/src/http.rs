//! HTTP/JSON client for devices with a web API.
//!
//! Requests run as tasks on the shared runtime; the panel loop collects
//! their results in `poll`. HTTP has no persistent link, so the status
//! reflects the most recent request.

use std::time::{Duration, Instant};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::error::DeviceError;
use crate::link::{
    Backoff, CommandOutcome, DeviceClient, DeviceCommand, DeviceView, LinkState, LinkStatus,
    Reply, Ticket,
};

/// Longest response excerpt quoted in an error.
const ERROR_EXCERPT: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum HttpBody {
    #[default]
    None,
    Json(Value),
    Form(Vec<(String, String)>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRequest {
    pub method: HttpMethod,
    /// Absolute URL, or a path joined to the client's base URL.
    pub path: String,
    pub query: Vec<(String, String)>,
    /// Sent on top of the client's default headers.
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    pub body: HttpBody,
}

impl HttpRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: HttpBody::None,
        }
    }

    pub fn post_json(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: HttpMethod::Post,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: HttpBody::Json(body),
        }
    }

    pub fn post_form<K: Into<String>, V: Into<String>>(
        path: impl Into<String>,
        fields: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        Self {
            method: HttpMethod::Post,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: HttpBody::Form(
                fields
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub name: String,
    pub base_url: String,
    pub timeout: Duration,
    pub headers: Vec<(String, String)>,
    /// Pause before the single retry of a request that failed in transport.
    pub retry_delay: Duration,
}

impl HttpConfig {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            timeout: Duration::from_secs(2),
            headers: Vec::new(),
            retry_delay: Backoff::DEFAULT_INITIAL,
        }
    }
}

struct Finished {
    ticket: Ticket,
    result: Result<Reply, DeviceError>,
}

pub struct HttpClient {
    http: Client,
    config: HttpConfig,
    runtime: Handle,
    tx: mpsc::UnboundedSender<Finished>,
    rx: mpsc::UnboundedReceiver<Finished>,
    status: LinkStatus,
    next_ticket: u64,
    in_flight: usize,
    closed: bool,
}

impl HttpClient {
    pub fn new(config: HttpConfig, runtime: Handle) -> Result<Self, DeviceError> {
        let mut headers = reqwest::header::HeaderMap::new();
        for (key, value) in &config.headers {
            let name = reqwest::header::HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| DeviceError::Setup(format!("header {}: {}", key, e)))?;
            let value = reqwest::header::HeaderValue::from_str(value)
                .map_err(|e| DeviceError::Setup(format!("header {}: {}", key, e)))?;
            headers.insert(name, value);
        }
        let http = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| DeviceError::Setup(e.to_string()))?;
        let (tx, rx) = mpsc::unbounded_channel();
        Ok(Self {
            http,
            config,
            runtime,
            tx,
            rx,
            status: LinkStatus::new(LinkState::Connected),
            next_ticket: 1,
            in_flight: 0,
            closed: false,
        })
    }

    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }
}

async fn perform(http: &Client, url: &str, request: &HttpRequest) -> Result<Reply, DeviceError> {
    let mut builder = match request.method {
        HttpMethod::Get => http.get(url),
        HttpMethod::Post => http.post(url),
        HttpMethod::Put => http.put(url),
    };
    if !request.query.is_empty() {
        builder = builder.query(&request.query);
    }
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder = match &request.body {
        HttpBody::None => builder,
        HttpBody::Json(value) => builder.json(value),
        HttpBody::Form(fields) => builder.form(fields),
    };

    let resp = builder.send().await.map_err(map_reqwest)?;
    let status = resp.status();
    let text = resp.text().await.map_err(map_reqwest)?;
    if !status.is_success() {
        let excerpt: String = text.chars().take(ERROR_EXCERPT).collect();
        return Err(DeviceError::Protocol(format!("HTTP {}: {}", status, excerpt)));
    }
    if text.trim().is_empty() {
        return Ok(Reply::Ack);
    }
    Ok(match serde_json::from_str::<Value>(&text) {
        Ok(json) => Reply::Json(json),
        Err(_) => Reply::Text(text),
    })
}

fn map_reqwest(err: reqwest::Error) -> DeviceError {
    if err.is_timeout() {
        DeviceError::Timeout
    } else if err.is_connect() || err.is_request() {
        DeviceError::NotConnected
    } else {
        DeviceError::Protocol(err.to_string())
    }
}

impl DeviceClient for HttpClient {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn status(&self) -> LinkStatus {
        self.status.clone()
    }

    fn view(&self) -> DeviceView<'_> {
        DeviceView::Http
    }

    fn send_command(&mut self, command: DeviceCommand) -> Result<Ticket, DeviceError> {
        let request = match command {
            DeviceCommand::Http(request) => request,
            other => return Err(DeviceError::Unsupported(other.kind())),
        };
        if self.closed {
            return Err(DeviceError::NotConnected);
        }
        let ticket = Ticket(self.next_ticket);
        self.next_ticket += 1;
        self.in_flight += 1;

        let url = self.url_for(&request.path);
        tracing::info!(device = %self.config.name, "{:?} {} ({})", request.method, url, ticket);
        let http = self.http.clone();
        let tx = self.tx.clone();
        let retry_delay = self.config.retry_delay;
        self.runtime.spawn(async move {
            let mut result = perform(&http, &url, &request).await;
            if matches!(&result, Err(e) if e.is_transport()) {
                tokio::time::sleep(retry_delay).await;
                result = perform(&http, &url, &request).await;
            }
            let _ = tx.send(Finished { ticket, result });
        });
        Ok(ticket)
    }

    fn poll(&mut self, _now: Instant) -> Vec<CommandOutcome> {
        let mut outcomes = Vec::new();
        while let Ok(Finished { ticket, result }) = self.rx.try_recv() {
            self.in_flight = self.in_flight.saturating_sub(1);
            match &result {
                Err(e) if e.is_transport() => {
                    tracing::warn!(device = %self.config.name, "request {} failed: {}", ticket, e);
                    self.status.state = LinkState::Disconnected;
                    self.status.last_error = Some(e.clone());
                }
                Err(e) => {
                    tracing::warn!(device = %self.config.name, "request {} rejected: {}", ticket, e);
                    self.status.state = LinkState::Connected;
                }
                Ok(_) => {
                    self.status.state = LinkState::Connected;
                    self.status.last_error = None;
                }
            }
            if !self.closed {
                outcomes.push(CommandOutcome { ticket, result });
            }
        }
        outcomes
    }

    fn shutdown(&mut self) {
        self.closed = true;
        self.rx.close();
    }
}
