//! MPD (Music Player Daemon) client.
//!
//! Speaks the line protocol on port 6600: a greeting `OK MPD <version>`,
//! then one command per line answered by `key: value` lines and a final
//! `OK` or `ACK [...] message`. Status is refreshed in the background so
//! widgets can read a [`PlayerSnapshot`] without touching the network.

use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;

use crate::endpoint::Endpoint;
use crate::error::DeviceError;
use crate::link::{
    Backoff, CommandOutcome, DeviceClient, DeviceCommand, DeviceView, LinkState, LinkStatus,
    Reply, Ticket,
};
use crate::session::{split_line, Frame, Link, LinkNotice, LinkTiming, Protocol, Step};

pub const DEFAULT_PORT: u16 = 6600;

static FILENAME_SEPARATOR: OnceLock<Regex> = OnceLock::new();

// ════════════════════════════════════════════════════════════════════
// Wire protocol
// ════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default)]
pub struct MpdProtocol;

impl Protocol for MpdProtocol {
    fn split(&self, buf: &mut Vec<u8>) -> Option<Vec<u8>> {
        split_line(buf)
    }

    fn classify(&mut self, frame: &[u8]) -> Frame {
        let line = String::from_utf8_lossy(frame);
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("OK") {
            let rest = rest.trim();
            return match rest.strip_prefix("MPD") {
                Some(version) => Frame::Ack(vec![("version".into(), version.trim().into())]),
                None => Frame::Ack(Vec::new()),
            };
        }
        if let Some(rest) = line.strip_prefix("ACK") {
            return Frame::Reject(rest.trim().to_string());
        }
        match line.split_once(':') {
            Some((key, value)) => Frame::Field(key.trim().to_string(), value.trim().to_string()),
            None => Frame::Noise,
        }
    }

    fn handshake(&self) -> Option<Step> {
        // The server speaks first.
        Some(Step::new(Vec::new(), 1))
    }

    fn verify_handshake(&self, fields: &[(String, String)]) -> Result<(), String> {
        if fields.iter().any(|(k, _)| k == "version") {
            Ok(())
        } else {
            Err("peer is not an MPD server".into())
        }
    }
}

// ════════════════════════════════════════════════════════════════════
// Commands
// ════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FadeDirection {
    /// Fade out while playing, fade in otherwise.
    Auto,
    In,
    Out,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCommand {
    Play,
    Pause,
    /// Pause when playing, play otherwise.
    TogglePlay,
    Previous,
    Next,
    /// Relative seek in seconds.
    Seek(i32),
    SetVolume(u8),
    /// Replace the queue with `folders`, shuffled.
    ShuffleFolders { folders: Vec<String>, single: bool },
    /// Raw protocol lines, sent as one job.
    Raw(Vec<String>),
    Fade {
        direction: FadeDirection,
        duration: Duration,
    },
    /// Fade-button semantics: start, stop on same duration, restart on another.
    ToggleFade { duration: Duration },
    StopFade,
}

/// Command lines that replace the queue with shuffled folders.
pub fn shuffle_folders<S: AsRef<str>>(folders: &[S], single: bool) -> Vec<String> {
    let mut lines = vec!["stop".to_string(), "clear".into(), "random 0".into()];
    if single {
        lines.extend(["single 1".to_string(), "repeat 0".into()]);
    } else {
        lines.extend(["single 0".to_string(), "repeat 1".into()]);
    }
    lines.extend(
        folders
            .iter()
            .map(|f| format!("add \"{}\"", f.as_ref().replace('"', "\\\""))),
    );
    lines.extend(["shuffle".to_string(), "play".into()]);
    lines
}

// ════════════════════════════════════════════════════════════════════
// Snapshot
// ════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlayState {
    #[default]
    Stop,
    Play,
    Pause,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeInfo {
    pub direction: FadeDirection,
    pub duration: Duration,
}

/// Everything the panel shows about a player, as of the last status refresh.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlayerSnapshot {
    pub connected: bool,
    pub state: PlayState,
    /// `None` when the server has no mixer.
    pub volume: Option<u8>,
    /// Zero-based queue position.
    pub song: Option<u32>,
    pub playlist_length: Option<u32>,
    pub song_id: Option<u32>,
    pub elapsed: Option<f64>,
    pub duration: Option<f64>,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub fade: Option<FadeInfo>,
}

impl PlayerSnapshot {
    pub fn is_playing(&self) -> bool {
        self.state == PlayState::Play
    }

    /// `"3 / 12"`, with dashes for unknown parts.
    pub fn track_text(&self) -> String {
        let pos = self
            .song
            .map(|s| (s + 1).to_string())
            .unwrap_or_else(|| "\u{2013}".into());
        let len = self
            .playlist_length
            .map(|n| n.to_string())
            .unwrap_or_else(|| "\u{2013}".into());
        format!("{} / {}", pos, len)
    }

    /// `"1:05 / 3:40"`, with dashes for unknown parts.
    pub fn time_text(&self) -> String {
        format!(
            "{} / {}",
            format_time(self.elapsed),
            format_time(self.duration)
        )
    }

    fn apply_status(&mut self, reply: &Reply) {
        let int = |key: &str| reply.field(key).and_then(|v| v.parse::<u32>().ok());
        let float = |key: &str| reply.field(key).and_then(|v| v.parse::<f64>().ok());
        self.state = match reply.field("state") {
            Some("play") => PlayState::Play,
            Some("pause") => PlayState::Pause,
            _ => PlayState::Stop,
        };
        self.volume = reply
            .field("volume")
            .and_then(|v| v.parse::<i32>().ok())
            .filter(|v| *v >= 0)
            .map(|v| v.min(100) as u8);
        self.song = int("song");
        self.playlist_length = int("playlistlength");
        self.song_id = int("songid");
        self.elapsed = float("elapsed");
        self.duration = float("duration");
    }

    fn apply_current_song(&mut self, reply: &Reply) {
        let [title, artist, album] = metadata_from_file(reply.field("file").unwrap_or(""));
        self.title = reply.field("Title").map(str::to_string).unwrap_or(title);
        self.artist = reply.field("Artist").map(str::to_string).unwrap_or(artist);
        self.album = reply.field("Album").map(str::to_string).unwrap_or(album);
    }

    fn clear(&mut self) {
        *self = PlayerSnapshot::default();
    }
}

/// `m:ss`, or a dash when unknown.
pub fn format_time(seconds: Option<f64>) -> String {
    match seconds {
        Some(t) if t >= 0.0 => {
            let t = t as u64;
            format!("{}:{:02}", t / 60, t % 60)
        }
        _ => "\u{2013}".into(),
    }
}

/// Guess `[title, artist, album]` from a file name like `Artist - Album - Title.mp3`.
pub fn metadata_from_file(file: &str) -> [String; 3] {
    let stem = Path::new(file)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let re = FILENAME_SEPARATOR
        .get_or_init(|| Regex::new(r"-{2,}|[ _]-+[ _]").expect("Invalid separator Regex"));
    let parts: Vec<String> = re
        .split(&stem)
        .map(|p| title_case(p.replace('_', " ").trim()))
        .collect();
    match parts.as_slice() {
        [title] => [title.clone(), String::new(), String::new()],
        [artist, title] => [title.clone(), artist.clone(), String::new()],
        [artist, album, title, ..] => [title.clone(), artist.clone(), album.clone()],
        [] => [String::new(), String::new(), String::new()],
    }
}

/// Uppercase the first letter of each alphabetic run, lowercase the rest.
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_word = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

// ════════════════════════════════════════════════════════════════════
// Fades
// ════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
struct Fade {
    info: FadeInfo,
    from: u8,
    to: u8,
    started: Instant,
    current: u8,
    end_lines: Vec<String>,
}

/// Volume `t` of the way from `from` to `to`, `t` clamped to `[0, 1]`.
pub fn fade_volume(from: u8, to: u8, t: f64) -> u8 {
    let t = t.clamp(0.0, 1.0);
    (from as f64 * (1.0 - t) + to as f64 * t).round() as u8
}

// ════════════════════════════════════════════════════════════════════
// Client
// ════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub status_interval: Duration,
    /// Volume restored after muted navigation and reached by fade-ins.
    pub target_volume: u8,
    pub backoff_initial: Duration,
    pub backoff_cap: Duration,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            name: "MPD-localhost".into(),
            host: "localhost".into(),
            port: DEFAULT_PORT,
            timeout: Duration::from_millis(100),
            connect_timeout: Duration::from_secs(1),
            status_interval: Duration::from_millis(250),
            target_volume: 100,
            backoff_initial: Backoff::DEFAULT_INITIAL,
            backoff_cap: Backoff::DEFAULT_CAP,
        }
    }
}

impl PlayerConfig {
    /// Config for the server at `host:port`, logged as `MPD-<host>`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        Self {
            name: format!("MPD-{}", host),
            host,
            port,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Internal {
    Status,
    CurrentSong,
    Fade,
}

pub struct PlayerClient {
    link: Link<MpdProtocol>,
    config: PlayerConfig,
    snapshot: PlayerSnapshot,
    internal: HashMap<Ticket, Internal>,
    status_pending: bool,
    next_status: Option<Instant>,
    fade: Option<Fade>,
    ready: Vec<CommandOutcome>,
}

impl PlayerClient {
    pub fn new(config: PlayerConfig, runtime: Handle) -> Self {
        let timing = LinkTiming {
            connect_timeout: config.connect_timeout,
            timeout: config.timeout,
            backoff: Backoff::new(config.backoff_initial, config.backoff_cap),
        };
        let endpoint = Endpoint::tcp(config.host.clone(), config.port);
        Self {
            link: Link::new(config.name.clone(), endpoint, timing, MpdProtocol, runtime),
            config,
            snapshot: PlayerSnapshot::default(),
            internal: HashMap::new(),
            status_pending: false,
            next_status: None,
            fade: None,
            ready: Vec::new(),
        }
    }

    pub fn snapshot(&self) -> &PlayerSnapshot {
        &self.snapshot
    }

    fn submit_lines<S: AsRef<str>>(&mut self, lines: &[S]) -> Result<Ticket, DeviceError> {
        let steps = lines.iter().map(|l| Step::line(l.as_ref())).collect();
        self.link.submit(steps)
    }

    fn submit_internal<S: AsRef<str>>(&mut self, lines: &[S], kind: Internal) -> bool {
        match self.submit_lines(lines) {
            Ok(ticket) => {
                self.internal.insert(ticket, kind);
                true
            }
            Err(e) => {
                tracing::debug!(device = %self.link.name(), "{:?} request dropped: {}", kind, e);
                false
            }
        }
    }

    /// Wrap navigation so a stopped player does not blast the first samples.
    fn muted_unless_playing(&self, line: &str) -> Vec<String> {
        if self.snapshot.is_playing() {
            vec![line.to_string()]
        } else {
            vec![
                "setvol 0".to_string(),
                line.to_string(),
                format!("setvol {}", self.config.target_volume),
            ]
        }
    }

    fn request_status_now(&mut self) {
        self.next_status = None;
    }

    fn lines_for(&self, cmd: &PlayerCommand) -> Vec<String> {
        match cmd {
            PlayerCommand::Play => self.muted_unless_playing("play"),
            PlayerCommand::Pause => vec!["pause 1".into()],
            PlayerCommand::TogglePlay if self.snapshot.is_playing() => vec!["pause 1".into()],
            PlayerCommand::TogglePlay => self.muted_unless_playing("play"),
            PlayerCommand::Previous => self.muted_unless_playing("previous"),
            PlayerCommand::Next => self.muted_unless_playing("next"),
            PlayerCommand::Seek(delta) => vec![format!("seekcur {:+}", delta)],
            PlayerCommand::SetVolume(v) => vec![format!("setvol {}", (*v).min(100))],
            PlayerCommand::ShuffleFolders { folders, single } => shuffle_folders(folders, *single),
            PlayerCommand::Raw(lines) => lines.clone(),
            PlayerCommand::Fade { .. } | PlayerCommand::ToggleFade { .. } | PlayerCommand::StopFade => {
                Vec::new()
            }
        }
    }

    fn start_fade(
        &mut self,
        direction: FadeDirection,
        duration: Duration,
        now: Instant,
    ) -> Result<Ticket, DeviceError> {
        if self.link.state() != LinkState::Connected {
            return Err(DeviceError::NotConnected);
        }
        self.stop_fade();
        let playing = self.snapshot.is_playing();
        let direction = match direction {
            FadeDirection::Auto if playing => FadeDirection::Out,
            FadeDirection::Auto => FadeDirection::In,
            d => d,
        };
        let from = self.snapshot.volume.unwrap_or(self.config.target_volume);
        let (to, mut start_lines, end_lines) = match direction {
            FadeDirection::In => (
                self.config.target_volume,
                if playing { vec![] } else { vec!["play".to_string()] },
                Vec::new(),
            ),
            _ => (
                0,
                Vec::new(),
                if playing { vec!["pause 1".to_string()] } else { vec![] },
            ),
        };
        if from == to || duration.is_zero() {
            tracing::info!(device = %self.link.name(), "nothing to fade, volume {} over {:?}", to, duration);
            self.request_status_now();
            return Ok(self.immediate(Ok(Reply::Ack)));
        }
        start_lines.insert(0, format!("setvol {}", from));
        let ticket = self.submit_lines(&start_lines)?;

        tracing::info!(
            device = %self.link.name(),
            "starting {:.1}-second fade-{}",
            duration.as_secs_f64(),
            if direction == FadeDirection::In { "in" } else { "out" }
        );
        let info = FadeInfo { direction, duration };
        self.snapshot.fade = Some(info);
        self.fade = Some(Fade {
            info,
            from,
            to,
            started: now,
            current: from,
            end_lines,
        });
        Ok(ticket)
    }

    fn stop_fade(&mut self) {
        if self.fade.take().is_some() {
            tracing::info!(device = %self.link.name(), "fade stopped");
            self.request_status_now();
        }
        self.snapshot.fade = None;
    }

    fn advance_fade(&mut self, now: Instant) {
        let Some(fade) = self.fade.as_mut() else {
            return;
        };
        let t = now.saturating_duration_since(fade.started).as_secs_f64()
            / fade.info.duration.as_secs_f64();
        let volume = fade_volume(fade.from, fade.to, t);
        if volume == fade.current {
            return;
        }
        fade.current = volume;
        let mut lines = vec![format!("setvol {}", volume)];
        let finished = volume == fade.to;
        if finished {
            lines.append(&mut fade.end_lines);
        }
        self.submit_internal(&lines, Internal::Fade);
        if finished {
            self.stop_fade();
        }
    }

    fn immediate(&mut self, result: Result<Reply, DeviceError>) -> Ticket {
        let ticket = self.link.reserve_ticket();
        self.ready.push(CommandOutcome { ticket, result });
        ticket
    }

    fn on_notice(&mut self, notice: LinkNotice, outcomes: &mut Vec<CommandOutcome>) {
        match notice {
            LinkNotice::Connected(fields) => {
                let version = fields
                    .iter()
                    .find(|(k, _)| k == "version")
                    .map(|(_, v)| v.as_str())
                    .unwrap_or("?");
                tracing::info!(device = %self.link.name(), "server speaks MPD {}", version);
                self.snapshot.connected = true;
                self.request_status_now();
            }
            LinkNotice::Lost => {
                self.fade = None;
                self.snapshot.clear();
            }
            LinkNotice::Completed(ticket, result) => match self.internal.remove(&ticket) {
                Some(Internal::Status) => {
                    self.status_pending = false;
                    if let Ok(reply) = result {
                        let previous = self.snapshot.song_id;
                        self.snapshot.apply_status(&reply);
                        if self.snapshot.song_id != previous {
                            self.submit_internal(&["currentsong"], Internal::CurrentSong);
                        }
                    }
                }
                Some(Internal::CurrentSong) => {
                    if let Ok(reply) = result {
                        self.snapshot.apply_current_song(&reply);
                    }
                }
                Some(Internal::Fade) => {
                    if let Err(e) = result {
                        tracing::warn!(device = %self.link.name(), "fade step failed: {}", e);
                    }
                }
                None => {
                    self.request_status_now();
                    outcomes.push(CommandOutcome { ticket, result });
                }
            },
        }
    }
}

impl DeviceClient for PlayerClient {
    fn name(&self) -> &str {
        self.link.name()
    }

    fn status(&self) -> LinkStatus {
        self.link.status()
    }

    fn view(&self) -> DeviceView<'_> {
        DeviceView::Player(&self.snapshot)
    }

    fn send_command(&mut self, command: DeviceCommand) -> Result<Ticket, DeviceError> {
        let cmd = match command {
            DeviceCommand::Player(cmd) => cmd,
            other => return Err(DeviceError::Unsupported(other.kind())),
        };
        let now = Instant::now();
        match cmd {
            PlayerCommand::Fade {
                direction,
                duration,
            } => self.start_fade(direction, duration, now),
            PlayerCommand::ToggleFade { duration } => match self.fade.as_ref().map(|f| f.info) {
                None => self.start_fade(FadeDirection::Auto, duration, now),
                Some(info) if info.duration == duration => {
                    self.stop_fade();
                    Ok(self.immediate(Ok(Reply::Ack)))
                }
                Some(info) => self.start_fade(info.direction, duration, now),
            },
            PlayerCommand::StopFade => {
                self.stop_fade();
                Ok(self.immediate(Ok(Reply::Ack)))
            }
            cmd => {
                let lines = self.lines_for(&cmd);
                let ticket = self.submit_lines(&lines)?;
                tracing::debug!(device = %self.link.name(), "{:?} issued as {}", cmd, ticket);
                Ok(ticket)
            }
        }
    }

    fn poll(&mut self, now: Instant) -> Vec<CommandOutcome> {
        let mut outcomes = std::mem::take(&mut self.ready);
        for notice in self.link.poll(now) {
            self.on_notice(notice, &mut outcomes);
        }
        self.snapshot.connected = self.link.state() == LinkState::Connected;

        if self.snapshot.connected {
            self.advance_fade(now);
            let due = self.next_status.is_none_or(|at| now >= at);
            if due && !self.status_pending {
                self.status_pending = self.submit_internal(&["status"], Internal::Status);
                self.next_status = Some(now + self.config.status_interval);
            }
        }
        outcomes
    }

    fn shutdown(&mut self) {
        self.fade = None;
        self.link.shutdown();
        self.snapshot.clear();
    }
}
