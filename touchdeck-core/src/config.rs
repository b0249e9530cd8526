//! Launch settings for a panel.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::Level;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchConfig {
    pub title: String,
    pub fullscreen: bool,
    pub show_cursor: bool,
    pub width: u32,
    pub height: u32,
    /// Frames per second; 0 runs uncapped.
    pub fps_limit: f32,
    pub gamma: f32,
    /// Number of `-v` minus number of `-q`.
    pub verbosity: i8,
    pub shutdown_grace_ms: u64,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            title: "touchdeck".to_string(),
            fullscreen: false,
            show_cursor: true,
            width: 1024,
            height: 600,
            fps_limit: 0.0,
            gamma: 1.0,
            verbosity: 0,
            shutdown_grace_ms: 500,
        }
    }
}

impl LaunchConfig {
    pub fn frame_interval(&self) -> Option<Duration> {
        if self.fps_limit > 0.0 && self.fps_limit.is_finite() {
            Some(Duration::from_secs_f64(1.0 / self.fps_limit as f64))
        } else {
            None
        }
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// INFO, moved one level per step of verbosity.
    pub fn log_level(&self) -> Level {
        const LEVELS: [Level; 5] = [Level::ERROR, Level::WARN, Level::INFO, Level::DEBUG, Level::TRACE];
        let index = (2 + self.verbosity as i32).clamp(0, 4) as usize;
        LEVELS[index]
    }

    /// Parse a `WxH` geometry string.
    pub fn parse_geometry(text: &str) -> Option<(u32, u32)> {
        let (w, h) = text.trim().split_once(['x', 'X'])?;
        let w = w.parse().ok().filter(|w: &u32| *w > 0)?;
        let h = h.parse().ok().filter(|h: &u32| *h > 0)?;
        Some((w, h))
    }
}
