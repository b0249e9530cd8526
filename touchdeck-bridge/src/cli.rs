//! Command-line flags for the `touchdeck` binary.

use anyhow::{Context, bail};
use clap::{ArgAction, Parser};

use touchdeck_core::LaunchConfig;
use touchdeck_io::MatrixKind;

#[derive(Parser, Debug)]
#[command(name = "touchdeck", version, about = "Touchscreen control panel")]
pub struct Cli {
    /// More log output; repeat for more.
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Less log output; repeat for less.
    #[arg(short, long, action = ArgAction::Count)]
    pub quiet: u8,

    #[arg(short, long)]
    pub fullscreen: bool,

    /// Hide the mouse cursor.
    #[arg(short = 'c', long)]
    pub no_cursor: bool,

    /// Frames per second; 0 runs as fast as the display allows.
    #[arg(short = 'r', long, value_name = "FPS", default_value_t = 0.0)]
    pub fps_limit: f32,

    #[arg(short, long, value_name = "WxH", default_value = "1024x600")]
    pub geometry: String,

    #[arg(short = 'G', long, default_value_t = 1.0)]
    pub gamma: f32,

    #[arg(long, default_value = "touchdeck")]
    pub title: String,

    // -- Demo devices --
    /// MPD server for the player page.
    #[arg(long, value_name = "HOST[:PORT]")]
    pub mpd: Option<String>,

    /// Matrix switcher reached over TCP.
    #[arg(long, value_name = "HOST[:PORT]")]
    pub matrix: Option<String>,

    /// extron, lightware or kramer.
    #[arg(long, default_value = "extron")]
    pub matrix_kind: MatrixKind,

    /// Matrix switcher on a serial port; wins over --matrix.
    #[arg(long, value_name = "PATH")]
    pub matrix_serial: Option<String>,

    #[arg(long, default_value_t = 9600)]
    pub matrix_baud: u32,

    /// HTTP endpoint the scene buttons post to.
    #[arg(long, value_name = "URL")]
    pub webhook: Option<String>,
}

impl Cli {
    pub fn launch_config(&self) -> anyhow::Result<LaunchConfig> {
        let Some((width, height)) = LaunchConfig::parse_geometry(&self.geometry) else {
            bail!("invalid geometry '{}', expected WxH", self.geometry);
        };
        if !self.gamma.is_finite() || self.gamma <= 0.0 {
            bail!("gamma must be a positive number, got {}", self.gamma);
        }
        if !self.fps_limit.is_finite() || self.fps_limit < 0.0 {
            bail!("fps limit must be zero or positive, got {}", self.fps_limit);
        }
        let verbosity = i8::try_from(self.verbose as i16 - self.quiet as i16)
            .context("verbosity out of range")?;

        Ok(LaunchConfig {
            title: self.title.clone(),
            fullscreen: self.fullscreen,
            show_cursor: !self.no_cursor,
            width,
            height,
            fps_limit: self.fps_limit,
            gamma: self.gamma,
            verbosity,
            ..LaunchConfig::default()
        })
    }
}
