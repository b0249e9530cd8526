//! Why a panel failed to start or had to stop.

use std::io;

use thiserror::Error;
use touchdeck_core::LayoutError;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("could not open the display window: {0}")]
    WindowInit(String),

    #[error("could not initialize the renderer: {0}")]
    RenderInit(String),

    #[error("rendering failed: {0}")]
    Render(String),

    #[error("could not start the device runtime: {0}")]
    Runtime(#[from] io::Error),

    #[error("invalid panel layout: {0}")]
    Setup(#[from] LayoutError),

    #[error("panel setup failed: {0:#}")]
    Init(anyhow::Error),
}

impl StartupError {
    /// Sort a setup callback's error: layout mistakes keep their type.
    pub fn from_init(error: anyhow::Error) -> Self {
        match error.downcast::<LayoutError>() {
            Ok(layout) => StartupError::Setup(layout),
            Err(other) => StartupError::Init(other),
        }
    }
}
