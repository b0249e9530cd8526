//! Touchdeck Bridge library target.
//!
//! The window, GPU renderer and launcher that put a `touchdeck_core`
//! panel on screen. The binary entry point is in `main.rs`; the modules
//! are public so `tests/` can reach the pieces that run without a display.

pub mod cli;
pub mod demo;
pub mod error;
pub mod gfx;
pub mod launcher;
pub mod shell;

pub use error::StartupError;
pub use launcher::{init_logging, prepare, run_application};
