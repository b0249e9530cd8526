//! Application Shell: winit lifecycle and input translation.
//!
//! The shell owns the winit event loop. It turns platform events into
//! panel input, drives the `Deck` once per frame, and exits when the
//! panel shuts down.

pub(crate) mod app;
pub mod events;

pub use app::run;
pub use events::{PointerTracker, key_input};
