//! # Touchdeck Core
//!
//! Pages of widgets on a grid, and the loop that draws them and turns
//! touches into handler calls. Rendering goes through the `Canvas` trait,
//! so the whole panel runs headless under test.

pub mod canvas;
pub mod color;
pub mod config;
pub mod deck;
pub mod env;
pub mod error;
pub mod event;
pub mod geometry;
pub mod layout;
pub mod page;
pub mod panel;
pub mod widget;

// Re-export the types a panel definition needs.
pub use canvas::{Align, Canvas, Fill, Painter, TextRun};
pub use color::{Rgba, hex};
pub use config::LaunchConfig;
pub use deck::{Deck, InputEvent, LoopState};
pub use env::{DeviceId, Environment};
pub use error::LayoutError;
pub use event::{BindingHandle, Context, Event, EventDetail, EventKind};
pub use geometry::{CellRect, Rect};
pub use layout::{Grid, GridStyle};
pub use page::{Page, PageHandle, PageStyle};
pub use panel::{Panel, TabStyle};
pub use widget::{Widget, WidgetHandle};
