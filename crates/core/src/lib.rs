//! Photoview Core Library
//!
//! Views and navigation for the photo viewer: the thumbnail grids, the
//! detail view, kinetic scrolling and the coordinator that switches
//! between them.
//!
//! All view state lives on one thread. Background work goes through the
//! caches, whose callbacks are posted back to that thread as closures over
//! [`ViewCoordinator`]; a [`Session`] owns the queue and pumps it.

pub mod capability;
pub mod config;
pub mod coordinator;
pub mod detail;
mod error;
pub mod frame;
pub mod grid;
pub mod grid_view;
pub mod scroll;
pub mod session;

use photoview_feed::PhotoRecord;
use std::sync::Arc;

pub use capability::{BackKey, Capabilities, Capability, CategoryBar, CATEGORY_BAR_HEIGHT};
pub use config::{ViewerConfig, ONE_KEY_BACK_KEYBOARD};
pub use coordinator::{Command, InputEvent, NavStack, Services, ViewCoordinator, ViewKind};
pub use detail::DetailView;
pub use error::{Result, ViewerError};
pub use frame::{DrawItem, Frame};
pub use grid::{CellLayout, GridModel};
pub use grid_view::{GridKind, GridView};
pub use scroll::{Friction, KineticDecay, ScrollController, ScrollFrame, ScrollPhase};
pub use session::Session;

/// What a view did with a tap.
#[derive(Debug, Clone, PartialEq)]
pub enum TapOutcome {
    /// Not handled; the platform may act on it
    Ignored,
    /// Handled with no further effect
    Consumed,
    /// Open the detail view on this record
    Open(Arc<PhotoRecord>),
    /// Navigate back
    Back,
}
