//! Watch Party Town - Core Library
//!
//! This library provides the core functionality for keeping a shared, queued
//! video stream in sync across every client standing in a town's viewing area.

pub mod area;
pub mod controller;
pub mod ids;
pub mod playback;
pub mod relay;
pub mod sync;
pub mod town;

// Re-exports for convenience
pub use area::{AreaError, TownEmitter, TownEvent, TownMap, ViewingArea};
pub use controller::{SharedController, ViewingAreaController, ViewingAreaEvent, ViewingAreaEventKind};
pub use ids::TownId;
pub use playback::{MediaPlayer, PlaybackSyncEngine, ALLOWED_DRIFT};
pub use relay::{RelayHandle, TownClient, TownRelay};
pub use sync::{InteractableCommand, ViewingAreaModel};
pub use town::{Town, TownError};
