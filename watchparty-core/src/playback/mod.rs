//! Playback Bridge
//!
//! Keeps one local media player consistent with a viewing area controller.

mod engine;
mod player;

pub use engine::*;
pub use player::*;
