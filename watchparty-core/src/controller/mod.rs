//! Client-side Mirror
//!
//! Holds the local replica of a viewing area and reports field changes.

mod events;
mod mirror;

pub use events::*;
pub use mirror::*;
