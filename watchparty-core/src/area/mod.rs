//! Server-side areas
//!
//! Authoritative state of every interactable area in a town, and the map
//! format the areas are read from.

mod interactable;
mod map;
mod viewing;

pub use interactable::*;
pub use map::*;
pub use viewing::*;
