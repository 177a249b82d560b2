//! Sync Model
//!
//! Wire types and the canonical playback state shared by server and clients.

mod protocol;
mod state;

pub use protocol::*;
pub use state::*;
