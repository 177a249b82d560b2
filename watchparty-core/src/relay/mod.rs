//! Town Relay
//!
//! Connects a client to a town server over TCP. Messages travel as
//! length-prefixed JSON frames.

mod client;
mod frame;

pub use client::{RelayHandle, TownClient, TownRelay};
pub use frame::{read_frame, write_frame, RelayError, MAX_FRAME_SIZE};
