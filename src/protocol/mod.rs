//! Protocol module for relay traffic
//!
//! Defines inbound payloads, the optional compute request a peer can embed
//! in a message, and the result frame streamed back to each recipient.
//! Messages are JSON over WebSocket text frames.

mod messages;

pub use messages::*;
