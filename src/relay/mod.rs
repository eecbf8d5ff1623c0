//! Peer relay
//!
//! Connections, the registry that tracks them, and the broadcaster that
//! turns one inbound message into per-peer compute deliveries. The
//! server and dialer put WebSocket links into the registry.

pub mod broadcaster;
pub mod connection;
pub mod dialer;
pub mod registry;
pub mod server;
pub mod session;
pub mod stats;

pub use broadcaster::*;
pub use connection::*;
pub use dialer::*;
pub use registry::*;
pub use server::*;
pub use session::*;
pub use stats::*;
