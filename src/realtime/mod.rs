//! Real-time delivery: connected-session registry, fan-out, WebSocket transport.

pub mod fanout;
pub mod protocol;
pub mod registry;
pub mod socket;

pub use registry::{ConnectionId, SessionRegistry};
