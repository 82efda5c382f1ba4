//! Live session transport

pub mod live;
pub mod messages;

pub use live::{connect, LiveConfig, LiveSession, TransportEvent};
