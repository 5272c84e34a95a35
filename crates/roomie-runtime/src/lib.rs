//! Effect execution for the roomie conversation core.
//!
//! The core decides what to send; this crate sends it. It owns bounded delivery
//! timeouts, the retry policy for immediate replies, throttled broadcast fan-out
//! and per-actor ordering of inbound events.

pub mod broadcast;
pub mod dispatcher;
pub mod executor;
pub mod recording_gateway;

pub use broadcast::*;
pub use dispatcher::*;
pub use executor::*;
pub use recording_gateway::*;
