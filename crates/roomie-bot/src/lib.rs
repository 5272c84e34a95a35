//! Conversation state machine, matching engine and support-ticket routing.
//!
//! Inbound events are mapped to session transitions, record store writes and a
//! list of outbound [`Intent`] values. Delivering those intents is left to the
//! runtime crate; the only direct gateway call made here is the support answer
//! path, which must observe delivery success before mutating the ticket.

pub mod bot_config;
pub mod conversation;
pub mod dialog_machine;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod intents;
pub mod matching_engine;
pub mod session_store;
pub mod ticket_routing;

pub use bot_config::*;
pub use conversation::*;
pub use dialog_machine::*;
pub use errors::*;
pub use events::*;
pub use gateway::*;
pub use intents::*;
pub use matching_engine::*;
pub use session_store::*;
pub use ticket_routing::*;

#[cfg(test)]
pub(crate) mod test_support;
