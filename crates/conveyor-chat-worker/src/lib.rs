//! Models a single conversational turn as a directed graph of nodes
//! (reflection → route → retrieve → generate → memory → final), executed
//! by a simple scheduler against a shared `ChatState` (§4.5).

pub mod cancellation;
pub mod consumer;
pub mod graph;
pub mod key_selection;
pub mod provider_config;
pub mod state;

pub use state::{ChatState, ChatWorkerState};
