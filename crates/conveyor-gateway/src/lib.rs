//! HTTP gateway: accepts client requests, enqueues task envelopes, exposes
//! SSE progress/chat streams, receives worker webhooks, and is the sole
//! writer of persisted entities (§2, §4.1, §4.2, §6.3, §6.4, §9).

pub mod routes;
pub mod state;
pub mod webhooks;

pub use state::AppState;
