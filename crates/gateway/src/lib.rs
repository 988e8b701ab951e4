//! HTTP surface for courier.
//!
//! Message routes live under `/sessions/{session_id}/messages`; lifecycle
//! events stream on `/ws` when enabled and can be forwarded to a webhook.

pub mod events;
pub mod message_routes;
pub mod server;
pub mod session_guard;
pub mod state;
pub mod validation;
pub mod ws;

pub use {
    events::{BroadcastEventSink, WebhookEventSink},
    server::{AppState, build_gateway_app, start_gateway},
    state::GatewayState,
};
