//! WhatsApp Web sessions for courier.
//!
//! The WhatsApp Web protocol is spoken by a Node.js sidecar process; this
//! crate manages that process, talks to it over a local WebSocket, and
//! exposes each logged-in account as a [`courier_session::SessionCapability`].

pub mod manager;
pub mod process;
pub mod session;
pub mod sidecar;
pub mod types;

pub use {
    manager::{ManagerOptions, SidecarEventHandler, WhatsAppManager},
    process::{SidecarConfig, SidecarProcess, find_sidecar_dir, start_sidecar},
    session::SidecarSession,
    sidecar::{DEFAULT_SIDECAR_PORT, SidecarHandle, SidecarRpc},
    types::{ConnectionState, SidecarCall, SidecarMessage},
};
