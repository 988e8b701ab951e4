//! Session capability layer.
//!
//! A session is one authenticated messaging connection. Everything the
//! dispatch pipeline needs from it is expressed by [`SessionCapability`];
//! live sessions are looked up through the [`SessionRegistry`] and lifecycle
//! notifications leave through a single [`EventSink`].

pub mod capability;
pub mod envelope;
pub mod error;
pub mod event;
pub mod registry;
pub mod types;

pub use {
    capability::SessionCapability,
    envelope::{EnvelopeError, MediaDescriptor, MediaKind, MediaMessage, MessageEnvelope},
    error::{Error, Result},
    event::{EventSink, EventStatus, FanoutEventSink, LifecycleEvent, NoopEventSink, topics},
    registry::SessionRegistry,
    types::{AddressKind, Jid, Presence},
};
