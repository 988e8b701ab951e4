use std::sync::Arc;

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

/// Well-known event names.
pub mod topics {
    pub const SEND_MESSAGE: &str = "send.message";
    pub const CONNECTION_UPDATE: &str = "connection.update";
    pub const QRCODE_UPDATED: &str = "qrcode.updated";
    pub const MESSAGES_UPSERT: &str = "messages.upsert";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Error,
}

/// A lifecycle notification for observers.
///
/// Successful events carry `data`; failures carry `status: "error"` and a
/// human-readable `message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    pub event: String,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<EventStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl LifecycleEvent {
    pub fn success(event: impl Into<String>, session_id: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            session_id: session_id.into(),
            data: Some(data),
            status: None,
            message: None,
        }
    }

    pub fn error(
        event: impl Into<String>,
        session_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            event: event.into(),
            session_id: session_id.into(),
            data: None,
            status: Some(EventStatus::Error),
            message: Some(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == Some(EventStatus::Error)
    }
}

/// Single narrow publish interface for lifecycle events.
///
/// Publishing is fire-and-forget: sinks must not block the caller on slow
/// observers and never report delivery failures back.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: LifecycleEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

#[async_trait]
impl EventSink for NoopEventSink {
    async fn publish(&self, _event: LifecycleEvent) {}
}

/// Forwards each event to every inner sink, in order.
#[derive(Default, Clone)]
pub struct FanoutEventSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl EventSink for FanoutEventSink {
    async fn publish(&self, event: LifecycleEvent) {
        for sink in &self.sinks {
            sink.publish(event.clone()).await;
        }
    }
}
