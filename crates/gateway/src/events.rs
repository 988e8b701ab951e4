//! Lifecycle event delivery: in-process broadcast for WebSocket clients and
//! webhook forwarding.

use {
    async_trait::async_trait,
    courier_config::WebhookConfig,
    courier_session::{EventSink, LifecycleEvent},
    tokio::sync::broadcast,
    tracing::{debug, warn},
};

/// Buffered events per subscriber before a slow one starts lagging.
pub const BROADCAST_CAPACITY: usize = 256;

// ── Broadcast ────────────────────────────────────────────────────────────────

/// Fans events out to every subscriber. Publishing never waits; subscribers
/// that fall behind lose the oldest events.
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    tx: broadcast::Sender<LifecycleEvent>,
}

impl BroadcastEventSink {
    pub fn new() -> Self {
        Self::with_capacity(BROADCAST_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastEventSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSink for BroadcastEventSink {
    async fn publish(&self, event: LifecycleEvent) {
        // No subscribers is not an error.
        if let Ok(receivers) = self.tx.send(event) {
            debug!(receivers, "event broadcast");
        }
    }
}

// ── Webhook ──────────────────────────────────────────────────────────────────

/// POSTs each allowed event as JSON to a fixed URL on a background task.
#[derive(Debug, Clone)]
pub struct WebhookEventSink {
    client: reqwest::Client,
    url: String,
    config: WebhookConfig,
}

impl WebhookEventSink {
    /// Build from the `[webhook]` config section; `None` when no URL is set.
    pub fn from_config(config: &WebhookConfig) -> anyhow::Result<Option<Self>> {
        let Some(url) = config.url.clone() else {
            return Ok(None);
        };
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Some(Self {
            client,
            url,
            config: config.clone(),
        }))
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl EventSink for WebhookEventSink {
    async fn publish(&self, event: LifecycleEvent) {
        if !self.config.forwards(&event.event) {
            return;
        }
        let client = self.client.clone();
        let url = self.url.clone();
        tokio::spawn(async move {
            let result = client
                .post(&url)
                .json(&event)
                .send()
                .await
                .and_then(reqwest::Response::error_for_status);
            match result {
                Ok(_) => debug!(event = %event.event, session_id = %event.session_id, "webhook delivered"),
                Err(e) => warn!(
                    event = %event.event,
                    session_id = %event.session_id,
                    error = %e,
                    "webhook delivery failed"
                ),
            }
        });
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        axum::{Json, Router, extract::State, routing::post},
        serde_json::{Value, json},
        std::time::Duration,
        tokio::sync::mpsc,
    };

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber() {
        let sink = BroadcastEventSink::new();
        sink.publish(LifecycleEvent::success("send.message", "s1", json!({})))
            .await;

        let mut a = sink.subscribe();
        let mut b = sink.subscribe();
        assert_eq!(sink.subscriber_count(), 2);
        sink.publish(LifecycleEvent::error("send.message", "s1", "boom"))
            .await;

        assert!(a.recv().await.unwrap().is_error());
        assert_eq!(b.recv().await.unwrap().message.as_deref(), Some("boom"));
    }

    #[test]
    fn from_config_requires_url() {
        let mut config = WebhookConfig::default();
        assert!(WebhookEventSink::from_config(&config).unwrap().is_none());
        config.url = Some("http://127.0.0.1:1/hook".into());
        let sink = WebhookEventSink::from_config(&config).unwrap().unwrap();
        assert_eq!(sink.url(), "http://127.0.0.1:1/hook");
    }

    #[tokio::test]
    async fn webhook_posts_event_json() {
        let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
        let app = Router::new()
            .route(
                "/hook",
                post(
                    |State(tx): State<mpsc::UnboundedSender<Value>>, Json(body): Json<Value>| async move {
                        tx.send(body).unwrap();
                    },
                ),
            )
            .with_state(tx);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let sink = WebhookEventSink::from_config(&WebhookConfig {
            url: Some(format!("http://{addr}/hook")),
            events: vec!["send.message".into()],
            timeout_secs: 5,
        })
        .unwrap()
        .unwrap();
        sink.publish(LifecycleEvent::success("qrcode.updated", "s1", json!({ "qr": "x" })))
            .await;
        sink.publish(LifecycleEvent::success(
            "send.message",
            "s1",
            json!({ "jid": "1@s.whatsapp.net" }),
        ))
        .await;

        let body = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            body,
            json!({
                "event": "send.message",
                "sessionId": "s1",
                "data": { "jid": "1@s.whatsapp.net" }
            })
        );
        assert!(rx.try_recv().is_err());
    }
}
