#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Integration tests for the message routes, driven through the full router.

use std::{sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    axum::{
        Router,
        body::{Body, Bytes},
        http::{Request, StatusCode, header},
    },
    courier_gateway::{BroadcastEventSink, GatewayState, build_gateway_app},
    courier_messages::{DispatchSettings, MessageService},
    courier_session::{
        AddressKind, Jid, MediaMessage, MessageEnvelope, Presence, SessionCapability,
        SessionRegistry,
    },
    courier_store::{InMemoryMessageStore, MessageStore, NewMessage},
    serde_json::{Map, Value, json},
    tower::ServiceExt,
};

/// Knows a fixed set of numbers; sends to numbers starting with `9` fail.
struct FakeSession {
    known: Vec<&'static str>,
}

impl FakeSession {
    fn knows(&self, jid: &str) -> bool {
        let user = Jid::format(jid, AddressKind::Number);
        self.known.iter().any(|k| *k == user.user())
    }
}

#[async_trait]
impl SessionCapability for FakeSession {
    async fn validate_address(
        &self,
        jid: &str,
        kind: AddressKind,
    ) -> courier_session::Result<Option<Jid>> {
        Ok(self.knows(jid).then(|| Jid::format(jid, kind)))
    }

    async fn address_exists(&self, jid: &str, _kind: AddressKind) -> courier_session::Result<bool> {
        Ok(self.knows(jid))
    }

    async fn set_presence(&self, _presence: Presence, _jid: &str) -> courier_session::Result<()> {
        Ok(())
    }

    async fn send_message(
        &self,
        jid: &str,
        content: &Value,
        options: &Map<String, Value>,
    ) -> courier_session::Result<Value> {
        if jid.starts_with('9') {
            return Err(courier_session::Error::remote(None, "socket closed"));
        }
        Ok(json!({
            "key": { "remoteJid": jid, "fromMe": true, "id": "SENT" },
            "message": content,
            "quoted": options.get("quoted").is_some(),
        }))
    }

    async fn modify_conversation(
        &self,
        modification: &Value,
        jid: &str,
    ) -> courier_session::Result<Value> {
        Ok(json!({ "jid": jid, "applied": modification }))
    }

    async fn fetch_media(&self, _media: &MediaMessage) -> courier_session::Result<Bytes> {
        Ok(Bytes::from_static(b"\x89PNG"))
    }

    async fn request_media_reupload(
        &self,
        envelope: &MessageEnvelope,
    ) -> courier_session::Result<MessageEnvelope> {
        Ok(envelope.clone())
    }
}

struct TestApp {
    router: Router,
    store: Arc<InMemoryMessageStore>,
    events: BroadcastEventSink,
}

fn app_with(websocket: bool) -> TestApp {
    let sessions = Arc::new(SessionRegistry::new());
    sessions.insert(
        "main",
        Arc::new(FakeSession {
            known: vec!["111", "222", "999"],
        }),
    );
    let store = Arc::new(InMemoryMessageStore::new());
    let events = BroadcastEventSink::new();
    let messages = MessageService::with_settings(
        sessions,
        Arc::clone(&store) as Arc<dyn MessageStore>,
        Arc::new(events.clone()),
        DispatchSettings {
            default_bulk_delay: Duration::ZERO,
            default_page_size: 25,
        },
    );
    let state = GatewayState::new(messages, events.clone()).with_websocket(websocket);
    TestApp {
        router: build_gateway_app(Arc::new(state)),
        store,
        events,
    }
}

fn app() -> TestApp {
    app_with(false)
}

async fn call(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Bytes) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(body) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(body.to_string())
        },
        None => Body::empty(),
    };
    let response = router
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes)
}

async fn call_json(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let (status, bytes) = call(router, method, uri, body).await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn seed(store: &InMemoryMessageStore, count: usize) {
    for i in 0..count {
        let envelope = json!({
            "key": { "remoteJid": "111@s.whatsapp.net", "id": format!("M{i}"), "fromMe": false },
            "message": { "conversation": format!("hello {i}") }
        });
        store
            .upsert(NewMessage::from_envelope("main", &envelope).unwrap())
            .await
            .unwrap();
    }
}

// ── Server basics ────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_reports_sessions() {
    let app = app();
    let (status, body) = call_json(&app.router, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["sessions"], 1);
    assert!(body.get("whatsapp").is_none());
}

#[tokio::test]
async fn unknown_url_is_json_404() {
    let app = app();
    let (status, body) = call_json(&app.router, "GET", "/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": "URL not found" }));

    // `/ws` only exists when enabled.
    let (status, _) = call_json(&app.router, "GET", "/ws", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ── Send ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn send_returns_raw_result_and_emits_event() {
    let app = app();
    let mut events = app.events.subscribe();

    let (status, body) = call_json(
        &app.router,
        "POST",
        "/sessions/main/messages/send",
        Some(json!({ "jid": "111", "message": { "text": "hi" } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["key"]["remoteJid"], "111@s.whatsapp.net");
    assert_eq!(body["message"], json!({ "text": "hi" }));

    let event = events.recv().await.unwrap();
    assert_eq!(event.event, "send.message");
    assert_eq!(event.session_id, "main");
    assert!(!event.is_error());
}

#[tokio::test]
async fn send_to_unknown_session_is_404() {
    let app = app();
    let (status, body) = call_json(
        &app.router,
        "POST",
        "/sessions/ghost/messages/send",
        Some(json!({ "jid": "111", "message": { "text": "hi" } })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": "Session not found" }));
}

#[tokio::test]
async fn send_rejects_malformed_body() {
    let app = app();
    let (status, body) = call_json(
        &app.router,
        "POST",
        "/sessions/main/messages/send",
        Some(json!({ "jid": "", "type": "channel", "message": {} })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let paths: Vec<&str> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["path"].as_str().unwrap())
        .collect();
    assert_eq!(paths, vec!["jid", "type", "message"]);
    assert_eq!(body["errors"][0]["location"], "body");
}

#[tokio::test]
async fn send_to_unknown_jid_is_400() {
    let app = app();
    let (status, body) = call_json(
        &app.router,
        "POST",
        "/sessions/main/messages/send",
        Some(json!({ "jid": "555", "message": { "text": "hi" } })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "JID does not exists" }));
}

#[tokio::test]
async fn send_with_missing_quote_is_400() {
    let app = app();
    let (status, body) = call_json(
        &app.router,
        "POST",
        "/sessions/main/messages/send",
        Some(json!({
            "jid": "111",
            "message": { "text": "re" },
            "quoted": { "id": "NOPE" }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Quoted message not found" }));
}

#[tokio::test]
async fn send_with_stored_quote() {
    let app = app();
    seed(&app.store, 1).await;
    let (status, body) = call_json(
        &app.router,
        "POST",
        "/sessions/main/messages/send",
        Some(json!({
            "jid": "111",
            "message": { "text": "re" },
            "quoted": { "id": "M0" }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["quoted"], true);
}

#[tokio::test]
async fn send_failure_is_generic_500() {
    let app = app();
    let (status, body) = call_json(
        &app.router,
        "POST",
        "/sessions/main/messages/send",
        Some(json!({ "jid": "999", "message": { "text": "hi" } })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "An error occurred during message send" }));
}

// ── Bulk ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn bulk_partial_failure_is_200() {
    let app = app();
    let (status, body) = call_json(
        &app.router,
        "POST",
        "/sessions/main/messages/send/bulk",
        Some(json!([
            { "jid": "111", "message": { "text": "a" } },
            { "jid": "555", "message": { "text": "b" }, "delay": 0 }
        ])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"].as_array().unwrap().len(), 1);
    assert_eq!(body["results"][0]["index"], 0);
    assert_eq!(
        body["errors"],
        json!([{ "index": 1, "error": "JID does not exists" }])
    );
}

#[tokio::test]
async fn bulk_total_failure_is_500() {
    let app = app();
    let (status, body) = call_json(
        &app.router,
        "POST",
        "/sessions/main/messages/send/bulk",
        Some(json!([
            { "jid": "555", "message": { "text": "a" } },
            { "jid": "999", "message": { "text": "b" } },
            { "jid": "666", "message": { "text": "c" } }
        ])),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["results"], json!([]));
    assert_eq!(body["errors"].as_array().unwrap().len(), 3);
    assert_eq!(
        body["errors"][1]["error"],
        "An error occurred during message send"
    );
}

#[tokio::test]
async fn bulk_requires_non_empty_array() {
    let app = app();
    let (status, body) = call_json(
        &app.router,
        "POST",
        "/sessions/main/messages/send/bulk",
        Some(json!([])),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["msg"], "Invalid value");
}

// ── History ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn list_pages_with_cursor() {
    let app = app();
    seed(&app.store, 3).await;

    let (status, first) =
        call_json(&app.router, "GET", "/sessions/main/messages?limit=2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["data"].as_array().unwrap().len(), 2);
    let cursor = first["cursor"].as_i64().unwrap();
    assert_eq!(first["data"][1]["pkId"], cursor);

    let (_, second) = call_json(
        &app.router,
        "GET",
        &format!("/sessions/main/messages?limit=2&cursor={cursor}"),
        None,
    )
    .await;
    assert_eq!(second["data"].as_array().unwrap().len(), 1);
    assert_eq!(second["data"][0]["id"], "M2");
    assert_eq!(second["cursor"], Value::Null);
}

#[tokio::test]
async fn list_works_without_live_session() {
    let app = app();
    let (status, body) = call_json(&app.router, "GET", "/sessions/ghost/messages", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "data": [], "cursor": null }));
}

#[tokio::test]
async fn list_rejects_non_numeric_query() {
    let app = app();
    let (status, body) =
        call_json(&app.router, "GET", "/sessions/main/messages?cursor=abc", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["errors"],
        json!([{ "location": "query", "path": "cursor", "msg": "Invalid value" }])
    );
}

// ── Media & delete ───────────────────────────────────────────────────────────

#[tokio::test]
async fn download_serves_bytes_with_mime_type() {
    let app = app();
    let request = Request::builder()
        .method("POST")
        .uri("/sessions/main/messages/download")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({
                "key": { "remoteJid": "111@s.whatsapp.net", "id": "M1" },
                "message": { "imageMessage": { "mimetype": "image/png", "url": "https://mmg" } }
            })
            .to_string(),
        ))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"\x89PNG");
}

#[tokio::test]
async fn download_without_media_is_500() {
    let app = app();
    let (status, body) = call_json(
        &app.router,
        "POST",
        "/sessions/main/messages/download",
        Some(json!({ "key": { "id": "M1" }, "message": { "conversation": "text only" } })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body,
        json!({ "error": "An error occurred during message media download" })
    );
}

#[tokio::test]
async fn delete_routes() {
    let app = app();
    let key = json!({ "remoteJid": "111@s.whatsapp.net", "id": "M1", "fromMe": true });

    let (status, body) = call_json(
        &app.router,
        "DELETE",
        "/sessions/main/messages/delete",
        Some(json!({ "jid": "111", "message": key })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], json!({ "delete": key }));

    let (status, body) = call_json(
        &app.router,
        "DELETE",
        "/sessions/main/messages/delete/onlyme",
        Some(json!({ "jid": "111", "message": key })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["applied"], json!({ "clear": { "messages": [key] } }));

    let (status, body) = call_json(
        &app.router,
        "DELETE",
        "/sessions/main/messages/delete",
        Some(json!({ "jid": "555", "message": key })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "JID does not exists" }));
}

#[tokio::test]
async fn websocket_route_when_enabled() {
    let app = app_with(true);
    // A plain GET without upgrade headers reaches the handler and is refused
    // by the upgrade extractor rather than the fallback.
    let (status, _) = call(&app.router, "GET", "/ws", None).await;
    assert_ne!(status, StatusCode::NOT_FOUND);
}
