#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    collections::{HashSet, VecDeque},
    sync::Mutex,
};

use {
    async_trait::async_trait,
    bytes::Bytes,
    courier_session::{
        AddressKind, EventSink, Jid, LifecycleEvent, MediaKind, MediaMessage, MessageEnvelope,
        Presence, SessionCapability,
    },
    serde_json::{Map, Value, json},
    tokio::time::Instant,
};

#[derive(Debug, Clone)]
pub(crate) enum Call {
    Validate(String),
    Exists(String),
    Presence(String),
    Send {
        jid: String,
        content: Value,
        options: Map<String, Value>,
        at: Instant,
    },
    Modify {
        jid: String,
        modification: Value,
    },
    FetchMedia(MediaKind),
    Reupload,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Fetch {
    Bytes(&'static [u8]),
    Expired,
    Fail,
}

/// Scriptable session that records every capability call.
#[derive(Default)]
pub(crate) struct MockSession {
    known: HashSet<String>,
    failing_sends: HashSet<String>,
    failing_checks: HashSet<String>,
    fail_presence: bool,
    fetches: Mutex<VecDeque<Fetch>>,
    reupload: Option<MessageEnvelope>,
    fail_reupload: bool,
    calls: Mutex<Vec<Call>>,
}

impl MockSession {
    pub fn with_known(jids: &[&str]) -> Self {
        Self {
            known: jids.iter().map(|j| j.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn failing_send(mut self, jid: &str) -> Self {
        self.failing_sends.insert(jid.to_string());
        self
    }

    pub fn failing_check(mut self, jid: &str) -> Self {
        self.failing_checks.insert(jid.to_string());
        self
    }

    pub fn failing_presence(mut self) -> Self {
        self.fail_presence = true;
        self
    }

    pub fn with_fetches(self, fetches: &[Fetch]) -> Self {
        self.fetches.lock().unwrap().extend(fetches.iter().copied());
        self
    }

    pub fn with_reupload(mut self, envelope: MessageEnvelope) -> Self {
        self.reupload = Some(envelope);
        self
    }

    pub fn failing_reupload(mut self) -> Self {
        self.fail_reupload = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn sends(&self) -> Vec<(String, Value, Map<String, Value>, Instant)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Send {
                    jid,
                    content,
                    options,
                    at,
                } => Some((jid, content, options, at)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn is_known(&self, jid: &str, kind: AddressKind) -> bool {
        self.known.contains(jid) || self.known.contains(Jid::format(jid, kind).as_str())
    }
}

#[async_trait]
impl SessionCapability for MockSession {
    async fn validate_address(
        &self,
        jid: &str,
        kind: AddressKind,
    ) -> courier_session::Result<Option<Jid>> {
        self.record(Call::Validate(jid.to_string()));
        if self.failing_checks.contains(jid) {
            return Err(courier_session::Error::unavailable("socket closed"));
        }
        Ok(self.is_known(jid, kind).then(|| Jid::format(jid, kind)))
    }

    async fn address_exists(&self, jid: &str, kind: AddressKind) -> courier_session::Result<bool> {
        self.record(Call::Exists(jid.to_string()));
        if self.failing_checks.contains(jid) {
            return Err(courier_session::Error::unavailable("socket closed"));
        }
        Ok(self.is_known(jid, kind))
    }

    async fn set_presence(&self, _presence: Presence, jid: &str) -> courier_session::Result<()> {
        self.record(Call::Presence(jid.to_string()));
        if self.fail_presence {
            return Err(courier_session::Error::unavailable("presence rejected"));
        }
        Ok(())
    }

    async fn send_message(
        &self,
        jid: &str,
        content: &Value,
        options: &Map<String, Value>,
    ) -> courier_session::Result<Value> {
        self.record(Call::Send {
            jid: jid.to_string(),
            content: content.clone(),
            options: options.clone(),
            at: Instant::now(),
        });
        if self.failing_sends.iter().any(|f| jid.starts_with(f.as_str())) {
            return Err(courier_session::Error::remote(None, "send rejected"));
        }
        Ok(json!({ "key": { "remoteJid": jid, "fromMe": true, "id": "SENT" }, "status": 1 }))
    }

    async fn modify_conversation(
        &self,
        modification: &Value,
        jid: &str,
    ) -> courier_session::Result<Value> {
        self.record(Call::Modify {
            jid: jid.to_string(),
            modification: modification.clone(),
        });
        Ok(json!({ "ok": true }))
    }

    async fn fetch_media(&self, media: &MediaMessage) -> courier_session::Result<Bytes> {
        self.record(Call::FetchMedia(media.kind()));
        match self.fetches.lock().unwrap().pop_front() {
            Some(Fetch::Bytes(b)) => Ok(Bytes::from_static(b)),
            Some(Fetch::Expired) => Err(courier_session::Error::media_expired("410 gone")),
            Some(Fetch::Fail) | None => Err(courier_session::Error::remote(None, "fetch failed")),
        }
    }

    async fn request_media_reupload(
        &self,
        envelope: &MessageEnvelope,
    ) -> courier_session::Result<MessageEnvelope> {
        self.record(Call::Reupload);
        if self.fail_reupload {
            return Err(courier_session::Error::remote(None, "sender offline"));
        }
        Ok(self.reupload.clone().unwrap_or_else(|| envelope.clone()))
    }
}

/// Collects every published event.
#[derive(Default)]
pub(crate) struct RecordingSink {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn publish(&self, event: LifecycleEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// A stored envelope as the protocol would deliver it.
pub(crate) fn stored(session_id: &str, remote_jid: &str, id: &str) -> courier_store::NewMessage {
    courier_store::NewMessage::from_envelope(
        session_id,
        &json!({
            "key": { "remoteJid": remote_jid, "id": id, "fromMe": false },
            "message": { "conversation": format!("original {id}") },
            "messageTimestamp": 1_700_000_000
        }),
    )
    .unwrap()
}
