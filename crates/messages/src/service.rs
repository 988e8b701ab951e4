use std::{sync::Arc, time::Duration};

use {
    courier_session::{EventSink, MessageEnvelope, SessionCapability, SessionRegistry},
    courier_store::MessageStore,
    serde_json::Value,
};

use crate::{
    Error, Result,
    bulk::{BulkDispatcher, BulkOutcome, DEFAULT_BULK_DELAY},
    delete,
    dispatch::Dispatcher,
    history::{self, DEFAULT_PAGE_SIZE, MessagePage},
    media::{DownloadedMedia, MediaRetriever},
    quote::QuoteResolver,
    request::{BulkItem, DeleteRequest, SendRequest},
};

/// Tunables for the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    pub default_bulk_delay: Duration,
    pub default_page_size: u32,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            default_bulk_delay: DEFAULT_BULK_DELAY,
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Entry point for every message operation, keyed by session id.
#[derive(Clone)]
pub struct MessageService {
    sessions: Arc<SessionRegistry>,
    store: Arc<dyn MessageStore>,
    dispatcher: Dispatcher,
    bulk: BulkDispatcher,
    media: MediaRetriever,
    settings: DispatchSettings,
}

impl MessageService {
    pub fn new(
        sessions: Arc<SessionRegistry>,
        store: Arc<dyn MessageStore>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self::with_settings(sessions, store, events, DispatchSettings::default())
    }

    pub fn with_settings(
        sessions: Arc<SessionRegistry>,
        store: Arc<dyn MessageStore>,
        events: Arc<dyn EventSink>,
        settings: DispatchSettings,
    ) -> Self {
        let quotes = QuoteResolver::new(Arc::clone(&store));
        Self {
            dispatcher: Dispatcher::new(quotes.clone(), Arc::clone(&events)),
            bulk: BulkDispatcher::new(quotes, events)
                .with_default_delay(settings.default_bulk_delay),
            media: MediaRetriever,
            sessions,
            store,
            settings,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn settings(&self) -> DispatchSettings {
        self.settings
    }

    /// The live session for `session_id`.
    pub fn session(&self, session_id: &str) -> Result<Arc<dyn SessionCapability>> {
        self.sessions
            .get(session_id)
            .ok_or_else(|| Error::session_not_found(session_id))
    }

    /// Page through stored history. Works for sessions that are not live.
    pub async fn list(
        &self,
        session_id: &str,
        cursor: Option<i64>,
        limit: Option<u32>,
    ) -> Result<MessagePage> {
        let limit = limit.unwrap_or(self.settings.default_page_size);
        history::list_page(self.store.as_ref(), session_id, cursor, limit).await
    }

    pub async fn send(&self, session_id: &str, request: &SendRequest) -> Result<Value> {
        let session = self.session(session_id)?;
        self.dispatcher
            .send(session_id, session.as_ref(), request)
            .await
    }

    pub async fn send_bulk(&self, session_id: &str, items: &[BulkItem]) -> Result<BulkOutcome> {
        let session = self.session(session_id)?;
        Ok(self
            .bulk
            .send_bulk(session_id, session.as_ref(), items)
            .await)
    }

    pub async fn download(
        &self,
        session_id: &str,
        envelope: &MessageEnvelope,
    ) -> Result<DownloadedMedia> {
        let session = self.session(session_id)?;
        self.media
            .download(session_id, session.as_ref(), envelope)
            .await
    }

    pub async fn delete(&self, session_id: &str, request: &DeleteRequest) -> Result<Value> {
        let session = self.session(session_id)?;
        delete::delete_for_everyone(session_id, session.as_ref(), request).await
    }

    pub async fn delete_for_me(&self, session_id: &str, request: &DeleteRequest) -> Result<Value> {
        let session = self.session(session_id)?;
        delete::delete_for_me(session_id, session.as_ref(), request).await
    }
}
