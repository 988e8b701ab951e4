use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use tracing::debug;

use crate::capability::SessionCapability;

/// Registry of live sessions, keyed by session id.
///
/// Sessions are inserted when they start and removed on teardown; lookups
/// hand out a shared handle so a request keeps working even if the session
/// is removed while it is in flight.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<dyn SessionCapability>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session, returning the handle it replaced (if any).
    pub fn insert(
        &self,
        session_id: impl Into<String>,
        session: Arc<dyn SessionCapability>,
    ) -> Option<Arc<dyn SessionCapability>> {
        let session_id = session_id.into();
        debug!(session_id, "registering session");
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.insert(session_id, session)
    }

    pub fn remove(&self, session_id: &str) -> Option<Arc<dyn SessionCapability>> {
        debug!(session_id, "removing session");
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.remove(session_id)
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<dyn SessionCapability>> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions.get(session_id).cloned()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions.contains_key(session_id)
    }

    /// Registered session ids, sorted.
    pub fn list(&self) -> Vec<String> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<String> = sessions.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
