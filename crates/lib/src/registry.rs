//! Session registry: meeting code -> session.
//!
//! The registry is the only long-term owner of sessions. Callers get an `Arc<Session>` for the
//! duration of one operation and re-fetch by code for the next, so a torn-down meeting is never
//! acted upon through a stale handle.

use crate::error::MeetingError;
use crate::session::Session;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Registry of live sessions. Shared across the gateway; construct one per server (or per test).
pub struct SessionRegistry {
    inner: RwLock<HashMap<String, Arc<Session>>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Create a session with the host admitted. Fails with `AlreadyExists` if the code is taken.
    pub async fn create(
        &self,
        code: &str,
        host_id: &str,
        host_name: &str,
    ) -> Result<Arc<Session>, MeetingError> {
        if code.trim().is_empty() || host_id.trim().is_empty() {
            return Err(MeetingError::BadRequest("meeting code and host id are required".into()));
        }
        // Built before taking the lock; readers only ever see a complete session.
        let session = Arc::new(Session::new(code, host_id, host_name));
        let mut g = self.inner.write().await;
        if g.contains_key(code) {
            return Err(MeetingError::AlreadyExists(code.to_string()));
        }
        g.insert(code.to_string(), session.clone());
        log::info!("meeting {} created", code);
        Ok(session)
    }

    pub async fn get(&self, code: &str) -> Result<Arc<Session>, MeetingError> {
        self.inner
            .read()
            .await
            .get(code)
            .cloned()
            .ok_or_else(|| MeetingError::NotFound(code.to_string()))
    }

    /// Remove the session; returns it if it existed.
    pub async fn delete(&self, code: &str) -> Option<Arc<Session>> {
        let removed = self.inner.write().await.remove(code);
        if removed.is_some() {
            log::info!("meeting {} removed", code);
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    pub async fn codes(&self) -> Vec<String> {
        self.inner.read().await.keys().cloned().collect()
    }
}
