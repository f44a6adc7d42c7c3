//! Live connections per meeting, so the relay can address peers.
//!
//! Each connection has a bounded outbound queue drained by its writer task. Sends never block:
//! a full or closed queue drops the frame for that connection only.

use super::protocol::ServerMessage;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify, RwLock};

/// Handle to one attached connection. Cheap to clone; all clones address the same socket.
#[derive(Clone)]
pub struct ConnectionHandle {
    pub id: String,
    pub meeting_code: String,
    pub participant_id: String,
    tx: mpsc::Sender<String>,
    close: Arc<Notify>,
}

impl ConnectionHandle {
    pub fn new(
        meeting_code: impl Into<String>,
        participant_id: impl Into<String>,
        tx: mpsc::Sender<String>,
    ) -> Self {
        Self {
            id: format!("conn-{}", uuid::Uuid::new_v4()),
            meeting_code: meeting_code.into(),
            participant_id: participant_id.into(),
            tx,
            close: Arc::new(Notify::new()),
        }
    }

    /// Queue a text frame. Returns false if the queue is full or the writer is gone.
    pub fn send_text(&self, text: String) -> bool {
        match self.tx.try_send(text) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::warn!("connection {} outbound queue full; dropping frame", self.id);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    pub fn send(&self, msg: &ServerMessage) -> bool {
        self.send_text(msg.to_json())
    }

    /// Ask the connection's read loop to stop.
    pub fn close(&self) {
        self.close.notify_one();
    }

    /// Completes once `close` has been called (a close before the wait is not lost).
    pub async fn closed(&self) {
        self.close.notified().await;
    }
}

/// One meeting's live connections, plus which participants have been announced as present.
#[derive(Default)]
struct MeetingConnections {
    conns: HashMap<String, ConnectionHandle>,
    present: HashSet<String>,
}

impl MeetingConnections {
    fn has_participant(&self, participant_id: &str) -> bool {
        self.conns.values().any(|c| c.participant_id == participant_id)
    }
}

/// Result of removing a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Detached {
    /// The participant has no live connection left.
    pub last: bool,
    /// The participant had been marked present; a departure should be announced.
    pub was_present: bool,
}

/// Connections grouped by meeting code.
pub struct ConnectionHub {
    inner: RwLock<HashMap<String, MeetingConnections>>,
}

impl Default for ConnectionHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Register a connection. Returns true when it is the participant's first live connection.
    pub async fn register(&self, handle: ConnectionHandle) -> bool {
        let mut g = self.inner.write().await;
        let meeting = g.entry(handle.meeting_code.clone()).or_default();
        let first = !meeting.has_participant(&handle.participant_id);
        meeting.conns.insert(handle.id.clone(), handle);
        first
    }

    /// Remove a connection. Presence is cleared with the participant's last connection.
    pub async fn unregister(&self, handle: &ConnectionHandle) -> Detached {
        let mut g = self.inner.write().await;
        let Some(meeting) = g.get_mut(&handle.meeting_code) else {
            return Detached::default();
        };
        if meeting.conns.remove(&handle.id).is_none() {
            return Detached::default();
        }
        let last = !meeting.has_participant(&handle.participant_id);
        let was_present = last && meeting.present.remove(&handle.participant_id);
        if meeting.conns.is_empty() {
            g.remove(&handle.meeting_code);
        }
        Detached { last, was_present }
    }

    /// Mark a connected participant as present. Returns true only on the transition, so
    /// `participant-joined` goes out once however many paths race to announce it.
    pub async fn mark_present(&self, meeting_code: &str, participant_id: &str) -> bool {
        let mut g = self.inner.write().await;
        let Some(meeting) = g.get_mut(meeting_code) else {
            return false;
        };
        if !meeting.has_participant(participant_id) {
            return false;
        }
        meeting.present.insert(participant_id.to_string())
    }

    /// Snapshot of a meeting's connections; callers send without holding the hub lock.
    pub async fn connections(&self, meeting_code: &str) -> Vec<ConnectionHandle> {
        self.inner
            .read()
            .await
            .get(meeting_code)
            .map(|m| m.conns.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn participant_connections(
        &self,
        meeting_code: &str,
        participant_id: &str,
    ) -> Vec<ConnectionHandle> {
        self.connections(meeting_code)
            .await
            .into_iter()
            .filter(|c| c.participant_id == participant_id)
            .collect()
    }

    /// Send to every connection of one participant. Returns the number of queued frames.
    pub async fn send_to_participant(
        &self,
        meeting_code: &str,
        participant_id: &str,
        msg: &ServerMessage,
    ) -> usize {
        let conns = self.participant_connections(meeting_code, participant_id).await;
        if conns.is_empty() {
            return 0;
        }
        let text = msg.to_json();
        conns.iter().filter(|c| c.send_text(text.clone())).count()
    }

    /// Send to the meeting's connections accepted by `filter`. Returns the number of queued frames.
    pub async fn broadcast<F>(&self, meeting_code: &str, msg: &ServerMessage, filter: F) -> usize
    where
        F: Fn(&ConnectionHandle) -> bool,
    {
        let conns = self.connections(meeting_code).await;
        let text = msg.to_json();
        let mut delivered = 0;
        for conn in conns.iter().filter(|c| filter(c)) {
            if conn.send_text(text.clone()) {
                delivered += 1;
            } else {
                log::debug!("broadcast to {} in {} not delivered", conn.id, meeting_code);
            }
        }
        delivered
    }

    /// Drop every connection of a meeting, sending `msg` first, then ask each to close.
    pub async fn close_meeting(&self, meeting_code: &str, msg: &ServerMessage) -> usize {
        let conns = self
            .inner
            .write()
            .await
            .remove(meeting_code)
            .map(|m| m.conns)
            .unwrap_or_default();
        let text = msg.to_json();
        for conn in conns.values() {
            let _ = conn.send_text(text.clone());
            conn.close();
        }
        conns.len()
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.values().map(|m| m.conns.len()).sum()
    }
}
