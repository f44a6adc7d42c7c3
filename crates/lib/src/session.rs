//! Meeting session: host, admitted set, and waiting room.
//!
//! A participant id is in one of three states: unknown, waiting, or admitted. The host is
//! admitted at creation. All transitions go through the methods here; the membership maps are
//! guarded by one reader/writer lock so queries always see a consistent snapshot.

use crate::error::MeetingError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

pub const DEFAULT_HOST_NAME: &str = "Host";
pub const DEFAULT_GUEST_NAME: &str = "Guest";

/// A participant as seen by other members: client-supplied id and display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub name: String,
}

impl Participant {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Result of `request_entry`: whether the waiting room changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOutcome {
    Enrolled,
    AlreadyWaiting,
    AlreadyAdmitted,
}

/// Role and admission state of one id, read under a single lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantStatus {
    pub is_host: bool,
    pub is_admitted: bool,
    pub is_waiting: bool,
}

/// Both membership lists taken under one read lock.
#[derive(Debug, Clone, Default)]
pub struct MembershipSnapshot {
    pub admitted: Vec<Participant>,
    pub waiting: Vec<Participant>,
}

#[derive(Debug, Default)]
struct Membership {
    admitted: HashMap<String, Participant>,
    waiting: HashMap<String, Participant>,
}

/// One meeting. `code` and `host_id` never change after creation.
#[derive(Debug)]
pub struct Session {
    code: String,
    host_id: String,
    host_name: String,
    created_at: DateTime<Utc>,
    members: RwLock<Membership>,
}

/// Trim a display name, falling back to `default` when empty.
pub fn display_name_or(name: Option<&str>, default: &str) -> String {
    name.map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(default)
        .to_string()
}

impl Session {
    /// New session with the host already admitted.
    pub fn new(code: impl Into<String>, host_id: impl Into<String>, host_name: impl Into<String>) -> Self {
        let host_id = host_id.into();
        let host_name: String = host_name.into();
        let host_name = display_name_or(Some(host_name.as_str()), DEFAULT_HOST_NAME);
        let mut admitted = HashMap::new();
        admitted.insert(host_id.clone(), Participant::new(host_id.clone(), host_name.clone()));
        Self {
            code: code.into(),
            host_id,
            host_name,
            created_at: Utc::now(),
            members: RwLock::new(Membership {
                admitted,
                waiting: HashMap::new(),
            }),
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn host_id(&self) -> &str {
        &self.host_id
    }

    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Host check needs no lock: `host_id` is immutable.
    pub fn is_host(&self, id: &str) -> bool {
        !id.is_empty() && id == self.host_id
    }

    pub async fn is_admitted(&self, id: &str) -> bool {
        self.members.read().await.admitted.contains_key(id)
    }

    pub async fn is_waiting(&self, id: &str) -> bool {
        self.members.read().await.waiting.contains_key(id)
    }

    pub async fn status(&self, id: &str) -> ParticipantStatus {
        let g = self.members.read().await;
        ParticipantStatus {
            is_host: self.is_host(id),
            is_admitted: g.admitted.contains_key(id),
            is_waiting: g.waiting.contains_key(id),
        }
    }

    /// Display name of an admitted member (the host's name for the host); None otherwise.
    pub async fn display_name(&self, id: &str) -> Option<String> {
        if self.is_host(id) {
            return Some(self.host_name.clone());
        }
        self.members
            .read()
            .await
            .admitted
            .get(id)
            .map(|p| p.name.clone())
    }

    pub async fn list_admitted(&self) -> Vec<Participant> {
        sorted(self.members.read().await.admitted.values())
    }

    pub async fn list_waiting(&self) -> Vec<Participant> {
        sorted(self.members.read().await.waiting.values())
    }

    pub async fn snapshot(&self) -> MembershipSnapshot {
        let g = self.members.read().await;
        MembershipSnapshot {
            admitted: sorted(g.admitted.values()),
            waiting: sorted(g.waiting.values()),
        }
    }

    /// Unknown -> Waiting. Idempotent by id; the host and admitted ids are left untouched.
    pub async fn request_entry(&self, id: &str, name: Option<&str>) -> Result<EntryOutcome, MeetingError> {
        if id.trim().is_empty() {
            return Err(MeetingError::BadRequest("participant id is empty".into()));
        }
        if self.is_host(id) {
            return Ok(EntryOutcome::AlreadyAdmitted);
        }
        let mut g = self.members.write().await;
        if g.admitted.contains_key(id) {
            return Ok(EntryOutcome::AlreadyAdmitted);
        }
        if g.waiting.contains_key(id) {
            return Ok(EntryOutcome::AlreadyWaiting);
        }
        let name = display_name_or(name, DEFAULT_GUEST_NAME);
        g.waiting.insert(id.to_string(), Participant::new(id, name));
        log::debug!("meeting {}: {} entered waiting room", self.code, id);
        Ok(EntryOutcome::Enrolled)
    }

    /// Waiting -> Admitted. Only the host may admit.
    pub async fn admit(&self, caller_id: &str, id: &str) -> Result<Participant, MeetingError> {
        self.authorize(caller_id, id)?;
        let mut g = self.members.write().await;
        let participant = g
            .waiting
            .remove(id)
            .ok_or_else(|| MeetingError::NotWaiting(id.to_string()))?;
        g.admitted.insert(id.to_string(), participant.clone());
        log::info!("meeting {}: admitted {}", self.code, id);
        Ok(participant)
    }

    /// Waiting -> Unknown. Only the host may reject; the id may request entry again later.
    pub async fn reject(&self, caller_id: &str, id: &str) -> Result<Participant, MeetingError> {
        self.authorize(caller_id, id)?;
        let participant = self
            .members
            .write()
            .await
            .waiting
            .remove(id)
            .ok_or_else(|| MeetingError::NotWaiting(id.to_string()))?;
        log::info!("meeting {}: rejected {}", self.code, id);
        Ok(participant)
    }

    fn authorize(&self, caller_id: &str, target_id: &str) -> Result<(), MeetingError> {
        if !self.is_host(caller_id) {
            return Err(MeetingError::Unauthorized);
        }
        if target_id.trim().is_empty() {
            return Err(MeetingError::BadRequest("participant id is empty".into()));
        }
        Ok(())
    }
}

fn sorted<'a>(it: impl Iterator<Item = &'a Participant>) -> Vec<Participant> {
    let mut v: Vec<Participant> = it.cloned().collect();
    v.sort_by(|a, b| a.id.cmp(&b.id));
    v
}
