//! Admission operations as the HTTP and WebSocket surfaces call them: the session transition
//! plus the notifications pushed to live connections.

use super::protocol::{ParticipantRef, ServerMessage};
use super::relay;
use super::server::GatewayState;
use crate::error::MeetingError;
use crate::session::{EntryOutcome, Participant, Session};
use std::sync::Arc;

/// Attempts at drawing an unused meeting code before giving up.
const CREATE_ATTEMPTS: usize = 8;

/// Create a meeting with a fresh code and host id. Returns (session, host id).
pub async fn create_meeting(
    state: &GatewayState,
    host_name: Option<&str>,
) -> Result<(Arc<Session>, String), MeetingError> {
    let host_name = crate::session::display_name_or(host_name, &state.config.meetings.default_host_name);
    let host_id = state.ids.participant_id();
    let mut last_err = None;
    for _ in 0..CREATE_ATTEMPTS {
        let code = state.ids.code();
        match state.registry.create(&code, &host_id, &host_name).await {
            Ok(session) => return Ok((session, host_id)),
            Err(e @ MeetingError::AlreadyExists(_)) => {
                log::debug!("meeting code collision, drawing again");
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or_else(|| MeetingError::AlreadyExists(String::new())))
}

/// Place `participant_id` in the waiting room (no-op if already present) and tell the host.
pub async fn request_entry(
    state: &GatewayState,
    session: &Session,
    participant_id: &str,
    name: Option<&str>,
) -> Result<EntryOutcome, MeetingError> {
    let name = crate::session::display_name_or(name, &state.config.meetings.default_guest_name);
    let outcome = session.request_entry(participant_id, Some(name.as_str())).await?;
    if outcome == EntryOutcome::Enrolled {
        relay::notify_waiting_room(state, session).await;
    }
    Ok(outcome)
}

pub async fn admit(
    state: &GatewayState,
    code: &str,
    caller_id: &str,
    participant_id: &str,
) -> Result<Participant, MeetingError> {
    let session = state.registry.get(code).await?;
    let participant = session.admit(caller_id, participant_id).await?;
    let _ = state
        .connections
        .send_to_participant(code, participant_id, &ServerMessage::Admitted(participant_ref(code, participant_id)))
        .await;
    relay::notify_waiting_room(state, &session).await;
    relay::announce_joined(state, &session, participant_id).await;
    Ok(participant)
}

pub async fn reject(
    state: &GatewayState,
    code: &str,
    caller_id: &str,
    participant_id: &str,
) -> Result<Participant, MeetingError> {
    let session = state.registry.get(code).await?;
    let participant = session.reject(caller_id, participant_id).await?;
    let _ = state
        .connections
        .send_to_participant(code, participant_id, &ServerMessage::Rejected(participant_ref(code, participant_id)))
        .await;
    relay::notify_waiting_room(state, &session).await;
    Ok(participant)
}

/// Host-only teardown: remove the meeting and close every connection attached to it.
pub async fn end_meeting(state: &GatewayState, code: &str, caller_id: &str) -> Result<(), MeetingError> {
    let session = state.registry.get(code).await?;
    if !session.is_host(caller_id) {
        return Err(MeetingError::Unauthorized);
    }
    state.registry.delete(code).await;
    let closed = state
        .connections
        .close_meeting(
            code,
            &ServerMessage::MeetingEnded {
                meeting_code: code.to_string(),
            },
        )
        .await;
    log::info!("meeting {} ended by host; closed {} connection(s)", code, closed);
    Ok(())
}

fn participant_ref(code: &str, participant_id: &str) -> ParticipantRef {
    ParticipantRef {
        meeting_code: code.to_string(),
        participant_id: participant_id.to_string(),
    }
}
