//! Message relay: routes decoded client messages to peer connections in the same meeting.
//!
//! `signal` goes point-to-point to the target's connections; `chat` goes to every other
//! connection of an admitted member. The session is fetched per message, and the sender must
//! be admitted when the message is processed. Nothing is reported back to the sender on drop.

use super::connections::ConnectionHandle;
use super::protocol::{ChatDelivery, ChatPayload, ClientMessage, ServerMessage, SignalDelivery, SignalPayload};
use super::server::GatewayState;
use crate::session::Session;
use std::collections::HashSet;

/// Fields the server owns on relayed messages; client-supplied values are discarded.
const SIGNAL_RESERVED: &[&str] = &["senderId"];
const CHAT_RESERVED: &[&str] = &["sender", "senderId", "timestamp"];

/// What happened to one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    Delivered(usize),
    Dropped(DropReason),
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    MeetingGone,
    SenderNotAdmitted,
    TargetNotAdmitted,
    NoRecipients,
}

pub async fn dispatch(state: &GatewayState, conn: &ConnectionHandle, msg: ClientMessage) -> RelayOutcome {
    if let ClientMessage::Unknown { typ, .. } = &msg {
        log::debug!("ignoring unknown message type {:?} from {}", typ, conn.participant_id);
        return RelayOutcome::Ignored;
    }
    let Ok(session) = state.registry.get(&conn.meeting_code).await else {
        log::debug!("meeting {} gone; dropping {}", conn.meeting_code, msg.kind());
        return RelayOutcome::Dropped(DropReason::MeetingGone);
    };
    let outcome = match msg {
        ClientMessage::Signal(payload) => relay_signal(state, &session, conn, payload).await,
        ClientMessage::Chat(payload) => relay_chat(state, &session, conn, payload).await,
        ClientMessage::Unknown { .. } => RelayOutcome::Ignored,
    };
    if let RelayOutcome::Dropped(reason) = outcome {
        log::debug!(
            "meeting {}: message from {} dropped: {:?}",
            conn.meeting_code,
            conn.participant_id,
            reason
        );
    }
    outcome
}

async fn relay_signal(
    state: &GatewayState,
    session: &Session,
    conn: &ConnectionHandle,
    mut payload: SignalPayload,
) -> RelayOutcome {
    if !session.is_admitted(&conn.participant_id).await {
        return RelayOutcome::Dropped(DropReason::SenderNotAdmitted);
    }
    if !session.is_admitted(&payload.target_id).await {
        return RelayOutcome::Dropped(DropReason::TargetNotAdmitted);
    }
    for key in SIGNAL_RESERVED {
        payload.fields.remove(*key);
    }
    let msg = ServerMessage::Signal(SignalDelivery {
        sender_id: conn.participant_id.clone(),
        fields: payload.fields,
    });
    let n = state
        .connections
        .broadcast(session.code(), &msg, |c| {
            c.participant_id == payload.target_id && c.id != conn.id
        })
        .await;
    if n == 0 {
        log::warn!(
            "meeting {}: signal from {} to {} has no live connection",
            session.code(),
            conn.participant_id,
            payload.target_id
        );
        return RelayOutcome::Dropped(DropReason::NoRecipients);
    }
    RelayOutcome::Delivered(n)
}

async fn relay_chat(
    state: &GatewayState,
    session: &Session,
    conn: &ConnectionHandle,
    mut payload: ChatPayload,
) -> RelayOutcome {
    let Some(sender) = session.display_name(&conn.participant_id).await else {
        log::warn!(
            "meeting {}: chat from non-member {}",
            session.code(),
            conn.participant_id
        );
        return RelayOutcome::Dropped(DropReason::SenderNotAdmitted);
    };
    for key in CHAT_RESERVED {
        payload.fields.remove(*key);
    }
    let msg = ServerMessage::Chat(ChatDelivery {
        text: payload.text,
        sender,
        sender_id: conn.participant_id.clone(),
        timestamp: chrono::Utc::now().timestamp(),
        fields: payload.fields,
    });
    let members = admitted_ids(session).await;
    let n = state
        .connections
        .broadcast(session.code(), &msg, |c| {
            c.id != conn.id && members.contains(&c.participant_id)
        })
        .await;
    RelayOutcome::Delivered(n)
}

async fn admitted_ids(session: &Session) -> HashSet<String> {
    session
        .list_admitted()
        .await
        .into_iter()
        .map(|p| p.id)
        .collect()
}

/// Tell the other admitted connections that `participant_id` is now present. Sent at most once
/// per stretch of connectivity: a no-op unless the participant is admitted, connected, and not
/// yet announced.
pub async fn announce_joined(state: &GatewayState, session: &Session, participant_id: &str) {
    let Some(name) = session.display_name(participant_id).await else {
        return;
    };
    if !state.connections.mark_present(session.code(), participant_id).await {
        return;
    }
    let members = admitted_ids(session).await;
    let msg = ServerMessage::ParticipantJoined {
        participant_id: participant_id.to_string(),
        name,
    };
    let n = state
        .connections
        .broadcast(session.code(), &msg, |c| {
            c.participant_id != participant_id && members.contains(&c.participant_id)
        })
        .await;
    log::debug!("meeting {}: announced {} joined to {} connection(s)", session.code(), participant_id, n);
}

/// Tell the other admitted connections that `participant_id` has no live connection left.
pub async fn announce_left(state: &GatewayState, session: &Session, participant_id: &str) {
    let members = admitted_ids(session).await;
    let msg = ServerMessage::ParticipantLeft {
        participant_id: participant_id.to_string(),
    };
    let _ = state
        .connections
        .broadcast(session.code(), &msg, |c| {
            c.participant_id != participant_id && members.contains(&c.participant_id)
        })
        .await;
}

/// Push the current waiting list to the host's connections.
pub async fn notify_waiting_room(state: &GatewayState, session: &Session) {
    let msg = ServerMessage::WaitingRoomUpdate {
        participants: session.list_waiting().await,
    };
    let _ = state
        .connections
        .send_to_participant(session.code(), session.host_id(), &msg)
        .await;
}
