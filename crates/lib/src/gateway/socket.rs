//! Connection lifecycle: bind a WebSocket to (meeting, participant), send `init`, run the relay
//! loop until the link closes, then release the connection.

use super::admission;
use super::connections::ConnectionHandle;
use super::heartbeat::{self, WriterExit};
use super::protocol::{ClientMessage, InitContent, ServerMessage};
use super::relay;
use super::server::GatewayState;
use crate::error::MeetingError;
use crate::session::Session;
use axum::extract::ws::{Message, WebSocket};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::time;

/// A (meeting, participant) pair resolved before the upgrade.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub meeting_code: String,
    pub participant_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("websocket receive failed: {0}")]
    Receive(#[from] axum::Error),
}

/// Why a connection's read loop ended.
#[derive(Debug)]
pub enum ConnectionExit {
    PeerClosed,
    IdleTimeout,
    InvalidMessage,
    ClosedByServer,
    WriterStopped,
    Transport(TransportError),
}

/// Resolve the meeting and enroll unknown participants in the waiting room, so waiting
/// participants are attached too and receive status updates.
pub async fn attach(
    state: &GatewayState,
    meeting_code: &str,
    participant_id: &str,
    name: Option<&str>,
) -> Result<Attachment, MeetingError> {
    let session = state.registry.get(meeting_code).await?;
    if participant_id.trim().is_empty() {
        return Err(MeetingError::BadRequest("participant id is empty".into()));
    }
    let status = session.status(participant_id).await;
    if !status.is_host && !status.is_admitted && !status.is_waiting {
        admission::request_entry(state, &session, participant_id, name).await?;
    }
    Ok(Attachment {
        meeting_code: meeting_code.to_string(),
        participant_id: participant_id.to_string(),
    })
}

/// Register `handle` and report the participant's state as of registration.
///
/// Registering before reading the state means an admit racing with the attach either lands
/// first (and shows in the returned state) or finds the connection and notifies it directly.
/// Admitted participants are announced to the others here; the hub dedupes against the admit path.
pub async fn enter(state: &GatewayState, session: &Session, handle: &ConnectionHandle) -> InitContent {
    state.connections.register(handle.clone()).await;
    let status = session.status(&handle.participant_id).await;
    if status.is_admitted {
        relay::announce_joined(state, session, &handle.participant_id).await;
    }
    InitContent {
        meeting_code: handle.meeting_code.clone(),
        participant_id: handle.participant_id.clone(),
        status,
    }
}

/// Serve one upgraded connection until it terminates.
pub async fn run_connection(socket: WebSocket, state: GatewayState, attachment: Attachment) {
    let Attachment {
        meeting_code,
        participant_id,
    } = attachment;
    let (sink, mut stream) = socket.split();
    let (tx, rx) = mpsc::channel(state.config.gateway.outbound_buffer.max(1));
    let handle = ConnectionHandle::new(&meeting_code, &participant_id, tx);

    let Ok(session) = state.registry.get(&meeting_code).await else {
        log::debug!("meeting {} ended before {} attached", meeting_code, participant_id);
        return;
    };
    let init = enter(&state, &session, &handle).await;
    drop(session);
    // `init` bypasses the queue, so it precedes anything broadcast since registration.
    let mut writer = tokio::spawn(heartbeat::run_writer(
        sink,
        rx,
        state.heartbeat,
        Some(ServerMessage::Init(init).to_json()),
    ));
    log::info!(
        "meeting {}: {} attached ({})",
        meeting_code,
        participant_id,
        handle.id
    );

    let idle = state.heartbeat.idle_timeout;
    let mut writer_done = false;
    let exit = loop {
        tokio::select! {
            _ = handle.closed() => break ConnectionExit::ClosedByServer,
            res = &mut writer => {
                writer_done = true;
                if let Ok(WriterExit::WriteFailed) | Err(_) = res {
                    log::debug!("writer for {} stopped", handle.id);
                }
                break ConnectionExit::WriterStopped;
            }
            frame = time::timeout(idle, stream.next()) => match frame {
                Err(_) => break ConnectionExit::IdleTimeout,
                Ok(None) | Ok(Some(Ok(Message::Close(_)))) => break ConnectionExit::PeerClosed,
                Ok(Some(Err(e))) => break ConnectionExit::Transport(e.into()),
                Ok(Some(Ok(Message::Text(text)))) => match ClientMessage::decode(&text) {
                    Ok(msg) => {
                        let kind = msg.kind().to_string();
                        let outcome = relay::dispatch(&state, &handle, msg).await;
                        log::trace!("{}: {} -> {:?}", handle.id, kind, outcome);
                    }
                    Err(e) if e.is_fatal() => {
                        log::warn!("{}: {}; closing connection", handle.id, e);
                        break ConnectionExit::InvalidMessage;
                    }
                    Err(e) => log::warn!("{}: dropping message: {}", handle.id, e),
                },
                // Ping, pong, binary: liveness only.
                Ok(Some(Ok(_))) => {}
            },
        }
    };

    match &exit {
        ConnectionExit::IdleTimeout => log::info!(
            "meeting {}: {} timed out after {:?} idle",
            meeting_code,
            participant_id,
            idle
        ),
        ConnectionExit::Transport(e) => log::debug!("{}: {}", handle.id, e),
        other => log::info!(
            "meeting {}: {} detached ({:?})",
            meeting_code,
            participant_id,
            other
        ),
    }

    let detached = state.connections.unregister(&handle).await;
    if detached.was_present {
        if let Ok(session) = state.registry.get(&meeting_code).await {
            if session.is_admitted(&participant_id).await {
                relay::announce_left(&state, &session, &participant_id).await;
            }
        }
    }
    drop(handle);
    if !writer_done {
        let _ = writer.await;
    }
}
