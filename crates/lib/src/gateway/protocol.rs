//! Gateway WebSocket protocol types.
//!
//! Every frame is `{ "type": string, "content": <payload> }`. Inbound frames decode into
//! [`ClientMessage`], one variant per recognized type; unknown types are kept as
//! [`ClientMessage::Unknown`] and ignored by the relay. Outbound frames are [`ServerMessage`].

use crate::session::{Participant, ParticipantStatus};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Raw wire envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub typ: String,
    #[serde(default)]
    pub content: Value,
}

/// Client `signal` content. `target_id` is read from `targetId`, else `target`; `fields` is the
/// content exactly as sent, routing key included.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalPayload {
    pub target_id: String,
    pub fields: Map<String, Value>,
}

impl SignalPayload {
    fn from_content(content: Value) -> Result<Self, DecodeError> {
        let Value::Object(fields) = content else {
            return Err(DecodeError::MalformedContent {
                kind: "signal",
                reason: "content is not an object".to_string(),
            });
        };
        let target_id = ["targetId", "target"]
            .iter()
            .filter_map(|key| fields.get(*key).and_then(Value::as_str))
            .map(str::trim)
            .find(|t| !t.is_empty())
            .ok_or_else(|| DecodeError::MalformedContent {
                kind: "signal",
                reason: "missing targetId".to_string(),
            })?
            .to_string();
        Ok(Self { target_id, fields })
    }
}

/// Client `chat` content. Extra fields are preserved in the relayed message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatPayload {
    pub text: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Signal(SignalPayload),
    Chat(ChatPayload),
    /// Unrecognized type; kept for forward compatibility, never acted on.
    Unknown { typ: String, content: Value },
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Not JSON, or not an envelope. Ends the read loop for the connection.
    #[error("invalid message envelope: {0}")]
    InvalidEnvelope(#[source] serde_json::Error),
    /// Recognized type with unusable content. Dropped; the connection stays open.
    #[error("malformed {kind} content: {reason}")]
    MalformedContent { kind: &'static str, reason: String },
}

impl DecodeError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, DecodeError::InvalidEnvelope(_))
    }
}

impl ClientMessage {
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let env: Envelope = serde_json::from_str(text).map_err(DecodeError::InvalidEnvelope)?;
        Self::from_envelope(env)
    }

    pub fn from_envelope(env: Envelope) -> Result<Self, DecodeError> {
        match env.typ.as_str() {
            "signal" => SignalPayload::from_content(env.content).map(ClientMessage::Signal),
            "chat" => typed_content("chat", env.content).map(ClientMessage::Chat),
            _ => Ok(ClientMessage::Unknown {
                typ: env.typ,
                content: env.content,
            }),
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            ClientMessage::Signal(_) => "signal",
            ClientMessage::Chat(_) => "chat",
            ClientMessage::Unknown { typ, .. } => typ,
        }
    }
}

fn typed_content<T: serde::de::DeserializeOwned>(
    kind: &'static str,
    content: Value,
) -> Result<T, DecodeError> {
    if !content.is_object() {
        return Err(DecodeError::MalformedContent {
            kind,
            reason: "content is not an object".to_string(),
        });
    }
    serde_json::from_value(content).map_err(|e| DecodeError::MalformedContent {
        kind,
        reason: e.to_string(),
    })
}

/// `init` content: the caller's role and admission state at attach time.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitContent {
    pub meeting_code: String,
    pub participant_id: String,
    #[serde(flatten)]
    pub status: ParticipantStatus,
}

/// Relayed signal: the client's fields as sent, plus `senderId`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalDelivery {
    pub sender_id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Relayed chat: the client's fields plus sender identity and a server timestamp (unix seconds).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatDelivery {
    pub text: String,
    pub sender: String,
    pub sender_id: String,
    pub timestamp: i64,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantRef {
    pub meeting_code: String,
    pub participant_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "content", rename_all = "kebab-case")]
pub enum ServerMessage {
    Init(InitContent),
    Signal(SignalDelivery),
    Chat(ChatDelivery),
    #[serde(rename_all = "camelCase")]
    ParticipantJoined { participant_id: String, name: String },
    #[serde(rename_all = "camelCase")]
    ParticipantLeft { participant_id: String },
    WaitingRoomUpdate { participants: Vec<Participant> },
    Admitted(ParticipantRef),
    Rejected(ParticipantRef),
    #[serde(rename_all = "camelCase")]
    MeetingEnded { meeting_code: String },
}

impl ServerMessage {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            log::error!("failed to serialize server message: {}", e);
            String::new()
        })
    }
}
