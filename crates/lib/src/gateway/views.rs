//! What `GET /` and `GET /meeting/{code}` return. Page rendering belongs to the front end; the
//! gateway only decides which view applies and with what data.

use super::admission;
use super::server::GatewayState;
use crate::error::MeetingError;
use crate::session::Participant;
use serde::{Deserialize, Serialize};

pub const ENTRY_FORM_HTML: &str = r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>Huddle</title></head>
<body>
<form method="post" action="/meeting/create">
<label>Your name <input name="name" placeholder="Host"></label>
<button type="submit">Start a meeting</button>
</form>
</body>
</html>
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewKind {
    Join,
    Meeting,
    Waiting,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinQuery {
    pub participant_id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingView {
    pub view: ViewKind,
    pub meeting_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participant_id: Option<String>,
    pub is_host: bool,
    pub is_admitted: bool,
    pub is_waiting: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participants: Option<Vec<Participant>>,
    /// Host only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waiting_room: Option<Vec<Participant>>,
}

/// Pick the view for a visitor. Unknown participant ids are put in the waiting room.
pub async fn meeting_view(
    state: &GatewayState,
    code: &str,
    query: &JoinQuery,
) -> Result<MeetingView, MeetingError> {
    let session = state.registry.get(code).await?;
    let Some(pid) = query
        .participant_id
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
    else {
        return Ok(MeetingView {
            view: ViewKind::Join,
            meeting_code: code.to_string(),
            participant_id: None,
            is_host: false,
            is_admitted: false,
            is_waiting: false,
            participants: None,
            waiting_room: None,
        });
    };

    let mut status = session.status(pid).await;
    if !status.is_admitted && !status.is_waiting {
        admission::request_entry(state, &session, pid, query.name.as_deref()).await?;
        status = session.status(pid).await;
    }
    let snapshot = session.snapshot().await;
    let view = if status.is_admitted {
        ViewKind::Meeting
    } else {
        ViewKind::Waiting
    };
    Ok(MeetingView {
        view,
        meeting_code: code.to_string(),
        participant_id: Some(pid.to_string()),
        is_host: status.is_host,
        is_admitted: status.is_admitted,
        is_waiting: status.is_waiting,
        participants: Some(snapshot.admitted),
        waiting_room: status.is_host.then_some(snapshot.waiting),
    })
}
