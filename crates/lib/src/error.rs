//! Admission errors surfaced synchronously to callers (HTTP handlers, gateway attach).

use axum::http::StatusCode;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MeetingError {
    #[error("meeting not found: {0}")]
    NotFound(String),
    #[error("meeting already exists: {0}")]
    AlreadyExists(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("participant not found in waiting room: {0}")]
    NotWaiting(String),
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl MeetingError {
    /// HTTP status for the admission endpoints.
    pub fn status_code(&self) -> StatusCode {
        match self {
            MeetingError::NotFound(_) => StatusCode::NOT_FOUND,
            MeetingError::AlreadyExists(_) => StatusCode::CONFLICT,
            MeetingError::Unauthorized => StatusCode::UNAUTHORIZED,
            MeetingError::NotWaiting(_) | MeetingError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}
