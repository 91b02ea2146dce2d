use thiserror::Error;

use super::claims::TokenError;
use crate::api::ApiError;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid credentials (status {status})")]
    InvalidCredentials { status: u16, detail: Option<String> },

    #[error("Network error: {0}")]
    Transport(#[source] ApiError),

    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("Refresh rejected (status {status})")]
    RefreshRejected { status: u16 },
}

impl SessionError {
    /// Classify a failed `/token/` call.
    pub(crate) fn from_login(err: ApiError) -> Self {
        match err {
            ApiError::Status { status, .. } => SessionError::InvalidCredentials {
                status,
                detail: err.detail().map(str::to_string),
            },
            ApiError::Transport(_) => SessionError::Transport(err),
            ApiError::InvalidResponse(msg) => SessionError::MalformedToken(msg),
        }
    }

    /// Classify a failed `/token/refresh/` call.
    pub(crate) fn from_refresh(err: ApiError) -> Self {
        match err {
            ApiError::Status { status, .. } => SessionError::RefreshRejected { status },
            ApiError::Transport(_) => SessionError::Transport(err),
            ApiError::InvalidResponse(msg) => SessionError::MalformedToken(msg),
        }
    }

    /// Short message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            SessionError::InvalidCredentials { detail: Some(detail), .. } => detail.clone(),
            SessionError::InvalidCredentials { detail: None, .. } => {
                "Invalid username or password".to_string()
            }
            SessionError::Transport(_) => "Unable to reach the server".to_string(),
            SessionError::MalformedToken(_) => "The server returned an unreadable token".to_string(),
            SessionError::RefreshRejected { .. } => "Session expired. Please log in again.".to_string(),
        }
    }
}

impl From<TokenError> for SessionError {
    fn from(err: TokenError) -> Self {
        SessionError::MalformedToken(err.to_string())
    }
}
