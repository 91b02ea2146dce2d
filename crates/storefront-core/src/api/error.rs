use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Request rejected with status {status}: {body}")]
    Status { status: u16, body: Value },

    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Build a status error, keeping the body as JSON when the server sent JSON.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let body = serde_json::from_str(body)
            .unwrap_or_else(|_| Value::String(Self::truncate_body(body)));
        ApiError::Status {
            status: status.as_u16(),
            body,
        }
    }

    /// The `detail` message most auth backends put in their JSON error bodies.
    /// Plain-text bodies (proxy error pages) never count as a detail.
    pub fn detail(&self) -> Option<&str> {
        match self {
            ApiError::Status {
                body: Value::Object(map),
                ..
            } => map.get("detail").and_then(Value::as_str),
            _ => None,
        }
    }
}
