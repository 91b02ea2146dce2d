use serde::{Deserialize, Serialize};
use serde_json::Value;

#[cfg(feature = "ts")]
use ts_rs::TS;

use super::SessionError;

/// Access + refresh token pair issued by `/token/`.
///
/// Persisted as `{"access": "...", "refresh": "..."}`. Both fields are
/// required, so a half-written value never deserializes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

impl TokenPair {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: access.into(),
            refresh: refresh.into(),
        }
    }

    /// Parse a login response body.
    pub fn from_login_response(body: Value) -> Result<Self, SessionError> {
        serde_json::from_value(body)
            .map_err(|e| SessionError::MalformedToken(format!("Login response: {}", e)))
    }

    /// Same pair with a new access token; the refresh token is kept.
    pub fn with_access(&self, access: String) -> Self {
        Self {
            access,
            refresh: self.refresh.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Body of a successful `/token/refresh/` response. Extra fields are ignored.
#[derive(Debug, Deserialize)]
pub(crate) struct RefreshResponse {
    pub access: String,
}

impl RefreshResponse {
    pub fn parse(body: Value) -> Result<Self, SessionError> {
        serde_json::from_value(body)
            .map_err(|e| SessionError::MalformedToken(format!("Refresh response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_login_response() {
        let pair = TokenPair::from_login_response(json!({"access": "a1", "refresh": "r1"})).unwrap();
        assert_eq!(pair, TokenPair::new("a1", "r1"));
    }

    #[test]
    fn test_from_login_response_missing_refresh() {
        let err = TokenPair::from_login_response(json!({"access": "a1"})).unwrap_err();
        assert!(matches!(err, SessionError::MalformedToken(_)));
    }

    #[test]
    fn test_partial_pair_does_not_parse() {
        assert!(TokenPair::from_json(r#"{"access":"a1"}"#).is_err());
        assert!(TokenPair::from_json(r#"{"refresh":"r1"}"#).is_err());
        assert!(TokenPair::from_json("not-json").is_err());
    }

    #[test]
    fn test_with_access_keeps_refresh() {
        let pair = TokenPair::new("a1", "r1").with_access("a2".to_string());
        assert_eq!(pair.access, "a2");
        assert_eq!(pair.refresh, "r1");
    }

    #[test]
    fn test_refresh_response_ignores_extra_fields() {
        let resp = RefreshResponse::parse(json!({"access": "a2", "extra": 1})).unwrap();
        assert_eq!(resp.access, "a2");
    }
}
