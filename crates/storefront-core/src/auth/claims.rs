//! Access token claims and the identity derived from them.
//!
//! Tokens are decoded locally without checking the signature. A successful
//! decode says the token is well-formed, nothing more; the server is the
//! only party that can vouch for it.

use std::fmt;

use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(feature = "ts")]
use ts_rs::TS;

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Malformed token: {0}")]
    Malformed(#[from] jsonwebtoken::errors::Error),
}

/// Account role carried in the `role` claim.
///
/// Serialized as the bare claim string, so TypeScript sees it as `string`
/// through `Identity::role`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Buyer,
    Seller,
    Admin,
    /// Any role this client does not know about, kept verbatim
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::Buyer => "buyer",
            Role::Seller => "seller",
            Role::Admin => "admin",
            Role::Other(s) => s.as_str(),
        }
    }
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        match s.as_str() {
            "buyer" => Role::Buyer,
            "seller" => Role::Seller,
            "admin" => Role::Admin,
            _ => Role::Other(s),
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        match role {
            Role::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who the access token says the user is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct Identity {
    pub id: String,
    pub username: String,
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    pub role: Role,
    /// From the `exp` claim. Display only; refresh runs on a fixed interval.
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Backends differ on whether `user_id` is numeric.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UserId {
    Number(i64),
    Text(String),
}

impl UserId {
    fn into_string(self) -> String {
        match self {
            UserId::Number(n) => n.to_string(),
            UserId::Text(s) => s,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AccessClaims {
    user_id: UserId,
    username: String,
    role: Role,
    #[serde(default)]
    exp: Option<i64>,
}

impl From<AccessClaims> for Identity {
    fn from(claims: AccessClaims) -> Self {
        Self {
            id: claims.user_id.into_string(),
            username: claims.username,
            role: claims.role,
            expires_at: claims.exp.and_then(|exp| DateTime::from_timestamp(exp, 0)),
        }
    }
}

/// Turns a signed token string into an `Identity`.
pub trait TokenCodec: Send + Sync {
    fn decode(&self, token: &str) -> Result<Identity, TokenError>;
}

/// JWT decoder with signature and time checks switched off.
pub struct JwtCodec {
    validation: Validation,
}

impl JwtCodec {
    pub fn new() -> Self {
        let mut validation = Validation::default();
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();
        Self { validation }
    }
}

impl Default for JwtCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCodec for JwtCodec {
    fn decode(&self, token: &str) -> Result<Identity, TokenError> {
        let data = jsonwebtoken::decode::<AccessClaims>(
            token,
            &DecodingKey::from_secret(&[]),
            &self.validation,
        )?;
        Ok(data.claims.into())
    }
}
