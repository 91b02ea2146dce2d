//! Authentication module for managing bearer-token sessions.
//!
//! This module provides:
//! - `SessionManager`: login, logout, restore and interval refresh of a JWT pair
//! - `TokenCodec`: local, unverified decoding of access token claims
//! - `TokenStore`: durable storage for the pair (file, OS keychain, memory)
//!
//! The pair is persisted under the `authTokens` key and the access token is
//! renewed every 9 minutes while a session is active.

pub mod claims;
pub mod error;
pub mod session;
pub mod storage;
pub mod tokens;

pub use claims::{Identity, JwtCodec, Role, TokenCodec, TokenError};
pub use error::SessionError;
pub use session::{
    RefreshOutcome, SessionConfig, SessionManager, SessionManagerBuilder, SessionState,
    DEFAULT_REFRESH_INTERVAL_SECS, LOGIN_PATH, REFRESH_PATH,
};
pub use storage::{
    FileTokenStore, KeyringTokenStore, MemoryTokenStore, StorageError, TokenStore, AUTH_TOKENS_KEY,
};
pub use tokens::TokenPair;
