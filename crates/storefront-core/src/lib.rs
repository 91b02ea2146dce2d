//! Storefront core - session lifecycle for the storefront API.
//!
//! Acquires, persists, decodes and refreshes the JWT pair the storefront
//! backend issues, and exposes the resulting session state to front ends.

pub mod api;
pub mod auth;
pub mod config;
pub mod notify;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{ApiClient, ApiError, HttpClient};
pub use auth::{Identity, Role, SessionError, SessionManager, SessionState, TokenPair};
pub use config::{Config, StorageBackend};
pub use notify::{Notification, NotificationLevel, Notifier, TracingNotifier};
