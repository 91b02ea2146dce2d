//! Session lifecycle: restore, login, logout, refresh, and the refresh timer.
//!
//! All mutable session state sits behind one mutex that is never held
//! across an `.await`. Every transition that starts or ends a session bumps
//! a generation counter; a refresh remembers the generation it was issued
//! under and drops its result if the session has moved on by the time the
//! server answers.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::json;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::claims::{Identity, JwtCodec, Role, TokenCodec};
use super::storage::{TokenStore, AUTH_TOKENS_KEY};
use super::tokens::{RefreshResponse, TokenPair};
use super::SessionError;
use crate::api::HttpClient;
use crate::notify::{Notification, Notifier, TracingNotifier};

// ============================================================================
// Constants
// ============================================================================

/// Login endpoint, relative to the API base URL
pub const LOGIN_PATH: &str = "/token/";

/// Refresh endpoint, relative to the API base URL
pub const REFRESH_PATH: &str = "/token/refresh/";

/// Access tokens are renewed every 9 minutes.
/// Assumes the server issues access tokens that live longer than that.
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 9 * 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    /// A login call is in flight
    Authenticating,
    Authenticated(TokenPair, Identity),
    /// Published when a refresh is rejected, just before the session is cleared
    RefreshFailed,
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated(..))
    }

    pub fn identity(&self) -> Option<&Identity> {
        match self {
            SessionState::Authenticated(_, identity) => Some(identity),
            _ => None,
        }
    }

    pub fn tokens(&self) -> Option<&TokenPair> {
        match self {
            SessionState::Authenticated(tokens, _) => Some(tokens),
            _ => None,
        }
    }
}

/// What a call to `refresh()` ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// There was no session to refresh
    NoSession,
    Refreshed,
    /// The session ended or was replaced while the request was in flight
    Discarded,
    /// The server returned an unusable token and the session was cleared
    Ended,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub refresh_interval: Duration,
    pub storage_key: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
            storage_key: AUTH_TOKENS_KEY.to_string(),
        }
    }
}

struct Inner {
    state: SessionState,
    generation: u64,
    timer: Option<AbortHandle>,
    logins_in_flight: usize,
}

struct Shared {
    http: Arc<dyn HttpClient>,
    codec: Arc<dyn TokenCodec>,
    store: Arc<dyn TokenStore>,
    notifier: Arc<dyn Notifier>,
    config: SessionConfig,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<SessionState>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }
    }
}

pub struct SessionManagerBuilder {
    http: Arc<dyn HttpClient>,
    store: Arc<dyn TokenStore>,
    codec: Arc<dyn TokenCodec>,
    notifier: Arc<dyn Notifier>,
    config: SessionConfig,
}

impl SessionManagerBuilder {
    pub fn codec(mut self, codec: Arc<dyn TokenCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> SessionManager {
        let (state_tx, _) = watch::channel(SessionState::Unauthenticated);
        SessionManager {
            shared: Arc::new(Shared {
                http: self.http,
                codec: self.codec,
                store: self.store,
                notifier: self.notifier,
                config: self.config,
                inner: Mutex::new(Inner {
                    state: SessionState::Unauthenticated,
                    generation: 0,
                    timer: None,
                    logins_in_flight: 0,
                }),
                state_tx,
            }),
        }
    }
}

/// Owns the token pair and everything derived from it.
/// Clone is cheap; clones share the same session.
#[derive(Clone)]
pub struct SessionManager {
    shared: Arc<Shared>,
}

impl SessionManager {
    pub fn builder(http: Arc<dyn HttpClient>, store: Arc<dyn TokenStore>) -> SessionManagerBuilder {
        SessionManagerBuilder {
            http,
            store,
            codec: Arc::new(JwtCodec::new()),
            notifier: Arc::new(TracingNotifier),
            config: SessionConfig::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.shared.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, inner: &Inner) {
        self.shared.state_tx.send_replace(inner.state.clone());
    }

    // ===== State access =====

    pub fn state(&self) -> SessionState {
        self.lock().state.clone()
    }

    /// Receive every state change. The receiver starts at the current state.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.shared.state_tx.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock().state.is_authenticated()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.lock().state.identity().cloned()
    }

    pub fn access_token(&self) -> Option<String> {
        self.lock().state.tokens().map(|t| t.access.clone())
    }

    /// `Authorization` header value for API calls made on the user's behalf
    pub fn authorization_header(&self) -> Option<String> {
        self.access_token().map(|token| format!("Bearer {}", token))
    }

    // ===== Lifecycle =====

    /// Restore a persisted session, if there is a readable one.
    ///
    /// An unreadable stored value is cleared and the manager starts logged
    /// out. Nothing here returns an error.
    pub async fn initialize(&self) -> SessionState {
        let key = &self.shared.config.storage_key;
        let raw = match self.shared.store.get(key) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Failed to read stored tokens");
                None
            }
        };

        let Some(raw) = raw else {
            debug!("No stored session");
            return self.state();
        };

        let restored = TokenPair::from_json(&raw)
            .map_err(|e| SessionError::MalformedToken(e.to_string()))
            .and_then(|tokens| {
                let identity = self.shared.codec.decode(&tokens.access)?;
                Ok((tokens, identity))
            });

        match restored {
            Ok((tokens, identity)) => {
                info!(username = %identity.username, role = %identity.role, "Restored session");
                self.start_session(tokens, identity);
            }
            Err(e) => {
                warn!(error = %e, "Discarding unreadable stored session");
                self.logout();
            }
        }
        self.state()
    }

    /// Exchange credentials for a token pair and return the user's role.
    ///
    /// Concurrent logins are not serialized; whichever response arrives last
    /// decides the session. A failed login leaves an existing session alone,
    /// and `Authenticating` holds until the last pending login finishes.
    pub async fn login(&self, username: &str, password: &str) -> Result<Role, SessionError> {
        let pending = PendingLogin::begin(self);

        info!(username = %username, "Logging in");
        let body = json!({ "username": username, "password": password });
        let result = match self.shared.http.post(LOGIN_PATH, body).await {
            Ok(body) => TokenPair::from_login_response(body).and_then(|tokens| {
                let identity = self.shared.codec.decode(&tokens.access)?;
                Ok((tokens, identity))
            }),
            Err(e) => Err(SessionError::from_login(e)),
        };

        match result {
            Ok((tokens, identity)) => {
                let role = identity.role.clone();
                info!(username = %identity.username, role = %role, "Logged in");
                let welcome = format!("Welcome, {}", identity.username);
                self.start_session(tokens, identity);
                drop(pending);
                self.shared.notifier.notify(Notification::info(welcome));
                Ok(role)
            }
            Err(err) => {
                warn!(error = %err, "Login failed");
                drop(pending);
                self.shared.notifier.notify(Notification::error(err.user_message()));
                Err(err)
            }
        }
    }

    /// Drop the session and its persisted copy. Safe to call at any time.
    pub fn logout(&self) {
        let mut inner = self.lock();
        let was_authenticated = inner.state.is_authenticated();
        self.end_session(&mut inner);
        if was_authenticated {
            info!("Logged out");
        }
    }

    /// Exchange the refresh token for a new access token.
    ///
    /// Any failure ends the session; there is no retry.
    pub async fn refresh(&self) -> Result<RefreshOutcome, SessionError> {
        let issued = {
            let inner = self.lock();
            inner
                .state
                .tokens()
                .map(|tokens| (tokens.refresh.clone(), inner.generation))
        };
        let Some((refresh_token, generation)) = issued else {
            debug!("No refresh token, skipping refresh");
            return Ok(RefreshOutcome::NoSession);
        };

        let response = self
            .shared
            .http
            .post(REFRESH_PATH, json!({ "refresh": refresh_token }))
            .await;
        let result = response
            .map_err(SessionError::from_refresh)
            .and_then(RefreshResponse::parse)
            .and_then(|resp| {
                let identity = self.shared.codec.decode(&resp.access)?;
                Ok((resp.access, identity))
            });

        let mut inner = self.lock();
        if inner.generation != generation {
            debug!(
                issued = generation,
                current = inner.generation,
                "Discarding refresh result for a session that has ended"
            );
            return Ok(RefreshOutcome::Discarded);
        }

        match result {
            Ok((access, identity)) => {
                let Some(tokens) = inner.state.tokens().map(|t| t.with_access(access)) else {
                    return Ok(RefreshOutcome::Discarded);
                };
                self.persist(&tokens);
                debug!(username = %identity.username, "Access token refreshed");
                inner.state = SessionState::Authenticated(tokens, identity);
                self.publish(&inner);
                Ok(RefreshOutcome::Refreshed)
            }
            Err(SessionError::MalformedToken(reason)) => {
                warn!(reason = %reason, "Refresh returned an unreadable token, ending session");
                self.end_session(&mut inner);
                Ok(RefreshOutcome::Ended)
            }
            Err(err) => {
                warn!(error = %err, "Token refresh failed, ending session");
                inner.state = SessionState::RefreshFailed;
                self.publish(&inner);
                self.end_session(&mut inner);
                drop(inner);
                self.shared.notifier.notify(Notification::error(err.user_message()));
                Err(err)
            }
        }
    }

    /// Stop the refresh timer without touching the session or storage.
    /// The persisted pair stays behind for the next start.
    pub fn shutdown(&self) {
        if let Some(timer) = self.lock().timer.take() {
            timer.abort();
            debug!("Refresh timer disarmed for shutdown");
        }
    }

    // ===== Internals =====

    fn start_session(&self, tokens: TokenPair, identity: Identity) {
        let mut inner = self.lock();
        inner.generation += 1;
        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }
        self.persist(&tokens);
        inner.state = SessionState::Authenticated(tokens, identity);
        inner.timer = Some(self.arm_timer());
        self.publish(&inner);
    }

    fn end_session(&self, inner: &mut Inner) {
        inner.generation += 1;
        if let Some(timer) = inner.timer.take() {
            timer.abort();
            debug!("Refresh timer disarmed");
        }
        if let Err(e) = self.shared.store.remove(&self.shared.config.storage_key) {
            warn!(error = %e, "Failed to clear stored tokens");
        }
        inner.state = SessionState::Unauthenticated;
        self.publish(inner);
    }

    fn persist(&self, tokens: &TokenPair) {
        let raw = match tokens.to_json() {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Failed to serialize tokens");
                return;
            }
        };
        if let Err(e) = self.shared.store.set(&self.shared.config.storage_key, &raw) {
            warn!(error = %e, "Failed to save tokens");
        }
    }

    /// Spawn the fixed-interval refresh task. It holds only a weak reference,
    /// so dropping the last manager handle stops it.
    fn arm_timer(&self) -> AbortHandle {
        let shared = Arc::downgrade(&self.shared);
        let period = self.shared.config.refresh_interval.max(Duration::from_secs(1));
        debug!(period_secs = period.as_secs(), "Refresh timer armed");

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                let manager = SessionManager { shared };
                debug!("Scheduled token refresh");
                if let Err(e) = manager.refresh().await {
                    warn!(error = %e, "Scheduled token refresh failed");
                }
            }
        });
        task.abort_handle()
    }

    #[cfg(test)]
    fn generation(&self) -> u64 {
        self.lock().generation
    }

    #[cfg(test)]
    fn timer_armed(&self) -> bool {
        self.lock().timer.is_some()
    }
}

/// Counts a login attempt for as long as it is in flight, including when the
/// login future is dropped before the server answers.
struct PendingLogin<'a> {
    manager: &'a SessionManager,
}

impl<'a> PendingLogin<'a> {
    fn begin(manager: &'a SessionManager) -> Self {
        let mut inner = manager.lock();
        inner.logins_in_flight += 1;
        if !inner.state.is_authenticated() && inner.state != SessionState::Authenticating {
            inner.state = SessionState::Authenticating;
            manager.publish(&inner);
        }
        Self { manager }
    }
}

impl Drop for PendingLogin<'_> {
    fn drop(&mut self) {
        let mut inner = self.manager.lock();
        inner.logins_in_flight = inner.logins_in_flight.saturating_sub(1);
        if inner.logins_in_flight == 0 && inner.state == SessionState::Authenticating {
            inner.state = SessionState::Unauthenticated;
            self.manager.publish(&inner);
        }
    }
}
