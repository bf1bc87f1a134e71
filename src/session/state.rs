//! Session state and request statistics
//!
//! The worker is the only writer. Every other task reads copies through
//! [`SessionStore::snapshot`]. Locks are held for field copies and updates
//! only, never across network I/O.

use powerlink_shared::OutputPower;
use serde::{Serialize, Serializer};
use std::fmt;
use tokio::sync::RwLock;

/// Opaque session token issued at login
///
/// `Debug`, `Display` and `Serialize` never print the token itself.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token for the `Cookie` header
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(<redacted>)")
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

impl Serialize for SessionToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("<redacted>")
    }
}

/// Request counters, monotonically non-decreasing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RequestStats {
    /// Control requests put on the wire
    pub total_requests: u64,
    /// Output commands completed without error
    pub successful_requests: u64,
    /// Output commands completed with an error
    pub failed_requests: u64,
    /// Output commands suppressed as duplicates
    pub skipped_requests: u64,
    /// Successful logins
    pub session_refreshes: u64,
}

/// Immutable copy of the service state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    pub authenticated: bool,
    /// Present only while authenticated
    pub token: Option<SessionToken>,
    pub stats: RequestStats,
    /// Last value the server explicitly confirmed
    pub last_confirmed: Option<OutputPower>,
}

#[derive(Debug, Default)]
struct SessionState {
    authenticated: bool,
    token: Option<SessionToken>,
    stats: RequestStats,
    last_confirmed: Option<OutputPower>,
}

/// Lock-guarded session state shared between the worker and readers
#[derive(Debug, Default)]
pub struct SessionStore {
    state: RwLock<SessionState>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current state
    pub async fn snapshot(&self) -> ServiceStatus {
        let state = self.state.read().await;
        ServiceStatus {
            authenticated: state.authenticated,
            token: state.token.clone(),
            stats: state.stats,
            last_confirmed: state.last_confirmed,
        }
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.read().await.authenticated
    }

    /// Token to send, `None` while unauthenticated
    pub async fn token(&self) -> Option<SessionToken> {
        let state = self.state.read().await;
        if state.authenticated {
            state.token.clone()
        } else {
            None
        }
    }

    pub async fn last_confirmed(&self) -> Option<OutputPower> {
        self.state.read().await.last_confirmed
    }

    pub async fn stats(&self) -> RequestStats {
        self.state.read().await.stats
    }

    /// Install a freshly issued token
    pub(crate) async fn establish(&self, token: SessionToken) {
        let mut state = self.state.write().await;
        state.authenticated = true;
        state.token = Some(token);
        state.stats.session_refreshes += 1;
    }

    /// Forget the current token
    pub(crate) async fn invalidate(&self) {
        let mut state = self.state.write().await;
        state.authenticated = false;
        state.token = None;
    }

    /// Count a control request about to go on the wire
    pub(crate) async fn record_attempt(&self) {
        self.state.write().await.stats.total_requests += 1;
    }

    /// Count a completed output command; `confirmed` is set only when the
    /// server applied the value
    pub(crate) async fn record_success(&self, confirmed: Option<OutputPower>) {
        let mut state = self.state.write().await;
        state.stats.successful_requests += 1;
        if let Some(value) = confirmed {
            state.last_confirmed = Some(value);
        }
    }

    pub(crate) async fn record_failure(&self) {
        self.state.write().await.stats.failed_requests += 1;
    }

    pub(crate) async fn record_skipped(&self) {
        self.state.write().await.stats.skipped_requests += 1;
    }
}
