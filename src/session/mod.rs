//! Session management for the vendor API
//!
//! This module handles:
//! - Logging in and capturing the session token
//! - Tracking authentication state and request statistics
//! - Read-only status snapshots for callers

mod auth;
mod state;

pub use auth::{AuthFailure, Authenticator};
pub use state::{RequestStats, ServiceStatus, SessionStore, SessionToken};
