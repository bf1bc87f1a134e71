//! Service error taxonomy

use powerlink_shared::OutputRangeError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::session::AuthFailure;

/// Errors returned by the service API and recorded for failed commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid command: {0}")]
    Validation(#[from] OutputRangeError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("session expired and could not be recovered")]
    SessionExpired,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("command queue full")]
    ResourceExhausted,

    #[error("timed out waiting for command completion")]
    Timeout,

    #[error("service is shutting down")]
    ShuttingDown,

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<AuthFailure> for ServiceError {
    fn from(failure: AuthFailure) -> Self {
        match failure {
            AuthFailure::Transient(msg) => ServiceError::Transport(msg),
            AuthFailure::Rejected(msg) => ServiceError::Auth(msg),
            AuthFailure::Protocol(msg) => ServiceError::Protocol(msg),
        }
    }
}
