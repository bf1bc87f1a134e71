//! PowerLink: remote inverter output power control
//!
//! Commands are queued on a [`PowerService`] and executed by a single worker
//! that owns the vendor session, signs every request and applies the retry
//! and session recovery policy.

pub mod command;
pub mod config;
pub mod error;
pub mod service;
pub mod session;
pub mod transport;

pub use command::CommandOutcome;
pub use config::{ConfigError, Password, ServiceConfig};
pub use error::ServiceError;
pub use powerlink_shared::{Command, OutputPower, OutputRangeError, RequestOutcome};
pub use service::{PowerService, SubmitMode, Submission};
pub use session::{RequestStats, ServiceStatus, SessionToken};
