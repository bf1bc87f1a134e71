//! PowerLink Shared Protocol Types
//!
//! This crate provides the protocol constants, value types, request signer,
//! wire codec and command state machine used by the PowerLink service to talk
//! to the inverter vendor's cloud API.

pub mod codec;
pub mod signer;
pub mod state_machine;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Fixed literals of the vendor cloud protocol
pub mod protocol {
    /// Default API host
    pub const DEFAULT_BASE_URL: &str = "http://server-tj.shuoxd.com:8080";

    /// Login endpoint path
    pub const LOGIN_PATH: &str = "/v1/user/login";

    /// Output power control endpoint path
    pub const SET_OUTPUT_PATH: &str = "/v1/manage/setOnGridInverterParam";

    /// Shared secret appended to every canonical sign string
    pub const SIGNATURE_KEY: &str = "1f80ca5871919371ea71716cae4841bd";

    /// Client version reported at login
    pub const APP_VERSION: &str = "20250822.1";

    /// Client platform marker reported at login
    pub const PHONE_OS: &str = "1";

    /// Client model reported at login, already percent-encoded
    pub const PHONE_MODEL: &str = "huawei%20mate";

    /// User agent of the vendor mobile app
    pub const USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 18_6_2 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148 Html5Plus/1.0 (Immersed/20) uni-app";

    /// Cookie key carrying the session token
    pub const DEFAULT_SESSION_COOKIE: &str = "JSESSIONID";

    pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

    /// Result code: request applied
    pub const RESULT_OK: i64 = 0;

    /// Result code: inverter is not connected to the cloud
    pub const RESULT_DEVICE_OFFLINE: i64 = 2;

    /// Result code: session token no longer valid
    pub const RESULT_SESSION_EXPIRED: i64 = 10000;

    /// Response bodies are truncated to this many bytes
    pub const MAX_RESPONSE_BYTES: usize = 8 * 1024;

    /// Captured session tokens longer than this are rejected
    pub const MAX_TOKEN_LEN: usize = 256;
}

/// Service limits and defaults
pub mod limits {
    /// Lowest accepted output power percentage
    pub const MIN_OUTPUT: u8 = 0;

    /// Highest accepted output power percentage
    pub const MAX_OUTPUT: u8 = 100;

    /// HTTP request timeout in milliseconds
    pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

    /// Transient-failure retries per command
    pub const DEFAULT_MAX_RETRY_COUNT: u8 = 3;

    /// Upper bound accepted for the retry count
    pub const MAX_RETRY_COUNT_LIMIT: u8 = 10;

    /// Fixed delay between transient-failure retries
    pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 2_000;

    /// Maximum pending commands
    pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

    /// Queue admission timeout of fire-and-forget submissions
    pub const ASYNC_ADMISSION_TIMEOUT_MS: u64 = 1_000;

    /// Completion timeout of synchronous submissions
    pub const SYNC_COMPLETION_TIMEOUT_MS: u64 = 30_000;

    /// Maximum device serial number length
    pub const MAX_DEVICE_SN_LEN: usize = 64;
}

/// Rejected output power value
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("output power {0} out of range ({}..={})", limits::MIN_OUTPUT, limits::MAX_OUTPUT)]
pub struct OutputRangeError(pub i64);

/// Inverter output power as a percentage, always within 0..=100
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct OutputPower(u8);

impl OutputPower {
    /// Validate and wrap a percentage
    pub fn new(percent: i64) -> Result<Self, OutputRangeError> {
        if (i64::from(limits::MIN_OUTPUT)..=i64::from(limits::MAX_OUTPUT)).contains(&percent) {
            Ok(Self(percent as u8))
        } else {
            Err(OutputRangeError(percent))
        }
    }

    pub fn percent(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for OutputPower {
    type Error = OutputRangeError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<i32> for OutputPower {
    type Error = OutputRangeError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::new(i64::from(value))
    }
}

impl From<OutputPower> for u8 {
    fn from(value: OutputPower) -> Self {
        value.0
    }
}

impl fmt::Display for OutputPower {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Commands processed by the service worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Set the inverter output power
    SetOutput(OutputPower),
    /// Drop the current session and log in again
    ForceRelogin,
    /// Read the service status once every earlier command has completed
    GetStatus,
}

impl Command {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Command::SetOutput(_) => "SET_OUTPUT",
            Command::ForceRelogin => "FORCE_RELOGIN",
            Command::GetStatus => "GET_STATUS",
        }
    }
}

/// Classification of a single network exchange with the vendor API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestOutcome {
    /// Remote server confirmed the request
    Success,
    /// Request reached the server but the inverter is offline
    DeviceOffline,
    /// Session token rejected, log in again
    SessionExpired,
    /// Network or timeout failure, worth retrying
    TransientError,
    /// Rejected or unparseable response, never retried
    PermanentError,
}

impl RequestOutcome {
    /// Whether this outcome completes a command without error
    pub fn is_completed(self) -> bool {
        matches!(self, RequestOutcome::Success | RequestOutcome::DeviceOffline)
    }
}

impl fmt::Display for RequestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestOutcome::Success => "success",
            RequestOutcome::DeviceOffline => "device offline",
            RequestOutcome::SessionExpired => "session expired",
            RequestOutcome::TransientError => "transient error",
            RequestOutcome::PermanentError => "permanent error",
        };
        f.write_str(name)
    }
}
