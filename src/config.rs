//! Service configuration
//!
//! Loaded from a flat TOML file, with defaults for everything except the
//! credentials and the device serial number:
//!
//! ```toml
//! email = "owner@example.com"
//! password = "secret"
//! device_sn = "INV0001"
//! request_timeout_ms = 10000
//! max_retry_count = 3
//! ```

use powerlink_shared::{limits, protocol};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors, fatal at start-up
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("failed to read config file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse config: {0}")]
    Parse(String),
}

/// Password held in memory, never printed
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Password(String);

impl Password {
    pub fn new(password: impl Into<String>) -> Self {
        Self(password.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(<redacted>)")
    }
}

impl Serialize for Password {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("<redacted>")
    }
}

/// Configuration for the power control service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// Account email used to log in
    pub email: String,
    /// Account password
    pub password: Password,
    /// Serial number of the controlled inverter
    pub device_sn: String,
    /// Scheme, host and port of the vendor API
    pub base_url: String,
    /// Per-request HTTP timeout
    pub request_timeout_ms: u64,
    /// Transient-failure retries per command
    pub max_retry_count: u8,
    /// Fixed delay between retries
    pub retry_backoff_ms: u64,
    /// Maximum pending commands
    pub queue_capacity: usize,
    /// Cookie key carrying the session token
    pub session_cookie: String,
    /// Log in once when the worker starts
    pub eager_login: bool,
    /// Complete a set-output for the already confirmed value without I/O
    pub skip_duplicates: bool,
    /// Cap on session-expiry recoveries per command, unlimited when unset
    pub max_session_recoveries: Option<u32>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            email: String::new(),
            password: Password::default(),
            device_sn: String::new(),
            base_url: protocol::DEFAULT_BASE_URL.into(),
            request_timeout_ms: limits::DEFAULT_REQUEST_TIMEOUT_MS,
            max_retry_count: limits::DEFAULT_MAX_RETRY_COUNT,
            retry_backoff_ms: limits::DEFAULT_RETRY_BACKOFF_MS,
            queue_capacity: limits::DEFAULT_QUEUE_CAPACITY,
            session_cookie: protocol::DEFAULT_SESSION_COOKIE.into(),
            eager_login: true,
            skip_duplicates: false,
            max_session_recoveries: None,
        }
    }
}

impl ServiceConfig {
    /// Create a configuration with default tuning
    pub fn new(
        email: impl Into<String>,
        password: impl Into<String>,
        device_sn: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            password: Password::new(password),
            device_sn: device_sn.into(),
            ..Default::default()
        }
    }

    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Read and parse a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Base URL without a trailing slash
    pub fn api_base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Check every setting, first problem wins
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.email.trim().is_empty() {
            return Err(ConfigError::Missing("email"));
        }
        if self.password.is_empty() {
            return Err(ConfigError::Missing("password"));
        }
        if self.device_sn.trim().is_empty() {
            return Err(ConfigError::Missing("device_sn"));
        }
        if self.device_sn.len() > limits::MAX_DEVICE_SN_LEN {
            return Err(ConfigError::Invalid {
                field: "device_sn",
                reason: format!("longer than {} characters", limits::MAX_DEVICE_SN_LEN),
            });
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                field: "base_url",
                reason: format!("'{}' is not an http(s) URL", self.base_url),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "request_timeout_ms",
                reason: "must be greater than zero".into(),
            });
        }
        if self.max_retry_count > limits::MAX_RETRY_COUNT_LIMIT {
            return Err(ConfigError::Invalid {
                field: "max_retry_count",
                reason: format!("must be at most {}", limits::MAX_RETRY_COUNT_LIMIT),
            });
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "queue_capacity",
                reason: "must be greater than zero".into(),
            });
        }
        let cookie = self.session_cookie.trim();
        if cookie.is_empty() || cookie.contains(['=', ';', ' ']) {
            return Err(ConfigError::Invalid {
                field: "session_cookie",
                reason: format!("'{}' is not a cookie name", self.session_cookie),
            });
        }
        Ok(())
    }
}
