//! Login against the vendor API
//!
//! The session token arrives as a `Set-Cookie` header on the login response.
//! It is captured from the response head while the body is still streaming.

use powerlink_shared::codec::{self, FormBody};
use powerlink_shared::signer::Signer;
use powerlink_shared::{protocol, RequestOutcome};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

use super::state::{SessionStore, SessionToken};
use crate::config::ServiceConfig;
use crate::transport::{HeaderObserver, HttpRequest, HttpTransport};

/// Why a login did not produce a session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthFailure {
    /// Network or timeout failure
    #[error("login request failed: {0}")]
    Transient(String),

    /// Non-200 status or missing success marker (bad credentials)
    #[error("login rejected: {0}")]
    Rejected(String),

    /// Success marker present but no session token captured
    #[error("login response violated protocol: {0}")]
    Protocol(String),
}

impl AuthFailure {
    pub fn outcome(&self) -> RequestOutcome {
        match self {
            AuthFailure::Transient(_) => RequestOutcome::TransientError,
            AuthFailure::Rejected(_) | AuthFailure::Protocol(_) => RequestOutcome::PermanentError,
        }
    }
}

/// Captures the session token from `Set-Cookie` headers as they arrive
struct TokenCapture<'a> {
    cookie: &'a str,
    token: Option<String>,
}

impl HeaderObserver for TokenCapture<'_> {
    fn on_header(&mut self, name: &str, value: &str) {
        if self.token.is_some() || !name.eq_ignore_ascii_case("set-cookie") {
            return;
        }
        if let Some(token) = codec::extract_cookie_token(value, self.cookie) {
            debug!("captured session cookie {}", self.cookie);
            self.token = Some(token.to_string());
        }
    }
}

/// Performs logins and installs the resulting session
pub struct Authenticator {
    transport: Arc<dyn HttpTransport>,
    login_url: String,
    email: String,
    password_hash: String,
    session_cookie: String,
    timeout: Duration,
}

impl Authenticator {
    pub fn new(config: &ServiceConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let signer = Signer::default();
        Self {
            transport,
            login_url: format!("{}{}", config.api_base(), protocol::LOGIN_PATH),
            email: config.email.clone(),
            password_hash: signer.password_hash(config.password.expose()),
            session_cookie: config.session_cookie.clone(),
            timeout: config.request_timeout(),
        }
    }

    /// Build the signed login request
    pub fn login_request(&self) -> HttpRequest {
        let signature = Signer::default().sign_login(&self.email, &self.password_hash);

        // Email goes out raw, only the sign string encodes it
        let body = FormBody::new()
            .field("email", self.email.as_str())
            .field("password", self.password_hash.as_str())
            .field("appVersion", protocol::APP_VERSION)
            .field("phoneOs", protocol::PHONE_OS)
            .field("phoneModel", protocol::PHONE_MODEL)
            .field("sign", signature);

        HttpRequest::post(&self.login_url, body.encode(), self.timeout)
            .header("Content-Type", protocol::FORM_CONTENT_TYPE)
            .header("Accept", "*/*")
    }

    /// Log in and return the issued token
    pub async fn login(&self) -> Result<SessionToken, AuthFailure> {
        info!("Logging in as {}", self.email);

        let request = self.login_request();
        let mut capture = TokenCapture {
            cookie: &self.session_cookie,
            token: None,
        };

        let response = self
            .transport
            .perform(&request, Some(&mut capture))
            .await
            .map_err(|e| {
                error!("Login request failed: {}", e);
                AuthFailure::Transient(e.to_string())
            })?;

        if response.status != 200 {
            error!("Login HTTP error: status code {}", response.status);
            return Err(AuthFailure::Rejected(format!("HTTP status {}", response.status)));
        }

        if !codec::is_login_success(response.status, &response.body) {
            let preview = codec::body_preview(&response.body);
            error!("Login failed: {}", preview);
            return Err(AuthFailure::Rejected(preview));
        }

        match capture.token {
            Some(token) => {
                info!("Login successful");
                Ok(SessionToken::new(token))
            }
            None => {
                error!("Login succeeded but no {} cookie was captured", self.session_cookie);
                Err(AuthFailure::Protocol(format!(
                    "no {} cookie in login response",
                    self.session_cookie
                )))
            }
        }
    }

    /// Log in and install the session in `store`
    pub async fn authenticate(&self, store: &SessionStore) -> Result<(), AuthFailure> {
        let token = self.login().await?;
        store.establish(token).await;
        Ok(())
    }
}
