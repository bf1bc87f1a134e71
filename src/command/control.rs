//! Signed output power requests

use powerlink_shared::codec::{self, FormBody};
use powerlink_shared::signer::Signer;
use powerlink_shared::{now_ms, protocol, OutputPower, RequestOutcome};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::ServiceConfig;
use crate::error::ServiceError;
use crate::session::SessionToken;
use crate::transport::{HttpRequest, HttpTransport};

/// Classified result of one control exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlResponse {
    pub outcome: RequestOutcome,
    /// Human-readable reason, used for the error of a failed command
    pub detail: String,
}

impl ControlResponse {
    fn new(outcome: RequestOutcome, detail: impl Into<String>) -> Self {
        Self {
            outcome,
            detail: detail.into(),
        }
    }

    /// Error reported to callers when this response ends a command
    pub fn to_error(&self) -> ServiceError {
        match self.outcome {
            RequestOutcome::TransientError => ServiceError::Transport(self.detail.clone()),
            RequestOutcome::SessionExpired => ServiceError::SessionExpired,
            _ => ServiceError::Protocol(self.detail.clone()),
        }
    }
}

/// Sends signed output power changes for one device
pub struct OutputClient {
    transport: Arc<dyn HttpTransport>,
    url: String,
    device_sn: String,
    session_cookie: String,
    timeout: Duration,
}

impl OutputClient {
    pub fn new(config: &ServiceConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            url: format!("{}{}", config.api_base(), protocol::SET_OUTPUT_PATH),
            device_sn: config.device_sn.clone(),
            session_cookie: config.session_cookie.clone(),
            timeout: config.request_timeout(),
        }
    }

    /// Build the signed request
    ///
    /// The signature covers the percent-encoded serial, the body carries it raw.
    pub fn request(&self, token: &SessionToken, output: OutputPower, time_ms: u64) -> HttpRequest {
        let signature = Signer::default().sign_control(&self.device_sn, output);
        let body = FormBody::new()
            .field("deviceSn", self.device_sn.as_str())
            .field("outputPower", output.percent().to_string());

        HttpRequest::post(&self.url, body.encode(), self.timeout)
            .header("Content-Type", protocol::FORM_CONTENT_TYPE)
            .header("Accept", "*/*")
            .header("Accept-Language", "zh")
            .header("time", time_ms.to_string())
            .header("sign", signature)
            .header(
                "Cookie",
                format!("{}={}", self.session_cookie, token.expose()),
            )
    }

    /// Send one signed request and classify the reply
    pub async fn set_output(&self, token: &SessionToken, output: OutputPower) -> ControlResponse {
        let request = self.request(token, output, now_ms());
        debug!("POST {} outputPower={}", self.url, output.percent());

        let response = match self.transport.perform(&request, None).await {
            Ok(response) => response,
            Err(e) => {
                error!("HTTP request failed: {}", e);
                return ControlResponse::new(RequestOutcome::TransientError, e.to_string());
            }
        };

        let outcome = codec::classify_control_response(response.status, &response.body);
        match outcome {
            RequestOutcome::Success => {
                info!("Success: power set to {}", output);
                ControlResponse::new(outcome, "applied")
            }
            RequestOutcome::DeviceOffline => {
                warn!("Device offline, power {} not applied", output);
                ControlResponse::new(outcome, "device offline")
            }
            RequestOutcome::SessionExpired => {
                warn!("Session expired (result {})", protocol::RESULT_SESSION_EXPIRED);
                ControlResponse::new(outcome, "session expired")
            }
            _ if response.status != 200 => {
                error!("HTTP error: status code {}", response.status);
                ControlResponse::new(outcome, format!("HTTP status {}", response.status))
            }
            _ => {
                let preview = codec::body_preview(&response.body);
                error!("Unknown response: {}", preview);
                ControlResponse::new(outcome, format!("unexpected response: {}", preview))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{Reply, ScriptedTransport};

    fn client(transport: Arc<ScriptedTransport>) -> OutputClient {
        let config = ServiceConfig::new("owner@example.com", "pw", "SN 01/A");
        OutputClient::new(&config, transport)
    }

    fn power(p: i64) -> OutputPower {
        OutputPower::new(p).unwrap()
    }

    #[test]
    fn test_request_wire_format() {
        let client = client(Arc::new(ScriptedTransport::new()));
        let request = client.request(&SessionToken::new("tok"), power(50), 1_700_000_000_123);

        assert!(request.url.ends_with("/v1/manage/setOnGridInverterParam"));
        assert_eq!(request.body, "deviceSn=SN 01/A&outputPower=50");
        assert_eq!(request.header_value("time"), Some("1700000000123"));
        assert_eq!(request.header_value("Cookie"), Some("JSESSIONID=tok"));

        let expected = Signer::default().sign_control("SN 01/A", power(50));
        assert_eq!(request.header_value("sign"), Some(expected.as_str()));
        assert_eq!(
            Signer::default().control_sign_string("SN 01/A", power(50)),
            format!("deviceSn=SN%2001%2FA&outputPower=50{}", protocol::SIGNATURE_KEY)
        );
    }

    #[tokio::test]
    async fn test_classifies_result_codes() {
        let transport = Arc::new(ScriptedTransport::new().with_control([
            Reply::result(0),
            Reply::result(2),
            Reply::result(10000),
            Reply::result(42),
            Reply::status(502, "bad gateway"),
            Reply::Timeout,
        ]));
        let client = client(transport);
        let token = SessionToken::new("tok");

        let mut outcomes = Vec::new();
        for _ in 0..6 {
            outcomes.push(client.set_output(&token, power(10)).await.outcome);
        }

        assert_eq!(
            outcomes,
            vec![
                RequestOutcome::Success,
                RequestOutcome::DeviceOffline,
                RequestOutcome::SessionExpired,
                RequestOutcome::PermanentError,
                RequestOutcome::PermanentError,
                RequestOutcome::TransientError,
            ]
        );
    }

    #[test]
    fn test_error_mapping() {
        let transient = ControlResponse::new(RequestOutcome::TransientError, "timed out");
        assert_eq!(transient.to_error(), ServiceError::Transport("timed out".into()));

        let permanent = ControlResponse::new(RequestOutcome::PermanentError, "HTTP status 500");
        assert_eq!(permanent.to_error(), ServiceError::Protocol("HTTP status 500".into()));

        let expired = ControlResponse::new(RequestOutcome::SessionExpired, "session expired");
        assert_eq!(expired.to_error(), ServiceError::SessionExpired);
    }
}
