//! Wire codec for the vendor cloud API
//!
//! Requests are `application/x-www-form-urlencoded` bodies. Responses are JSON
//! documents carrying an integer `result` code:
//! ```text
//! {"result":0,"msg":"..."}      applied
//! {"result":2,"msg":"..."}      inverter offline
//! {"result":10000,"msg":"..."}  session expired
//! ```
//!
//! Form values are written exactly as given. The vendor signs percent-encoded
//! values but expects raw values on the wire, so encoding is left to the caller.

use crate::{protocol, RequestOutcome};

/// Percent-encode a value for a canonical sign string
///
/// Unreserved characters (`A-Z a-z 0-9 - _ . ~`) are kept, everything else
/// becomes `%XX` with uppercase hex digits.
pub fn url_encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Ordered form body builder
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormBody {
    fields: Vec<(&'static str, String)>,
}

impl FormBody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field, value written verbatim
    pub fn field(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.fields.push((key, value.into()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Render as `k1=v1&k2=v2`
    pub fn encode(&self) -> String {
        self.fields
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Extract the integer `result` code from a response body
///
/// Only the top-level `result` of a JSON body counts. Bodies that are not
/// valid JSON (truncated, wrapped in HTML, ...) fall back to a lexical scan
/// for `"result":<int>`.
pub fn parse_result_code(body: &[u8]) -> Option<i64> {
    let body = &body[..body.len().min(protocol::MAX_RESPONSE_BYTES)];

    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(value) => value.get("result").and_then(serde_json::Value::as_i64),
        Err(_) => scan_result_code(&String::from_utf8_lossy(body)),
    }
}

fn scan_result_code(text: &str) -> Option<i64> {
    const KEY: &str = "\"result\"";

    let mut rest = text;
    while let Some(pos) = rest.find(KEY) {
        rest = &rest[pos + KEY.len()..];
        let after_colon = match rest.trim_start().strip_prefix(':') {
            Some(s) => s.trim_start(),
            None => continue,
        };

        let (negative, digits_start) = match after_colon.strip_prefix('-') {
            Some(s) => (true, s),
            None => (false, after_colon),
        };
        let digits: String = digits_start
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .take(18)
            .collect();
        if digits.is_empty() {
            continue;
        }

        let code: i64 = digits.parse().ok()?;
        return Some(if negative { -code } else { code });
    }

    None
}

/// Classify a control endpoint response
pub fn classify_control_response(status: u16, body: &[u8]) -> RequestOutcome {
    if status != 200 {
        return RequestOutcome::PermanentError;
    }

    match parse_result_code(body) {
        Some(protocol::RESULT_OK) => RequestOutcome::Success,
        Some(protocol::RESULT_DEVICE_OFFLINE) => RequestOutcome::DeviceOffline,
        Some(protocol::RESULT_SESSION_EXPIRED) => RequestOutcome::SessionExpired,
        _ => RequestOutcome::PermanentError,
    }
}

/// Whether a login response carries the success marker
pub fn is_login_success(status: u16, body: &[u8]) -> bool {
    status == 200 && parse_result_code(body) == Some(protocol::RESULT_OK)
}

/// Extract a session token from a `Set-Cookie` header value
///
/// Locates `<cookie>=` at the start of a cookie pair and returns the value up
/// to the next `;` or the end of the header. Empty or oversized tokens yield
/// `None`.
pub fn extract_cookie_token<'a>(header_value: &'a str, cookie: &str) -> Option<&'a str> {
    let needle = format!("{}=", cookie);
    let mut offset = 0;

    while let Some(pos) = header_value[offset..].find(&needle) {
        let start = offset + pos;
        let at_boundary = header_value[..start]
            .chars()
            .next_back()
            .map_or(true, |c| c == ';' || c == ',' || c.is_whitespace());

        if at_boundary {
            let value_start = start + needle.len();
            let rest = &header_value[value_start..];
            let token = rest.split(';').next().unwrap_or_default().trim();
            if token.is_empty() || token.len() > protocol::MAX_TOKEN_LEN {
                return None;
            }
            return Some(token);
        }

        offset = start + needle.len();
    }

    None
}

/// Preview of a response body for log messages
pub fn body_preview(body: &[u8]) -> String {
    const PREVIEW_LEN: usize = 200;
    let text = String::from_utf8_lossy(&body[..body.len().min(PREVIEW_LEN)]);
    if body.len() > PREVIEW_LEN {
        format!("{}...", text)
    } else {
        text.into_owned()
    }
}
