//! Scripted in-memory transport for unit tests

use crate::transport::traits::{
    HeaderObserver, HttpRequest, HttpResponse, HttpTransport, TransportError,
};
use async_trait::async_trait;
use bytes::Bytes;
use powerlink_shared::protocol;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// One scripted reply
#[derive(Debug, Clone)]
pub enum Reply {
    Respond {
        status: u16,
        body: String,
        set_cookie: Option<String>,
    },
    Timeout,
}

impl Reply {
    pub fn ok(body: &str) -> Self {
        Reply::Respond {
            status: 200,
            body: body.into(),
            set_cookie: None,
        }
    }

    pub fn status(status: u16, body: &str) -> Self {
        Reply::Respond {
            status,
            body: body.into(),
            set_cookie: None,
        }
    }

    /// Successful login handing out `token`
    pub fn login(token: &str) -> Self {
        Reply::Respond {
            status: 200,
            body: r#"{"result":0,"msg":"ok"}"#.into(),
            set_cookie: Some(format!("JSESSIONID={}; Path=/; HttpOnly", token)),
        }
    }

    pub fn result(code: i64) -> Self {
        Reply::ok(&format!(r#"{{"result":{},"msg":"x"}}"#, code))
    }
}

/// Which endpoint a recorded request went to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Login,
    SetOutput,
    Other,
}

/// Transport answering from per-endpoint scripts, recording every request
///
/// When a script runs dry the fallback reply for that endpoint is used.
pub struct ScriptedTransport {
    login: Mutex<VecDeque<Reply>>,
    control: Mutex<VecDeque<Reply>>,
    login_fallback: Reply,
    control_fallback: Reply,
    log: Mutex<Vec<(Endpoint, HttpRequest)>>,
}

impl ScriptedTransport {
    /// Logins hand out `token-<n>`, control requests succeed
    pub fn new() -> Self {
        Self {
            login: Mutex::new(VecDeque::new()),
            control: Mutex::new(VecDeque::new()),
            login_fallback: Reply::login("token"),
            control_fallback: Reply::result(protocol::RESULT_OK),
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn with_login(self, replies: impl IntoIterator<Item = Reply>) -> Self {
        self.login.lock().unwrap().extend(replies);
        self
    }

    pub fn with_control(self, replies: impl IntoIterator<Item = Reply>) -> Self {
        self.control.lock().unwrap().extend(replies);
        self
    }

    pub fn login_fallback(mut self, reply: Reply) -> Self {
        self.login_fallback = reply;
        self
    }

    pub fn control_fallback(mut self, reply: Reply) -> Self {
        self.control_fallback = reply;
        self
    }

    pub fn requests(&self) -> Vec<(Endpoint, HttpRequest)> {
        self.log.lock().unwrap().clone()
    }

    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.requests().into_iter().map(|(e, _)| e).collect()
    }

    pub fn count(&self, endpoint: Endpoint) -> usize {
        self.endpoints().into_iter().filter(|e| *e == endpoint).count()
    }

    fn endpoint_of(url: &str) -> Endpoint {
        if url.ends_with(protocol::LOGIN_PATH) {
            Endpoint::Login
        } else if url.ends_with(protocol::SET_OUTPUT_PATH) {
            Endpoint::SetOutput
        } else {
            Endpoint::Other
        }
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn perform(
        &self,
        request: &HttpRequest,
        observer: Option<&mut dyn HeaderObserver>,
    ) -> Result<HttpResponse, TransportError> {
        let endpoint = Self::endpoint_of(&request.url);
        self.log.lock().unwrap().push((endpoint, request.clone()));

        let reply = match endpoint {
            Endpoint::Login => self
                .login
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.login_fallback.clone()),
            Endpoint::SetOutput => self
                .control
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.control_fallback.clone()),
            Endpoint::Other => Reply::status(404, ""),
        };

        // Let other tasks run, as a real exchange would
        tokio::time::sleep(Duration::from_millis(1)).await;

        match reply {
            Reply::Timeout => Err(TransportError::Timeout(request.timeout)),
            Reply::Respond {
                status,
                body,
                set_cookie,
            } => {
                if let (Some(observer), Some(cookie)) = (observer, set_cookie) {
                    observer.on_header("content-type", "application/json");
                    observer.on_header("set-cookie", &cookie);
                }
                Ok(HttpResponse {
                    status,
                    body: Bytes::from(body),
                })
            }
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
