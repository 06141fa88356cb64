use std::io::Read;
use std::sync::Arc;

use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::{ExaError, Result};

mod http;
mod retry;

pub use http::ReqwestBackend;
pub use retry::{Backoff, DEFAULT_MAX_ATTEMPTS, RetryPolicy};

const MAX_ERROR_BODY_CHARS: usize = 2048;
const MAX_ERROR_BODY_BYTES: u64 = 64 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Relative to the configured base URL, without a leading slash.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: Some(body),
        }
    }

    pub fn with_query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_owned(), value.to_string()));
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_owned(), value.into()));
        self
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

pub struct StreamReply {
    pub status: u16,
    pub body: Box<dyn Read + Send>,
}

/// One network attempt, no retries. Implementations report connection-level
/// failures as `ExaError::Retryable` and leave status interpretation to
/// [`Transport`].
pub trait HttpBackend: Send + Sync {
    fn send(&self, request: &ApiRequest) -> Result<HttpReply>;

    fn open_stream(&self, request: &ApiRequest) -> Result<StreamReply>;
}

pub fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Maps a non-2xx status onto the error taxonomy: 429 and 5xx are transient,
/// 404 is `NotFound`, everything else is fatal.
pub fn status_error(status: u16, body: &str) -> ExaError {
    let preview: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    match status {
        404 => ExaError::NotFound(preview),
        429 | 500..=599 => ExaError::Retryable(format!("http status {status}: {preview}")),
        _ => ExaError::Http {
            status,
            body: preview,
        },
    }
}

pub struct Transport {
    backend: Box<dyn HttpBackend>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
}

impl Transport {
    pub fn new(backend: impl HttpBackend + 'static, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend: Box::new(backend),
            clock,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Request/response call with the retry policy applied. An empty 2xx body
    /// decodes as `null`.
    pub fn send(&self, request: &ApiRequest) -> Result<Value> {
        self.with_retries(request, |request| self.send_once(request))
    }

    pub fn send_once(&self, request: &ApiRequest) -> Result<Value> {
        let reply = self.backend.send(request)?;
        if !is_success(reply.status) {
            return Err(status_error(reply.status, &reply.body));
        }
        debug!(method = %request.method, path = %request.path, status = reply.status, "http ok");
        if reply.body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&reply.body)?)
    }

    /// Opens a streaming body with the retry policy applied to connecting.
    pub fn open(&self, request: &ApiRequest) -> Result<Box<dyn Read + Send>> {
        self.with_retries(request, |request| self.open_once(request))
    }

    pub fn open_once(&self, request: &ApiRequest) -> Result<Box<dyn Read + Send>> {
        let reply = self.backend.open_stream(request)?;
        if is_success(reply.status) {
            debug!(path = %request.path, status = reply.status, "stream connected");
            return Ok(reply.body);
        }

        let mut body = String::new();
        if let Err(err) = reply
            .body
            .take(MAX_ERROR_BODY_BYTES)
            .read_to_string(&mut body)
        {
            debug!(path = %request.path, status = reply.status, "read error body: {err}");
        }
        Err(status_error(reply.status, &body))
    }

    fn with_retries<T>(
        &self,
        request: &ApiRequest,
        attempt: impl Fn(&ApiRequest) -> Result<T>,
    ) -> Result<T> {
        let mut failures = 0u32;
        loop {
            match attempt(request) {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() => {
                    failures += 1;
                    let Some(delay) = self.policy.next_delay(failures) else {
                        return Err(ExaError::RetriesExhausted {
                            attempts: failures,
                            last: err.to_string(),
                        });
                    };
                    warn!(
                        path = %request.path,
                        attempt = failures,
                        delay = ?delay,
                        "transient failure; retrying: {err}"
                    );
                    self.clock.sleep(delay);
                }
                Err(err) => return Err(err),
            }
        }
    }
}
