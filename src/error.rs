use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExaError {
    #[error("{0}")]
    Config(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Transient condition (429, 5xx, connection failure). Only the retry
    /// loops see this; callers get `RetriesExhausted` once the budget is spent.
    #[error("transient failure: {0}")]
    Retryable(String),

    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("http status {status}: {body}")]
    Http { status: u16, body: String },

    #[error("task {id} not finished after {waited:?}")]
    Timeout { id: String, waited: Duration },

    #[error("stream failed: {0}")]
    Stream(#[source] Box<ExaError>),

    #[error("decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl ExaError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::InvalidRequest(_) => "invalid_request",
            Self::NotFound(_) => "not_found",
            Self::Retryable(_) => "retryable",
            Self::RetriesExhausted { .. } => "retries_exhausted",
            Self::Http { .. } => "http",
            Self::Timeout { .. } => "timeout",
            Self::Stream(_) => "stream",
            Self::Decode(_) => "decode",
            Self::Io(_) => "io",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }
}

pub type Result<T, E = ExaError> = std::result::Result<T, E>;
