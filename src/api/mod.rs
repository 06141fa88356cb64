use std::sync::Arc;

use serde_json::{Value, json};

use crate::clock::SystemClock;
use crate::config::ClientConfig;
use crate::error::{ExaError, Result};
use crate::research::ResearchClient;
use crate::transport::{ApiRequest, ReqwestBackend, Transport};

mod answer;
pub mod options;

pub use answer::{AnswerChunk, AnswerStream};
pub use options::{
    AnswerRequest, ContentsOptions, ContentsRequest, ContextRequest, FindSimilarRequest,
    SearchRequest,
};

/// Entry point for every endpoint. Each call is one transport round trip with
/// the default retry policy.
pub struct ExaClient {
    transport: Transport,
}

impl ExaClient {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let backend = ReqwestBackend::new(config)?;
        Ok(Self::new(Transport::new(backend, Arc::new(SystemClock))))
    }

    pub fn research(&self) -> ResearchClient<'_> {
        ResearchClient::new(&self.transport)
    }

    pub fn search(&self, request: &SearchRequest) -> Result<Value> {
        require_text("query", &request.query)?;
        self.post("search", request)
    }

    pub fn contents(&self, request: &ContentsRequest) -> Result<Value> {
        if request.urls.iter().all(|url| url.trim().is_empty()) {
            return Err(ExaError::InvalidRequest(
                "at least one url is required".to_owned(),
            ));
        }
        self.post("contents", request)
    }

    pub fn find_similar(&self, request: &FindSimilarRequest) -> Result<Value> {
        require_text("url", &request.url)?;
        self.post("findSimilar", request)
    }

    pub fn answer(&self, request: &AnswerRequest) -> Result<Value> {
        require_text("query", &request.query)?;
        let mut body = serde_json::to_value(request)?;
        body["stream"] = json!(false);
        self.transport.send(&ApiRequest::post("answer", body))
    }

    pub fn answer_stream(&self, request: &AnswerRequest) -> Result<AnswerStream> {
        require_text("query", &request.query)?;
        let mut body = serde_json::to_value(request)?;
        body["stream"] = json!(true);
        let reader = self.transport.open(&ApiRequest::post("answer", body))?;
        Ok(AnswerStream::new(reader))
    }

    pub fn context(&self, request: &ContextRequest) -> Result<Value> {
        require_text("query", &request.query)?;
        self.post("context", request)
    }

    fn post(&self, path: &str, request: &impl serde::Serialize) -> Result<Value> {
        let body = serde_json::to_value(request)?;
        self.transport.send(&ApiRequest::post(path, body))
    }
}

fn require_text(name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ExaError::InvalidRequest(format!("{name} must not be empty")));
    }
    Ok(())
}
