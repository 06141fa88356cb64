use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::ACCEPT;
use url::Url;

use super::{ApiRequest, HttpBackend, HttpReply, StreamReply};
use crate::config::ClientConfig;
use crate::error::{ExaError, Result};

const API_KEY_HEADER: &str = "x-api-key";
const USER_AGENT: &str = concat!("exa-direct/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct ReqwestBackend {
    api_key: String,
    base_url: Url,
    http: Client,
    stream_http: Client,
}

impl ReqwestBackend {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|err| ExaError::Config(format!("build http client: {err}")))?;
        let stream_http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(None::<Duration>)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|err| ExaError::Config(format!("build stream client: {err}")))?;

        Ok(Self {
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            http,
            stream_http,
        })
    }

    fn build(&self, client: &Client, request: &ApiRequest) -> Result<RequestBuilder> {
        let url = self.base_url.join(&request.path).map_err(|err| {
            ExaError::InvalidRequest(format!("build url for {}: {err}", request.path))
        })?;

        let mut builder = client
            .request(request.method.clone(), url)
            .header(API_KEY_HEADER, &self.api_key);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        Ok(builder)
    }
}

impl HttpBackend for ReqwestBackend {
    fn send(&self, request: &ApiRequest) -> Result<HttpReply> {
        let resp = self
            .build(&self.http, request)?
            .send()
            .map_err(send_error)?;

        let status = resp.status().as_u16();
        let body = resp
            .text()
            .map_err(|err| ExaError::Retryable(format!("read response body: {err}")))?;
        Ok(HttpReply { status, body })
    }

    fn open_stream(&self, request: &ApiRequest) -> Result<StreamReply> {
        let resp = self
            .build(&self.stream_http, request)?
            .header(ACCEPT, "text/event-stream")
            .send()
            .map_err(send_error)?;

        Ok(StreamReply {
            status: resp.status().as_u16(),
            body: Box::new(resp),
        })
    }
}

fn send_error(err: reqwest::Error) -> ExaError {
    if err.is_builder() {
        return ExaError::InvalidRequest(format!("build request: {err}"));
    }
    ExaError::Retryable(format!("send request: {err}"))
}
