use std::time::Duration;

use url::Url;

use crate::error::{ExaError, Result};

pub const API_KEY_ENV: &str = "EXA_API_KEY";
pub const BASE_URL_ENV: &str = "EXA_BASE_URL";
pub const DEFAULT_BASE_URL: &str = "https://api.exa.ai/";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone)]
pub struct ClientConfig {
    pub api_key: String,
    pub base_url: Url,
    /// Total deadline for request/response calls.
    pub request_timeout: Duration,
    /// Streaming connections get no total deadline, only this one.
    pub connect_timeout: Duration,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url.as_str())
            .field("request_timeout", &self.request_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl ClientConfig {
    pub fn from_env(api_key_override: Option<String>) -> Result<Self> {
        Self::from_lookup(api_key_override, |name| std::env::var(name).ok())
    }

    /// Resolves the configuration with `lookup` standing in for the process
    /// environment. An explicit key wins over `EXA_API_KEY`.
    pub fn from_lookup(
        api_key_override: Option<String>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let api_key = api_key_override
            .filter(|key| !key.trim().is_empty())
            .or_else(|| lookup(API_KEY_ENV).filter(|key| !key.trim().is_empty()))
            .ok_or_else(|| {
                ExaError::Config(format!(
                    "{API_KEY_ENV} is required; set the environment variable or use --api-key"
                ))
            })?;

        let base_url = lookup(BASE_URL_ENV).unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());
        let base_url = Url::parse(&ensure_trailing_slash(&base_url))
            .map_err(|err| ExaError::Config(format!("parse {BASE_URL_ENV}: {err}")))?;

        Ok(Self {
            api_key,
            base_url,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        })
    }
}

fn ensure_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_owned()
    } else {
        format!("{url}/")
    }
}
