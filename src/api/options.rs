//! Request bodies for the request/response endpoints.
//!
//! Every option the service understands is a named field; there is no
//! pass-through map, so an unknown option cannot reach the wire.

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Serialize, Serializer};
use serde_json::Value;

fn is_false(value: &bool) -> bool {
    !*value
}

/// Either a bare on-switch or a detailed option object.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Toggle<T> {
    Enabled(bool),
    With(T),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    Auto,
    Neural,
    Keyword,
    Fast,
    Hybrid,
    Deep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Livecrawl {
    Always,
    Preferred,
    Fallback,
    Never,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
pub enum AnswerModel {
    #[value(name = "exa")]
    #[serde(rename = "exa")]
    Exa,
    #[value(name = "exa-pro")]
    #[serde(rename = "exa-pro")]
    ExaPro,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_characters: Option<u32>,
    #[serde(skip_serializing_if = "is_false")]
    pub include_html_tags: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightsOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_sentences: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlights_per_url: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

impl HighlightsOptions {
    pub fn is_empty(&self) -> bool {
        self.num_sentences.is_none() && self.highlights_per_url.is_none() && self.query.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SummaryOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtrasOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_links: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_characters: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SubpageTarget {
    One(String),
    Many(Vec<String>),
}

impl SubpageTarget {
    /// `"docs"` stays single; `"docs, api"` becomes a list.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.contains(',') {
            let parts = raw
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(str::to_owned)
                .collect::<Vec<_>>();
            return (!parts.is_empty()).then_some(Self::Many(parts));
        }
        let raw = raw.trim();
        (!raw.is_empty()).then(|| Self::One(raw.to_owned()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentsOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<Toggle<TextOptions>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlights: Option<Toggle<HighlightsOptions>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<SummaryOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subpages: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subpage_target: Option<SubpageTarget>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extras: Option<ExtrasOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Toggle<ContextOptions>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub livecrawl: Option<Livecrawl>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub livecrawl_timeout: Option<u64>,
    #[serde(skip_serializing_if = "is_false")]
    pub filter_empty_results: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
}

impl ContentsOptions {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Filters shared by `search` and `findSimilar`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultFilters {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub include_domains: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclude_domains: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_published_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_published_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_crawl_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_crawl_date: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub include_text: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclude_text: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub query: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub search_type: Option<SearchType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_results: Option<u32>,
    #[serde(flatten)]
    pub filters: ResultFilters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_location: Option<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub moderation: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub use_autoprompt: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contents: Option<ContentsOptions>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentsRequest {
    pub urls: Vec<String>,
    #[serde(flatten)]
    pub options: ContentsOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FindSimilarRequest {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_results: Option<u32>,
    #[serde(skip_serializing_if = "is_false")]
    pub exclude_source_domain: bool,
    #[serde(flatten)]
    pub filters: ResultFilters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contents: Option<ContentsOptions>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRequest {
    pub query: String,
    pub text: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<AnswerModel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_location: Option<String>,
}

/// Token budget for the code-context endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokensNum {
    Dynamic,
    Count(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseTokensNumError;

impl fmt::Display for ParseTokensNumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected \"dynamic\" or a positive integer")
    }
}

impl std::error::Error for ParseTokensNumError {}

impl FromStr for TokensNum {
    type Err = ParseTokensNumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("dynamic") {
            return Ok(Self::Dynamic);
        }
        match s.parse::<u32>() {
            Ok(count) if count > 0 => Ok(Self::Count(count)),
            _ => Err(ParseTokensNumError),
        }
    }
}

impl Serialize for TokensNum {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Dynamic => serializer.serialize_str("dynamic"),
            Self::Count(count) => serializer.serialize_u32(*count),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextRequest {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_num: Option<TokensNum>,
}
