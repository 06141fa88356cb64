use std::fmt;
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{ExaError, Result};
use crate::sse::SseRecord;
use crate::transport::{ApiRequest, Transport};

mod poll;
mod stream;

pub use poll::{DEFAULT_POLL_TIMEOUT, PollOptions, wait_until_finished};
pub use stream::{EventStream, StreamState};

const RESEARCH_PATH: &str = "research/v1";
const MAX_LIST_LIMIT: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum, Serialize, Deserialize)]
pub enum ResearchModel {
    #[default]
    #[value(name = "fast", alias = "exa-research-fast")]
    #[serde(rename = "exa-research-fast")]
    Fast,
    #[value(name = "balanced", alias = "exa-research")]
    #[serde(rename = "exa-research")]
    Balanced,
    #[value(name = "thorough", aliases = ["exa-research-pro", "pro"])]
    #[serde(rename = "exa-research-pro")]
    Thorough,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseResearchModelError;

impl fmt::Display for ParseResearchModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid ResearchModel")
    }
}

impl std::error::Error for ParseResearchModelError {}

impl ResearchModel {
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Fast => "exa-research-fast",
            Self::Balanced => "exa-research",
            Self::Thorough => "exa-research-pro",
        }
    }

    /// Caller-side polling preset. The service does not enforce it.
    pub fn poll_interval(self) -> Duration {
        match self {
            Self::Fast => Duration::from_secs(10),
            Self::Balanced => Duration::from_secs(30),
            Self::Thorough => Duration::from_secs(40),
        }
    }
}

impl fmt::Display for ResearchModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl std::str::FromStr for ResearchModel {
    type Err = ParseResearchModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" | "exa-research-fast" => Ok(Self::Fast),
            "balanced" | "exa-research" => Ok(Self::Balanced),
            "thorough" | "pro" | "exa-research-pro" => Ok(Self::Thorough),
            _ => Err(ParseResearchModelError),
        }
    }
}

/// Status as reported by the service. Anything outside the known non-terminal
/// set counts as terminal.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskStatus {
    Pending,
    #[default]
    Queued,
    Running,
    Completed,
    Failed,
    Canceled,
    Other(String),
}

impl TaskStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
            Self::Other(other) => other,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Queued | Self::Running)
    }
}

impl From<String> for TaskStatus {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Self::Pending,
            "queued" => Self::Queued,
            "running" | "in_progress" => Self::Running,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "canceled" | "cancelled" => Self::Canceled,
            _ => Self::Other(value),
        }
    }
}

impl From<TaskStatus> for String {
    fn from(value: TaskStatus) -> Self {
        match value {
            TaskStatus::Other(other) => other,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One progress/output record of a task. Wire objects without an explicit
/// `kind`/`payload` pair keep the whole object as payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct Event {
    pub kind: String,
    pub payload: Value,
}

impl Event {
    pub fn from_record(record: SseRecord) -> Self {
        let payload = if record.data.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&record.data).unwrap_or(Value::String(record.data))
        };
        let kind = record
            .event
            .filter(|event| event != "message")
            .or_else(|| kind_of(&payload))
            .unwrap_or_else(|| "message".to_owned());
        Self { kind, payload }
    }
}

impl From<Value> for Event {
    fn from(value: Value) -> Self {
        if let Value::Object(map) = &value {
            if map.len() == 2 {
                let kind = map.get("kind").and_then(Value::as_str);
                if let (Some(kind), Some(payload)) = (kind, map.get("payload")) {
                    return Self {
                        kind: kind.to_owned(),
                        payload: payload.clone(),
                    };
                }
            }
        }
        let kind = kind_of(&value).unwrap_or_else(|| "message".to_owned());
        Self {
            kind,
            payload: value,
        }
    }
}

fn kind_of(value: &Value) -> Option<String> {
    ["eventType", "kind", "type"]
        .iter()
        .find_map(|key| value.get(key).and_then(Value::as_str))
        .map(str::to_owned)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(alias = "researchId")]
    pub id: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(
        default,
        deserialize_with = "lenient_model",
        skip_serializing_if = "Option::is_none"
    )]
    pub model: Option<ResearchModel>,
    #[serde(default, alias = "output", skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<Event>>,
    /// Remaining service fields (timestamps, cost, error detail), kept for output.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn lenient_model<'de, D>(deserializer: D) -> Result<Option<ResearchModel>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|raw| raw.parse().ok()))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPage {
    pub tasks: Vec<Task>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskPageWire {
    #[serde(default, alias = "data")]
    tasks: Vec<Task>,
    #[serde(default)]
    next_cursor: Option<String>,
    #[serde(default)]
    has_more: Option<bool>,
}

impl From<TaskPageWire> for TaskPage {
    fn from(wire: TaskPageWire) -> Self {
        let next_cursor = match wire.has_more {
            Some(false) => None,
            _ => wire.next_cursor.filter(|cursor| !cursor.is_empty()),
        };
        Self {
            tasks: wire.tasks,
            next_cursor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTask {
    pub instructions: String,
    pub model: ResearchModel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
}

impl CreateTask {
    pub fn new(instructions: impl Into<String>, model: ResearchModel) -> Self {
        Self {
            instructions: instructions.into(),
            model,
            output_schema: None,
        }
    }

    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.instructions.trim().is_empty() {
            return Err(ExaError::InvalidRequest(
                "instructions must not be empty".to_owned(),
            ));
        }
        if let Some(schema) = &self.output_schema {
            if !schema.is_object() {
                return Err(ExaError::InvalidRequest(
                    "output schema must be a JSON object".to_owned(),
                ));
            }
        }
        Ok(())
    }
}

/// Task lifecycle operations. The local side never mutates a task; every call
/// returns a fresh copy from the service.
pub trait ResearchApi {
    fn create(&self, request: &CreateTask) -> Result<Task>;

    /// With `include_events`, the task carries its full event history so far.
    fn get(&self, id: &str, include_events: bool) -> Result<Task>;

    /// Newest first. Pass `next_cursor` back verbatim for the following page.
    fn list(&self, cursor: Option<&str>, limit: Option<u32>) -> Result<TaskPage>;
}

#[derive(Clone, Copy)]
pub struct ResearchClient<'a> {
    transport: &'a Transport,
}

impl<'a> ResearchClient<'a> {
    pub fn new(transport: &'a Transport) -> Self {
        Self { transport }
    }

    /// Lazily opens the task's event feed on first use.
    pub fn stream(&self, id: &str) -> Result<EventStream<'a>> {
        let request = ApiRequest::get(task_path(id)?).with_query("stream", "true");
        Ok(EventStream::new(self.transport, request))
    }

    pub fn wait_until_finished(&self, id: &str, options: PollOptions) -> Result<Task> {
        wait_until_finished(self, self.transport.clock(), id, options)
    }
}

impl ResearchApi for ResearchClient<'_> {
    fn create(&self, request: &CreateTask) -> Result<Task> {
        request.validate()?;
        let body = serde_json::to_value(request)?;
        let response = self.transport.send(&ApiRequest::post(RESEARCH_PATH, body))?;
        let mut task: Task = serde_json::from_value(response)?;
        if task.model.is_none() {
            task.model = Some(request.model);
        }
        Ok(task)
    }

    fn get(&self, id: &str, include_events: bool) -> Result<Task> {
        let mut request = ApiRequest::get(task_path(id)?);
        if include_events {
            request = request.with_query("events", "true");
        }
        let response = self.transport.send(&request)?;
        Ok(serde_json::from_value(response)?)
    }

    fn list(&self, cursor: Option<&str>, limit: Option<u32>) -> Result<TaskPage> {
        let mut request = ApiRequest::get(RESEARCH_PATH);
        if let Some(limit) = limit {
            if limit == 0 || limit > MAX_LIST_LIMIT {
                return Err(ExaError::InvalidRequest(format!(
                    "limit must be between 1 and {MAX_LIST_LIMIT}"
                )));
            }
            request = request.with_query("limit", limit);
        }
        if let Some(cursor) = cursor {
            request = request.with_query("cursor", cursor);
        }
        let response = self.transport.send(&request)?;
        let wire: TaskPageWire = serde_json::from_value(response)?;
        Ok(wire.into())
    }
}

/// Path of one task. Surrounding whitespace is dropped; anything that would
/// change the shape of the path is rejected.
fn task_path(id: &str) -> Result<String> {
    let id = id.trim();
    if id.is_empty() {
        return Err(ExaError::InvalidRequest("task id must not be empty".to_owned()));
    }
    if id
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '/' | '?' | '#' | '%'))
    {
        return Err(ExaError::InvalidRequest(format!("malformed task id: {id}")));
    }
    Ok(format!("{RESEARCH_PATH}/{id}"))
}
