use std::collections::VecDeque;
use std::io::{ErrorKind, Read};

use serde::Serialize;
use serde_json::Value;

use crate::error::{ExaError, Result};
use crate::sse::SseParser;

const DONE_SENTINEL: &str = "[DONE]";
const READ_BUFFER_BYTES: usize = 4 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerChunk {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citations: Option<Value>,
}

impl AnswerChunk {
    fn from_data(data: &str) -> Option<Self> {
        let Ok(value) = serde_json::from_str::<Value>(data) else {
            return Some(Self {
                content: Some(data.to_owned()),
                citations: None,
            });
        };

        let content = value
            .pointer("/choices/0/delta/content")
            .or_else(|| value.get("content"))
            .or_else(|| value.get("answer"))
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
            .map(str::to_owned);
        let citations = value.get("citations").filter(|c| !c.is_null()).cloned();

        if content.is_none() && citations.is_none() {
            return None;
        }
        Some(Self { content, citations })
    }
}

/// Chunks of a streamed answer. The request is not idempotent, so a broken
/// body ends the sequence with an error instead of reconnecting.
pub struct AnswerStream {
    reader: Option<Box<dyn Read + Send>>,
    parser: SseParser,
    pending: VecDeque<AnswerChunk>,
    buf: Box<[u8]>,
}

impl AnswerStream {
    pub fn new(reader: Box<dyn Read + Send>) -> Self {
        Self {
            reader: Some(reader),
            parser: SseParser::new(),
            pending: VecDeque::new(),
            buf: vec![0; READ_BUFFER_BYTES].into_boxed_slice(),
        }
    }
}

impl Iterator for AnswerStream {
    type Item = Result<AnswerChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(chunk) = self.pending.pop_front() {
                return Some(Ok(chunk));
            }
            let reader = self.reader.as_mut()?;

            match reader.read(&mut self.buf) {
                Ok(0) => self.reader = None,
                Ok(n) => {
                    for record in self.parser.feed(&self.buf[..n]) {
                        if record.data.trim() == DONE_SENTINEL {
                            self.reader = None;
                            break;
                        }
                        self.pending.extend(AnswerChunk::from_data(&record.data));
                    }
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => {
                    self.reader = None;
                    return Some(Err(ExaError::Stream(Box::new(ExaError::Io(err)))));
                }
            }
        }
    }
}
