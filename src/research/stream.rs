use std::collections::VecDeque;
use std::io::{ErrorKind, Read};

use tracing::{debug, warn};

use super::Event;
use crate::error::{ExaError, Result};
use crate::sse::SseParser;
use crate::transport::{ApiRequest, Transport};

const READ_BUFFER_BYTES: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Connecting,
    Streaming,
    Reconnecting,
    Ended,
    Failed,
}

/// Forward-only sequence of a task's events.
///
/// Transient failures (429, 5xx, connection errors, a body that breaks off
/// mid-stream) are retried with the transport's backoff and attempt budget.
/// The budget resets once a connection delivers data; a connection that opens
/// and then breaks before sending anything still counts against it. Once the budget is spent, or a
/// fatal status arrives, the sequence yields one `ExaError::Stream` and then
/// nothing. Dropping the stream closes the connection.
pub struct EventStream<'a> {
    transport: &'a Transport,
    request: ApiRequest,
    state: StreamState,
    reader: Option<Box<dyn Read + Send>>,
    parser: SseParser,
    pending: VecDeque<Event>,
    buf: Box<[u8]>,
    failures: u32,
    reconnects: u32,
}

impl<'a> EventStream<'a> {
    pub fn new(transport: &'a Transport, request: ApiRequest) -> Self {
        Self {
            transport,
            request,
            state: StreamState::Connecting,
            reader: None,
            parser: SseParser::new(),
            pending: VecDeque::new(),
            buf: vec![0; READ_BUFFER_BYTES].into_boxed_slice(),
            failures: 0,
            reconnects: 0,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Number of times the stream went back to connecting after it had
    /// started, whether the connect or the body failed.
    pub fn reconnects(&self) -> u32 {
        self.reconnects
    }

    fn connect(&mut self) -> Result<()> {
        loop {
            let mut request = self.request.clone();
            if let Some(last_id) = self.parser.last_event_id() {
                request = request.with_header("Last-Event-ID", last_id);
            }

            match self.transport.open_once(&request) {
                Ok(reader) => {
                    self.reader = Some(reader);
                    self.state = StreamState::Streaming;
                    return Ok(());
                }
                Err(err) if err.is_retryable() => self.back_off(err)?,
                Err(err) => return Err(err),
            }
        }
    }

    fn read_chunk(&mut self) -> Result<()> {
        let Some(reader) = self.reader.as_mut() else {
            self.state = StreamState::Reconnecting;
            return Ok(());
        };

        match reader.read(&mut self.buf) {
            Ok(0) => {
                if self.parser.has_partial() {
                    debug!(path = %self.request.path, "discarding truncated record at end of stream");
                }
                debug!(path = %self.request.path, "stream ended");
                self.close();
                self.state = StreamState::Ended;
            }
            Ok(n) => {
                self.failures = 0;
                let records = self.parser.feed(&self.buf[..n]);
                self.pending
                    .extend(records.into_iter().map(Event::from_record));
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => {
                self.close();
                self.back_off(ExaError::Retryable(format!("read stream: {err}")))?;
            }
        }
        Ok(())
    }

    fn back_off(&mut self, err: ExaError) -> Result<()> {
        self.failures += 1;
        let Some(delay) = self.transport.policy().next_delay(self.failures) else {
            return Err(ExaError::RetriesExhausted {
                attempts: self.failures,
                last: err.to_string(),
            });
        };
        if self.state != StreamState::Reconnecting {
            self.reconnects += 1;
        }
        self.state = StreamState::Reconnecting;
        warn!(
            path = %self.request.path,
            attempt = self.failures,
            delay = ?delay,
            "stream interrupted; reconnecting: {err}"
        );
        self.transport.clock().sleep(delay);
        Ok(())
    }

    fn close(&mut self) {
        self.reader = None;
        self.parser.reset();
    }

    fn fail(&mut self, err: ExaError) -> ExaError {
        self.close();
        self.pending.clear();
        self.state = StreamState::Failed;
        ExaError::Stream(Box::new(err))
    }
}

impl Iterator for EventStream<'_> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(Ok(event));
            }

            let step = match self.state {
                StreamState::Ended | StreamState::Failed => return None,
                StreamState::Connecting | StreamState::Reconnecting => self.connect(),
                StreamState::Streaming => self.read_chunk(),
            };
            if let Err(err) = step {
                return Some(Err(self.fail(err)));
            }
        }
    }
}
