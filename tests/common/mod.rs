#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use exa_direct::clock::Clock;
use exa_direct::error::{ExaError, Result};
use exa_direct::transport::{ApiRequest, HttpBackend, HttpReply, StreamReply, Transport};

pub struct FakeClock {
    base: Instant,
    elapsed: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl FakeClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            base: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        })
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }

    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.base + *self.elapsed.lock().unwrap()
    }

    fn sleep(&self, duration: Duration) {
        *self.elapsed.lock().unwrap() += duration;
        self.sleeps.lock().unwrap().push(duration);
    }
}

pub enum Step {
    Reply(u16, String),
    ConnectError,
    /// Streaming body delivered in these chunks, then EOF or (with `reset`) a
    /// connection reset.
    Stream {
        chunks: Vec<String>,
        reset: bool,
    },
}

pub fn reply(status: u16, body: &str) -> Step {
    Step::Reply(status, body.to_owned())
}

pub fn stream(chunks: &[&str]) -> Step {
    Step::Stream {
        chunks: chunks.iter().map(|c| (*c).to_owned()).collect(),
        reset: false,
    }
}

pub fn stream_then_drop(chunks: &[&str]) -> Step {
    Step::Stream {
        chunks: chunks.iter().map(|c| (*c).to_owned()).collect(),
        reset: true,
    }
}

#[derive(Default)]
struct Script {
    steps: VecDeque<Step>,
    requests: Vec<ApiRequest>,
    bodies_closed: Vec<Arc<AtomicBool>>,
}

/// Backend that replays a fixed sequence of outcomes and records every request.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    script: Arc<Mutex<Script>>,
}

impl ScriptedBackend {
    pub fn new(steps: Vec<Step>) -> Self {
        let backend = Self::default();
        backend.script.lock().unwrap().steps = steps.into();
        backend
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.script.lock().unwrap().requests.clone()
    }

    pub fn calls(&self) -> usize {
        self.script.lock().unwrap().requests.len()
    }

    /// One flag per streaming body handed out; set once the body is dropped.
    pub fn bodies_closed(&self) -> Vec<bool> {
        self.script
            .lock()
            .unwrap()
            .bodies_closed
            .iter()
            .map(|flag| flag.load(Ordering::SeqCst))
            .collect()
    }

    fn next_step(&self, request: &ApiRequest) -> Step {
        let mut script = self.script.lock().unwrap();
        script.requests.push(request.clone());
        script
            .steps
            .pop_front()
            .unwrap_or_else(|| panic!("no scripted step left for {}", request.path))
    }
}

impl HttpBackend for ScriptedBackend {
    fn send(&self, request: &ApiRequest) -> Result<HttpReply> {
        match self.next_step(request) {
            Step::Reply(status, body) => Ok(HttpReply { status, body }),
            Step::ConnectError => Err(ExaError::Retryable("connection refused".to_owned())),
            Step::Stream { .. } => panic!("stream step used for a plain request"),
        }
    }

    fn open_stream(&self, request: &ApiRequest) -> Result<StreamReply> {
        match self.next_step(request) {
            Step::Reply(status, body) => Ok(StreamReply {
                status,
                body: Box::new(io::Cursor::new(body.into_bytes())),
            }),
            Step::ConnectError => Err(ExaError::Retryable("connection refused".to_owned())),
            Step::Stream { chunks, reset } => {
                let closed = Arc::new(AtomicBool::new(false));
                self.script
                    .lock()
                    .unwrap()
                    .bodies_closed
                    .push(Arc::clone(&closed));
                Ok(StreamReply {
                    status: 200,
                    body: Box::new(ChunkedBody {
                        chunks: chunks.into_iter().map(String::into_bytes).collect(),
                        fail_at_end: reset,
                        closed,
                    }),
                })
            }
        }
    }
}

/// Backend answering from a routing function instead of a queue.
pub struct RouteBackend<F> {
    route: F,
    calls: Arc<Mutex<Vec<ApiRequest>>>,
}

impl<F> RouteBackend<F>
where
    F: Fn(&ApiRequest) -> HttpReply + Send + Sync,
{
    pub fn new(route: F) -> (Self, Arc<Mutex<Vec<ApiRequest>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                route,
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

impl<F> HttpBackend for RouteBackend<F>
where
    F: Fn(&ApiRequest) -> HttpReply + Send + Sync,
{
    fn send(&self, request: &ApiRequest) -> Result<HttpReply> {
        self.calls.lock().unwrap().push(request.clone());
        Ok((self.route)(request))
    }

    fn open_stream(&self, request: &ApiRequest) -> Result<StreamReply> {
        panic!("unexpected stream request to {}", request.path)
    }
}

struct ChunkedBody {
    chunks: VecDeque<Vec<u8>>,
    fail_at_end: bool,
    closed: Arc<AtomicBool>,
}

impl Read for ChunkedBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(chunk) = self.chunks.pop_front() else {
            if self.fail_at_end {
                return Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "connection reset by peer",
                ));
            }
            return Ok(0);
        };
        let n = buf.len().min(chunk.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            self.chunks.push_front(chunk[n..].to_vec());
        }
        Ok(n)
    }
}

impl Drop for ChunkedBody {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub fn transport(backend: ScriptedBackend, clock: &Arc<FakeClock>) -> Transport {
    Transport::new(backend, clock.clone())
}

pub fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}
