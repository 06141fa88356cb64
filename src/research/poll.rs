use std::time::Duration;

use tracing::debug;

use super::{ResearchApi, ResearchModel, Task};
use crate::clock::Clock;
use crate::error::{ExaError, Result};

pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    pub interval: Duration,
    pub timeout: Duration,
    pub include_events: bool,
}

impl PollOptions {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            include_events: false,
        }
    }

    pub fn for_model(model: ResearchModel) -> Self {
        Self::new(model.poll_interval(), DEFAULT_POLL_TIMEOUT)
    }

    pub fn with_events(mut self, include_events: bool) -> Self {
        self.include_events = include_events;
        self
    }
}

impl Default for PollOptions {
    fn default() -> Self {
        Self::for_model(ResearchModel::default())
    }
}

/// Re-fetches `id` until its status is terminal.
///
/// The deadline is checked after every non-terminal poll; on expiry the last
/// task seen is dropped and `Timeout` is returned, so a non-terminal task is
/// never handed back as a result. Fatal errors from `get` end the wait at once.
pub fn wait_until_finished<A>(
    api: &A,
    clock: &dyn Clock,
    id: &str,
    options: PollOptions,
) -> Result<Task>
where
    A: ResearchApi + ?Sized,
{
    if options.interval.is_zero() {
        return Err(ExaError::InvalidRequest(
            "poll interval must be positive".to_owned(),
        ));
    }

    let started_at = clock.now();
    // Timeouts too large to represent never expire.
    let deadline = started_at.checked_add(options.timeout);
    let mut polls = 0u32;

    loop {
        polls += 1;
        let task = api.get(id, options.include_events)?;
        debug!(id, polls, status = %task.status, "polled task");
        if task.status.is_terminal() {
            return Ok(task);
        }

        let now = clock.now();
        if deadline.is_some_and(|deadline| now >= deadline) {
            return Err(ExaError::Timeout {
                id: id.to_owned(),
                waited: now.duration_since(started_at),
            });
        }

        clock.sleep(options.interval);
    }
}
