use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

const DEFAULT_STEPS: [Duration; 3] = [
    Duration::from_millis(100),
    Duration::from_millis(200),
    Duration::from_millis(500),
];

/// Fixed, non-decreasing wait schedule. Indices past the end repeat the last step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    steps: Vec<Duration>,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            steps: DEFAULT_STEPS.to_vec(),
        }
    }
}

impl Backoff {
    pub fn new(steps: impl IntoIterator<Item = Duration>) -> Self {
        let mut floor = Duration::ZERO;
        let mut steps = steps
            .into_iter()
            .map(|step| {
                floor = floor.max(step);
                floor
            })
            .collect::<Vec<_>>();
        if steps.is_empty() {
            steps.push(Duration::ZERO);
        }
        Self { steps }
    }

    /// Wait before the retry with 0-based index `retry`.
    pub fn delay(&self, retry: u32) -> Duration {
        let idx = (retry as usize).min(self.steps.len() - 1);
        self.steps[idx]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total tries, the first one included.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: Backoff::default(),
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            backoff: Backoff::default(),
        }
    }

    /// Wait to apply after `failures` consecutive transient failures, or `None`
    /// once the attempt budget is spent.
    pub fn next_delay(&self, failures: u32) -> Option<Duration> {
        if failures == 0 || failures >= self.max_attempts {
            return None;
        }
        Some(self.backoff.delay(failures - 1))
    }
}
