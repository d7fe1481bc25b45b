use std::time::Duration;

use http::StatusCode;

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Statuses that are retried when the accept policy rejects them.
pub const RETRY_WORTHY_STATUSES: [StatusCode; 2] = [
    StatusCode::INTERNAL_SERVER_ERROR,
    StatusCode::SERVICE_UNAVAILABLE,
];

/// Extra attempts after the first, separated by a fixed delay.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    count: usize,
    delay: Duration,
}

impl RetryPolicy {
    pub const fn disabled() -> Self {
        Self {
            count: 0,
            delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub const fn new(count: usize, delay: Duration) -> Self {
        Self { count, delay }
    }

    pub const fn count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    pub const fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub const fn retry_count(&self) -> usize {
        self.count
    }

    pub const fn retry_delay(&self) -> Duration {
        self.delay
    }

    pub const fn max_attempts(&self) -> usize {
        self.count.saturating_add(1)
    }

    pub fn is_retry_worthy_status(status: StatusCode) -> bool {
        RETRY_WORTHY_STATUSES.contains(&status)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::disabled()
    }
}
