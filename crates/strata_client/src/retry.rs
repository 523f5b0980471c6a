//! Exponential backoff policy shared by the dispatcher and the
//! transaction driver.

use std::time::Duration;

/// Process-wide retry configuration. Treated as immutable after start;
/// handles clone it at construction.
#[derive(Clone, Debug)]
pub struct RetryOptions {
    /// Debug tag carried into retry log lines.
    pub tag: String,
    /// First backoff interval.
    pub backoff: Duration,
    /// Upper bound on any single backoff interval.
    pub max_backoff: Duration,
    /// Multiplier applied after each retry.
    pub constant: u32,
    /// Total attempts allowed; 0 retries indefinitely.
    pub max_attempts: usize,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            tag: String::new(),
            backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(5),
            constant: 2,
            max_attempts: 0,
        }
    }
}

impl RetryOptions {
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }
}

/// Backoff state for one retry loop.
///
/// `next_delay` is consulted after each failed attempt; `reset` restores
/// the initial interval when the failure class calls for an immediate
/// restart rather than escalating waits.
#[derive(Clone, Debug)]
pub struct Backoff {
    opts: RetryOptions,
    current: Duration,
    attempts: usize,
}

impl Backoff {
    pub fn new(opts: &RetryOptions) -> Self {
        Self {
            opts: opts.clone(),
            current: opts.backoff,
            attempts: 0,
        }
    }

    /// The delay to sleep before the next attempt, or `None` once the
    /// attempt budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.attempts += 1;
        if self.opts.max_attempts > 0 && self.attempts >= self.opts.max_attempts {
            return None;
        }
        let delay = self.current;
        self.current = (self.current * self.opts.constant).min(self.opts.max_backoff);
        Some(delay)
    }

    /// Restore the initial interval and attempt budget.
    pub fn reset(&mut self) {
        self.current = self.opts.backoff;
        self.attempts = 0;
    }
}
