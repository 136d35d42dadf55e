use std::{io, time::Duration};

use backoff::{
    backoff::{Backoff, Stop},
    ExponentialBackoffBuilder,
};

/// Decides which driver failures are worth another attempt and how long to
/// wait between attempts.
pub trait RetryPolicy: Send + Sync {
    fn is_transient(&self, error: &sqlx::Error) -> bool;

    /// A fresh schedule for one call. `None` from `next_backoff` ends retrying.
    fn backoff(&self) -> Box<dyn Backoff + Send>;
}

/// Every failure is final.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn is_transient(&self, _error: &sqlx::Error) -> bool {
        false
    }

    fn backoff(&self) -> Box<dyn Backoff + Send> {
        Box::new(Stop {})
    }
}

/// Retries connection level failures with exponential backoff.
#[derive(Debug, Clone)]
pub struct ExponentialRetry {
    initial_interval: Duration,
    max_interval: Duration,
    max_elapsed_time: Duration,
}

impl Default for ExponentialRetry {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(50),
            max_interval: Duration::from_secs(2),
            max_elapsed_time: Duration::from_secs(10),
        }
    }
}

impl ExponentialRetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initial_interval(mut self, value: Duration) -> Self {
        self.initial_interval = value;
        self
    }

    pub fn max_interval(mut self, value: Duration) -> Self {
        self.max_interval = value;
        self
    }

    pub fn max_elapsed_time(mut self, value: Duration) -> Self {
        self.max_elapsed_time = value;
        self
    }
}

impl RetryPolicy for ExponentialRetry {
    fn is_transient(&self, error: &sqlx::Error) -> bool {
        is_transient_error(error)
    }

    fn backoff(&self) -> Box<dyn Backoff + Send> {
        Box::new(
            ExponentialBackoffBuilder::new()
                .with_initial_interval(self.initial_interval)
                .with_max_interval(self.max_interval)
                .with_max_elapsed_time(Some(self.max_elapsed_time))
                .build(),
        )
    }
}

/// Retries transient failures a fixed number of times with a constant delay.
#[derive(Debug, Clone)]
pub struct FixedRetry {
    attempts: usize,
    delay: Duration,
}

impl FixedRetry {
    pub fn new(attempts: usize, delay: Duration) -> Self {
        Self { attempts, delay }
    }
}

impl RetryPolicy for FixedRetry {
    fn is_transient(&self, error: &sqlx::Error) -> bool {
        is_transient_error(error)
    }

    fn backoff(&self) -> Box<dyn Backoff + Send> {
        Box::new(Attempts {
            remaining: self.attempts,
            total: self.attempts,
            delay: self.delay,
        })
    }
}

struct Attempts {
    remaining: usize,
    total: usize,
    delay: Duration,
}

impl Backoff for Attempts {
    fn reset(&mut self) {
        self.remaining = self.total;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }

        self.remaining -= 1;

        Some(self.delay)
    }
}

/// Broken or refused connections and pool timeouts.
pub fn is_transient_error(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Io(error) => matches!(
            error.kind(),
            io::ErrorKind::ConnectionRefused
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::TimedOut
                | io::ErrorKind::UnexpectedEof
        ),
        sqlx::Error::PoolTimedOut => true,
        _ => false,
    }
}
