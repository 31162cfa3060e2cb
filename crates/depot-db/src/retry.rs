//! # Retry Policy
//!
//! Bounded exponential backoff around a single unit of store work.
//!
//! ## Retry Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          RetryPolicy::execute                           │
//! │                                                                         │
//! │  attempt 1 ──► Ok ─────────────────────────────────────────► return Ok  │
//! │      │                                                                  │
//! │      └─► Err ──► transient AND enabled? ── no ─────────────► return Err │
//! │                        │ yes                                            │
//! │                        ▼                                                │
//! │               attempts left? ── no ──────────────► return last Err      │
//! │                        │ yes                                            │
//! │                        ▼                                                │
//! │        sleep(initial × multiplier^i, capped at max_delay)               │
//! │                        │        ▲                                       │
//! │                        │        └── CancelSignal fired ─► Cancelled     │
//! │                        ▼                                                │
//! │                   attempt i+1 ...                                       │
//! │                                                                         │
//! │  max_retries = 3, initial = 500ms, multiplier = 2.0                     │
//! │  → 4 attempts, waits of 500ms, 1000ms, 2000ms                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only failures classified `Timeout` or `ConnectionFailure` are retried, and
//! only when the matching flag in [`RetryConfig`] is on. Everything else
//! surfaces on first occurrence.

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use depot_core::ErrorCode;
use tokio::sync::watch;
use tracing::{debug, error, warn};

use crate::error::{DbError, DbResult};

// =============================================================================
// Configuration
// =============================================================================

/// Retry settings.
///
/// ## Example
/// ```rust
/// use std::time::Duration;
/// use depot_db::retry::RetryConfig;
///
/// let config = RetryConfig::default()
///     .max_retries(5)
///     .initial_delay(Duration::from_millis(100))
///     .retry_on_timeout(false);
/// assert_eq!(config.max_retries, 5);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt. `0` disables retrying.
    /// Default: 3
    pub max_retries: u32,

    /// Wait before the second attempt.
    /// Default: 500ms
    pub initial_delay: Duration,

    /// Growth factor applied to the wait after each retry.
    /// Default: 2.0
    pub backoff_multiplier: f64,

    /// Upper bound for a single wait.
    /// Default: 30 seconds
    pub max_delay: Duration,

    /// Retry failures classified `Timeout`.
    /// Default: true
    pub retry_on_timeout: bool,

    /// Retry failures classified `ConnectionFailure`.
    /// Default: true
    pub retry_on_connection_failure: bool,

    /// Deadline for one attempt. Expiry counts as a `Timeout` failure.
    /// Default: none
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            retry_on_timeout: true,
            retry_on_connection_failure: true,
            attempt_timeout: None,
        }
    }
}

impl RetryConfig {
    /// A config that never retries.
    pub fn none() -> Self {
        RetryConfig {
            max_retries: 0,
            ..Default::default()
        }
    }

    pub fn max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn retry_on_timeout(mut self, enabled: bool) -> Self {
        self.retry_on_timeout = enabled;
        self
    }

    pub fn retry_on_connection_failure(mut self, enabled: bool) -> Self {
        self.retry_on_connection_failure = enabled;
        self
    }

    pub fn attempt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.attempt_timeout = timeout;
        self
    }
}

// =============================================================================
// Cancellation
// =============================================================================

/// Creates a linked cancel handle and signal.
///
/// ## Usage
/// ```rust,ignore
/// let (canceller, signal) = cancel_pair();
/// let executor = catalog.executor().cancellable(signal);
///
/// // Elsewhere: abandon whatever `executor` is retrying
/// canceller.cancel();
/// ```
pub fn cancel_pair() -> (Canceller, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (Canceller { tx }, CancelSignal { rx })
}

/// Fires the paired [`CancelSignal`]s.
#[derive(Debug)]
pub struct Canceller {
    tx: watch::Sender<bool>,
}

impl Canceller {
    /// Cancels every operation watching this handle's signals.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Creates another signal bound to this handle.
    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
        }
    }
}

/// Observes cancellation requested through a [`Canceller`].
///
/// Dropping the canceller without calling `cancel` never fires the signal.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // Canceller gone without cancelling
                std::future::pending::<()>().await;
            }
        }
    }
}

// =============================================================================
// Retry Policy
// =============================================================================

/// Wraps store work with bounded exponential backoff.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        RetryPolicy { config }
    }

    /// A policy that runs every operation exactly once.
    pub fn no_retry() -> Self {
        RetryPolicy::new(RetryConfig::none())
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Whether `err` qualifies for another attempt under this policy.
    pub fn should_retry(&self, err: &DbError) -> bool {
        match err.error_code() {
            ErrorCode::Timeout => self.config.retry_on_timeout,
            ErrorCode::ConnectionFailure => self.config.retry_on_connection_failure,
            _ => false,
        }
    }

    /// Runs `op` until it succeeds, fails fatally, or attempts run out.
    pub async fn execute<T, F, Fut>(&self, label: &str, op: F) -> DbResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = DbResult<T>>,
    {
        self.execute_cancellable(label, op, None).await
    }

    /// Like [`RetryPolicy::execute`], but `signal` aborts both an in-flight
    /// attempt and a pending backoff sleep with [`DbError::Cancelled`].
    pub async fn execute_cancellable<T, F, Fut>(
        &self,
        label: &str,
        mut op: F,
        signal: Option<&CancelSignal>,
    ) -> DbResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = DbResult<T>>,
    {
        let mut backoff = self.create_backoff();
        let max_attempts = self.config.max_retries.saturating_add(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            if signal.is_some_and(CancelSignal::is_cancelled) {
                debug!(op = label, attempt, "Cancelled before attempt");
                return Err(DbError::Cancelled);
            }

            let result = match signal {
                Some(signal) => {
                    tokio::select! {
                        result = self.attempt(&mut op) => result,
                        _ = signal.cancelled() => Err(DbError::Cancelled),
                    }
                }
                None => self.attempt(&mut op).await,
            };

            let err = match result {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(op = label, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !self.should_retry(&err) {
                return Err(err);
            }

            if attempt >= max_attempts {
                error!(
                    op = label,
                    attempts = attempt,
                    code = %err.error_code(),
                    error = %err,
                    "Retries exhausted"
                );
                return Err(err);
            }

            let delay = backoff.next_backoff().unwrap_or(self.config.max_delay);

            warn!(
                op = label,
                attempt,
                ?delay,
                code = %err.error_code(),
                "Transient failure, retrying"
            );

            match signal {
                Some(signal) => {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = signal.cancelled() => {
                            debug!(op = label, attempt, "Cancelled during backoff");
                            return Err(DbError::Cancelled);
                        }
                    }
                }
                None => tokio::time::sleep(delay).await,
            }
        }
    }

    /// One attempt, bounded by `attempt_timeout` when configured.
    async fn attempt<T, F, Fut>(&self, op: &mut F) -> DbResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = DbResult<T>>,
    {
        match self.config.attempt_timeout {
            Some(limit) => match tokio::time::timeout(limit, op()).await {
                Ok(result) => result,
                Err(_) => Err(DbError::Timeout(limit)),
            },
            None => op().await,
        }
    }

    /// Creates the exponential backoff schedule.
    ///
    /// No jitter: the n-th wait is exactly `initial × multiplier^n`.
    fn create_backoff(&self) -> ExponentialBackoff {
        let mut backoff = ExponentialBackoff {
            initial_interval: self.config.initial_delay,
            current_interval: self.config.initial_delay,
            randomization_factor: 0.0,
            multiplier: self.config.backoff_multiplier,
            max_interval: self.config.max_delay,
            max_elapsed_time: None,
            ..Default::default()
        };
        backoff.reset();
        backoff
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
