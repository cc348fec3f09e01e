use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{TimelineError, TimelineResult};
use crate::retry::backoff::BackoffPolicy;

pub(crate) const LOCK_POISONED: &str = "retry machine lock poisoned";

pub type OperationError = Box<dyn std::error::Error + Send + Sync>;
pub(crate) type OperationFuture = Pin<Box<dyn Future<Output = Result<(), OperationError>> + Send>>;
pub(crate) type Operation = Box<dyn Fn() -> OperationFuture + Send + Sync>;

/// Erases the operation's future and error types into the stored callback slot.
pub(crate) fn box_operation<F, Fut, E>(operation: F) -> Operation
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<OperationError>,
{
    Box::new(move || {
        let future = operation();
        Box::pin(async move { future.await.map_err(Into::into) })
    })
}

/// Tuning controls for a [`RetryScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Poll period for the live countdown shown while a retry is pending.
    pub countdown_interval: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            countdown_interval: Duration::from_millis(100),
        }
    }
}

impl RetryConfig {
    fn validate(self) -> TimelineResult<Self> {
        if self.max_attempts == 0 {
            return Err(TimelineError::InvalidConfig(
                "max attempts must be >= 1".to_owned(),
            ));
        }

        if self.initial_delay.is_zero() || self.max_delay < self.initial_delay {
            return Err(TimelineError::InvalidConfig(
                "delays must be positive and max delay must be >= initial delay".to_owned(),
            ));
        }

        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(TimelineError::InvalidConfig(
                "multiplier must be finite and >= 1".to_owned(),
            ));
        }

        if self.countdown_interval.is_zero() {
            return Err(TimelineError::InvalidConfig(
                "countdown interval must be positive".to_owned(),
            ));
        }

        Ok(self)
    }

    fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(self.initial_delay, self.max_delay, self.multiplier)
    }
}

/// Snapshot of a scheduler's observable state.
///
/// `current_delay` and `time_until_next_retry` are set only while a retry is
/// pending; `attempt_count` sticks at the configured maximum once retries are
/// exhausted so callers can detect permanent failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RetryState {
    pub is_retrying: bool,
    pub current_delay: Option<Duration>,
    pub attempt_count: u32,
    pub time_until_next_retry: Option<Duration>,
}

#[derive(Default)]
struct Machine {
    /// Bumped on every start/stop/attempt transition. Spawned tasks carry the
    /// epoch they were born under and bail once it no longer matches.
    epoch: u64,
    state: RetryState,
    schedule_task: Option<JoinHandle<()>>,
    countdown_task: Option<JoinHandle<()>>,
}

impl Machine {
    fn cancel_timers(&mut self) {
        if let Some(task) = self.schedule_task.take() {
            task.abort();
        }
        if let Some(task) = self.countdown_task.take() {
            task.abort();
        }
    }
}

struct Inner {
    config: RetryConfig,
    policy: BackoffPolicy,
    operation: Mutex<Operation>,
    machine: Mutex<Machine>,
}

/// Wraps a fallible async operation with exponential backoff retries.
///
/// One scheduler instance owns one logical retry sequence: attempts are
/// strictly sequential, at most one schedule timer and one countdown task are
/// live at a time, and entering a new attempt always cancels whatever was
/// pending first. The wrapped operation's rejection reason is logged but never
/// classified; callers decide retryability at a higher layer.
///
/// All methods that start work must be called from within a Tokio runtime.
/// Dropping the scheduler behaves like [`RetryScheduler::stop_retrying`]:
/// pending timers are cancelled and an in-flight attempt's outcome is ignored
/// (the operation itself is not aborted mid-flight).
pub struct RetryScheduler {
    inner: Arc<Inner>,
}

impl RetryScheduler {
    pub fn new<F, Fut, E>(config: RetryConfig, operation: F) -> TimelineResult<Self>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<OperationError>,
    {
        let config = config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                policy: config.backoff(),
                operation: Mutex::new(box_operation(operation)),
                machine: Mutex::new(Machine::default()),
            }),
        })
    }

    /// Replaces the wrapped operation.
    ///
    /// The slot always holds the latest callback; the next attempt, scheduled
    /// or manual, invokes the replacement.
    pub fn set_operation<F, Fut, E>(&self, operation: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<OperationError>,
    {
        *self.inner.operation.lock().expect(LOCK_POISONED) = box_operation(operation);
    }

    /// Starts a fresh retry sequence with an immediate first attempt.
    ///
    /// Any sequence already in progress is superseded: pending timers are
    /// cancelled and the attempt count restarts from zero.
    pub fn start_retrying(&self) {
        let mut machine = self.inner.machine.lock().expect(LOCK_POISONED);
        machine.state.attempt_count = 0;
        Inner::begin_attempt(&self.inner, &mut machine);
    }

    /// Manually retries now instead of waiting out the scheduled delay.
    ///
    /// Only acts while a retry is pending; the pending timer and countdown are
    /// cancelled and the attempt still counts against `max_attempts`.
    pub fn retry(&self) {
        let mut machine = self.inner.machine.lock().expect(LOCK_POISONED);
        if machine.schedule_task.is_some() {
            Inner::begin_attempt(&self.inner, &mut machine);
        }
    }

    /// Cancels all pending timers and resets to idle, from any state.
    ///
    /// Terminal and idempotent: no further attempt is started and no further
    /// state update is observable after this returns.
    pub fn stop_retrying(&self) {
        let mut machine = self.inner.machine.lock().expect(LOCK_POISONED);
        machine.cancel_timers();
        machine.epoch += 1;
        machine.state = RetryState::default();
        debug!("retry sequence stopped");
    }

    #[must_use]
    pub fn state(&self) -> RetryState {
        self.inner.machine.lock().expect(LOCK_POISONED).state
    }

    #[must_use]
    pub fn is_retrying(&self) -> bool {
        self.state().is_retrying
    }

    #[must_use]
    pub fn current_delay(&self) -> Option<Duration> {
        self.state().current_delay
    }

    #[must_use]
    pub fn attempt_count(&self) -> u32 {
        self.state().attempt_count
    }

    #[must_use]
    pub fn time_until_next_retry(&self) -> Option<Duration> {
        self.state().time_until_next_retry
    }
}

impl Drop for RetryScheduler {
    fn drop(&mut self) {
        // stop_retrying, minus the poison expect: drop must not panic mid-unwind.
        if let Ok(mut machine) = self.inner.machine.lock() {
            machine.cancel_timers();
            machine.epoch += 1;
        }
    }
}

impl Inner {
    /// Transitions to Attempting: cancels pending timers, bumps the epoch, and
    /// invokes the wrapped operation exactly once.
    fn begin_attempt(inner: &Arc<Self>, machine: &mut Machine) {
        machine.cancel_timers();
        machine.epoch += 1;
        machine.state.attempt_count += 1;
        machine.state.is_retrying = true;
        machine.state.current_delay = None;
        machine.state.time_until_next_retry = None;

        let epoch = machine.epoch;
        debug!(attempt = machine.state.attempt_count, "starting attempt");

        let future = (inner.operation.lock().expect(LOCK_POISONED))();
        let settled = Arc::clone(inner);
        tokio::spawn(async move {
            let result = future.await;
            settled.on_attempt_settled(epoch, result);
        });
    }

    fn on_attempt_settled(self: &Arc<Self>, epoch: u64, result: Result<(), OperationError>) {
        let mut machine = self.machine.lock().expect(LOCK_POISONED);
        if machine.epoch != epoch {
            // Superseded or stopped while the attempt was in flight.
            return;
        }

        match result {
            Ok(()) => {
                debug!("operation succeeded");
                machine.state = RetryState::default();
            }
            Err(error) => {
                let attempt = machine.state.attempt_count;
                if attempt < self.config.max_attempts {
                    let delay = self.policy.delay_for_attempt(attempt);
                    warn!(
                        error = %error,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "attempt failed, retry scheduled"
                    );
                    self.schedule_retry(&mut machine, delay);
                } else {
                    warn!(error = %error, attempt, "attempt failed, retries exhausted");
                    machine.state.is_retrying = false;
                    machine.state.current_delay = None;
                    machine.state.time_until_next_retry = None;
                }
            }
        }
    }

    /// Transitions to Scheduled: one single-shot timer for the next attempt
    /// plus one countdown poller refreshing the remaining time.
    fn schedule_retry(self: &Arc<Self>, machine: &mut Machine, delay: Duration) {
        let deadline = Instant::now() + delay;
        machine.state.is_retrying = false;
        machine.state.current_delay = Some(delay);
        machine.state.time_until_next_retry = Some(delay);

        let epoch = machine.epoch;

        let timer = Arc::clone(self);
        machine.schedule_task = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            timer.on_schedule_elapsed(epoch);
        }));

        let poll_period = self.config.countdown_interval;
        let countdown = Arc::clone(self);
        machine.countdown_task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + poll_period, poll_period);
            loop {
                ticker.tick().await;
                let mut machine = countdown.machine.lock().expect(LOCK_POISONED);
                if machine.epoch != epoch {
                    return;
                }
                let remaining = deadline.saturating_duration_since(Instant::now());
                machine.state.time_until_next_retry = Some(remaining);
            }
        }));
    }

    fn on_schedule_elapsed(self: &Arc<Self>, epoch: u64) {
        let mut machine = self.machine.lock().expect(LOCK_POISONED);
        if machine.epoch != epoch {
            return;
        }
        Inner::begin_attempt(self, &mut machine);
    }
}
