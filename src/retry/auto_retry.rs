use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::retry::backoff::BackoffPolicy;
use crate::retry::scheduler::{LOCK_POISONED, Operation, OperationError, box_operation};

const INITIAL_DELAY: Duration = Duration::from_secs(1);
const DELAY_MULTIPLIER: f64 = 2.0;
const MAX_DELAY: Duration = Duration::from_secs(10 * 60);

#[derive(Default)]
struct Machine {
    epoch: u64,
    failed_attempts: u32,
    is_loading: bool,
    next_retry_at: Option<DateTime<Utc>>,
    retry_task: Option<JoinHandle<()>>,
}

impl Machine {
    fn cancel_pending(&mut self) {
        if let Some(task) = self.retry_task.take() {
            task.abort();
        }
    }
}

struct Inner {
    policy: BackoffPolicy,
    operation: Mutex<Operation>,
    machine: Mutex<Machine>,
}

/// Fire-and-keep-trying wrapper around a fallible async call.
///
/// Unlike [`crate::retry::RetryScheduler`] there is no attempt budget and no
/// manual-retry affordance: a failed call reschedules itself indefinitely
/// (1s initial delay, doubling, capped at ten minutes) until it succeeds or
/// [`AutoRetry::call`] is issued again, which cancels the pending retry and
/// restarts the sequence from attempt zero.
///
/// Must be driven from within a Tokio runtime. Dropping the wrapper cancels
/// any pending retry.
pub struct AutoRetry {
    inner: Arc<Inner>,
}

impl AutoRetry {
    #[must_use]
    pub fn new<F, Fut, E>(operation: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<OperationError>,
    {
        Self {
            inner: Arc::new(Inner {
                policy: BackoffPolicy::new(INITIAL_DELAY, MAX_DELAY, DELAY_MULTIPLIER),
                operation: Mutex::new(box_operation(operation)),
                machine: Mutex::new(Machine::default()),
            }),
        }
    }

    /// Invokes the wrapped call, superseding any pending retry.
    pub fn call(&self) {
        let mut machine = self.inner.machine.lock().expect(LOCK_POISONED);
        machine.cancel_pending();
        machine.epoch += 1;
        machine.failed_attempts = 0;
        Inner::begin_call(&self.inner, &mut machine);
    }

    /// Cancels any pending retry and forgets the backoff progression.
    pub fn stop(&self) {
        let mut machine = self.inner.machine.lock().expect(LOCK_POISONED);
        machine.cancel_pending();
        machine.epoch += 1;
        machine.failed_attempts = 0;
        machine.is_loading = false;
        machine.next_retry_at = None;
    }

    /// True while an invocation of the wrapped call is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.inner.machine.lock().expect(LOCK_POISONED).is_loading
    }

    /// Wall-clock instant of the pending automatic retry, if one is scheduled.
    #[must_use]
    pub fn next_retry_at(&self) -> Option<DateTime<Utc>> {
        self.inner.machine.lock().expect(LOCK_POISONED).next_retry_at
    }
}

impl Drop for AutoRetry {
    fn drop(&mut self) {
        if let Ok(mut machine) = self.inner.machine.lock() {
            machine.cancel_pending();
            machine.epoch += 1;
        }
    }
}

impl Inner {
    fn begin_call(inner: &Arc<Self>, machine: &mut Machine) {
        machine.is_loading = true;
        machine.next_retry_at = None;

        let epoch = machine.epoch;
        let future = (inner.operation.lock().expect(LOCK_POISONED))();
        let settled = Arc::clone(inner);
        tokio::spawn(async move {
            let result = future.await;
            settled.on_call_settled(epoch, result);
        });
    }

    fn on_call_settled(self: &Arc<Self>, epoch: u64, result: Result<(), OperationError>) {
        let mut machine = self.machine.lock().expect(LOCK_POISONED);
        if machine.epoch != epoch {
            return;
        }

        machine.is_loading = false;
        match result {
            Ok(()) => {
                debug!("call succeeded");
                machine.failed_attempts = 0;
                machine.next_retry_at = None;
            }
            Err(error) => {
                machine.failed_attempts += 1;
                let delay = self.policy.delay_for_attempt(machine.failed_attempts);
                machine.next_retry_at =
                    Some(Utc::now() + chrono::Duration::milliseconds(delay.as_millis() as i64));
                warn!(
                    error = %error,
                    failed_attempts = machine.failed_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "call failed, retry scheduled"
                );

                let retry = Arc::clone(self);
                machine.retry_task = Some(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    retry.on_retry_elapsed(epoch);
                }));
            }
        }
    }

    fn on_retry_elapsed(self: &Arc<Self>, epoch: u64) {
        let mut machine = self.machine.lock().expect(LOCK_POISONED);
        if machine.epoch != epoch {
            return;
        }
        machine.retry_task = None;
        Inner::begin_call(self, &mut machine);
    }
}
