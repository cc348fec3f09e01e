use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use timeline_rs::{RetryConfig, RetryScheduler, RetryState};

fn test_config() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1_000),
        max_delay: Duration::from_millis(8_000),
        multiplier: 2.0,
        countdown_interval: Duration::from_millis(100),
    }
}

/// Builds a scheduler whose operation counts invocations and fails until the
/// `succeed_on`-th call (never succeeds when `None`).
fn counting_scheduler(
    config: RetryConfig,
    succeed_on: Option<u32>,
) -> (RetryScheduler, Arc<AtomicU32>) {
    let calls = Arc::new(AtomicU32::new(0));
    let op_calls = Arc::clone(&calls);
    let scheduler = RetryScheduler::new(config, move || {
        let calls = Arc::clone(&op_calls);
        async move {
            let nth = calls.fetch_add(1, Ordering::SeqCst) + 1;
            match succeed_on {
                Some(target) if nth >= target => Ok(()),
                _ => Err(std::io::Error::other("upstream unavailable")),
            }
        }
    })
    .expect("valid config");
    (scheduler, calls)
}

/// Lets spawned attempt/settle tasks run without advancing the paused clock.
async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

async fn advance(millis: u64) {
    tokio::time::advance(Duration::from_millis(millis)).await;
    settle().await;
}

#[tokio::test(start_paused = true)]
async fn first_attempt_fires_immediately() {
    let (scheduler, calls) = counting_scheduler(test_config(), None);

    scheduler.start_retrying();
    settle().await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(scheduler.attempt_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn backoff_delays_double_and_cap() {
    let config = RetryConfig {
        max_attempts: 6,
        ..test_config()
    };
    let (scheduler, _calls) = counting_scheduler(config, None);

    scheduler.start_retrying();
    settle().await;
    assert_eq!(scheduler.current_delay(), Some(Duration::from_millis(1_000)));

    advance(1_000).await;
    assert_eq!(scheduler.current_delay(), Some(Duration::from_millis(2_000)));

    advance(2_000).await;
    assert_eq!(scheduler.current_delay(), Some(Duration::from_millis(4_000)));

    advance(4_000).await;
    assert_eq!(scheduler.current_delay(), Some(Duration::from_millis(8_000)));

    advance(8_000).await;
    assert_eq!(scheduler.current_delay(), Some(Duration::from_millis(8_000)));
}

#[tokio::test(start_paused = true)]
async fn attempts_stop_after_max_and_state_reports_exhaustion() {
    let (scheduler, calls) = counting_scheduler(test_config(), None);

    scheduler.start_retrying();
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    advance(1_000).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    advance(2_000).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let state = scheduler.state();
    assert_eq!(state.attempt_count, 3);
    assert!(!state.is_retrying);
    assert_eq!(state.current_delay, None);
    assert_eq!(state.time_until_next_retry, None);

    // No further timer is pending.
    advance(60_000).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn success_resets_to_idle() {
    let (scheduler, calls) = counting_scheduler(test_config(), Some(1));

    scheduler.start_retrying();
    settle().await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(scheduler.state(), RetryState::default());
}

#[tokio::test(start_paused = true)]
async fn success_after_failures_resets_attempt_count() {
    let (scheduler, calls) = counting_scheduler(test_config(), Some(2));

    scheduler.start_retrying();
    settle().await;
    advance(1_000).await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(scheduler.state(), RetryState::default());
}

#[tokio::test(start_paused = true)]
async fn manual_retry_preempts_the_scheduled_timer() {
    let (scheduler, calls) = counting_scheduler(test_config(), None);

    scheduler.start_retrying();
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    scheduler.retry();
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(scheduler.attempt_count(), 2);

    // The original 1s timer must not fire a duplicate attempt; the next
    // attempt arrives only after the new 2s backoff elapses.
    advance(1_000).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    advance(1_000).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn manual_retry_is_a_noop_unless_scheduled() {
    let (scheduler, calls) = counting_scheduler(test_config(), None);

    scheduler.retry();
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(scheduler.state(), RetryState::default());
}

#[tokio::test(start_paused = true)]
async fn stop_retrying_is_terminal_and_idempotent() {
    let (scheduler, calls) = counting_scheduler(test_config(), None);

    scheduler.start_retrying();
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    scheduler.stop_retrying();
    assert_eq!(scheduler.state(), RetryState::default());

    advance(600_000).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    scheduler.stop_retrying();
    assert_eq!(scheduler.state(), RetryState::default());
}

#[tokio::test(start_paused = true)]
async fn countdown_tracks_remaining_delay() {
    let (scheduler, _calls) = counting_scheduler(test_config(), None);

    scheduler.start_retrying();
    settle().await;
    assert_eq!(
        scheduler.time_until_next_retry(),
        Some(Duration::from_millis(1_000))
    );

    advance(100).await;
    assert_eq!(
        scheduler.time_until_next_retry(),
        Some(Duration::from_millis(900))
    );

    advance(500).await;
    assert_eq!(
        scheduler.time_until_next_retry(),
        Some(Duration::from_millis(400))
    );
}

#[tokio::test(start_paused = true)]
async fn stop_ignores_a_still_resolving_attempt() {
    let calls = Arc::new(AtomicU32::new(0));
    let op_calls = Arc::clone(&calls);
    let scheduler = RetryScheduler::new(test_config(), move || {
        let calls = Arc::clone(&op_calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<(), std::io::Error>(())
        }
    })
    .expect("valid config");

    scheduler.start_retrying();
    settle().await;
    assert!(scheduler.is_retrying());

    scheduler.stop_retrying();
    assert_eq!(scheduler.state(), RetryState::default());

    // The in-flight future completes later; its outcome must not resurface.
    advance(5_000).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(scheduler.state(), RetryState::default());
}

#[tokio::test(start_paused = true)]
async fn replacing_the_operation_affects_the_next_attempt() {
    let (scheduler, original_calls) = counting_scheduler(test_config(), None);
    let replacement_calls = Arc::new(AtomicU32::new(0));

    scheduler.start_retrying();
    settle().await;
    assert_eq!(original_calls.load(Ordering::SeqCst), 1);

    let op_calls = Arc::clone(&replacement_calls);
    scheduler.set_operation(move || {
        let calls = Arc::clone(&op_calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<(), std::io::Error>(())
        }
    });

    advance(1_000).await;
    assert_eq!(original_calls.load(Ordering::SeqCst), 1);
    assert_eq!(replacement_calls.load(Ordering::SeqCst), 1);
    assert_eq!(scheduler.state(), RetryState::default());
}

#[tokio::test(start_paused = true)]
async fn start_retrying_supersedes_a_previous_sequence() {
    let (scheduler, calls) = counting_scheduler(test_config(), None);

    scheduler.start_retrying();
    settle().await;
    advance(1_000).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(scheduler.attempt_count(), 2);

    scheduler.start_retrying();
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(scheduler.attempt_count(), 1);
}

#[test]
fn invalid_configs_are_rejected() {
    let no_attempts = RetryConfig {
        max_attempts: 0,
        ..RetryConfig::default()
    };
    assert!(RetryScheduler::new(no_attempts, || async { Ok::<(), std::io::Error>(()) }).is_err());

    let shrinking_multiplier = RetryConfig {
        multiplier: 0.5,
        ..RetryConfig::default()
    };
    assert!(
        RetryScheduler::new(shrinking_multiplier, || async {
            Ok::<(), std::io::Error>(())
        })
        .is_err()
    );

    let inverted_delays = RetryConfig {
        initial_delay: Duration::from_secs(10),
        max_delay: Duration::from_secs(1),
        ..RetryConfig::default()
    };
    assert!(
        RetryScheduler::new(inverted_delays, || async { Ok::<(), std::io::Error>(()) }).is_err()
    );
}
