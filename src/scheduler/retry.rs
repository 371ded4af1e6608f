//! Delivery with bounded retries and exponential backoff.

use std::time::Duration;

use tokio::sync::{RwLock, mpsc};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use super::{DeliveryPhase, SchedulerMessage, SchedulerState};
use crate::config::ScheduleConfig;
use crate::telegram::{DeliveryError, MessageSender};

/// How hard to try delivering one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub send_timeout: Duration,
}

impl RetryPolicy {
    /// Wait before retry number `retry` (1-based): `base * 2^(retry - 1)`.
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

impl From<&ScheduleConfig> for RetryPolicy {
    fn from(schedule: &ScheduleConfig) -> Self {
        Self {
            max_attempts: schedule.retry_attempts,
            base_delay: schedule.retry_base_delay,
            send_timeout: schedule.send_timeout,
        }
    }
}

/// Final result of a delivery cycle.
#[derive(Debug, Clone)]
pub enum DeliveryOutcome {
    Delivered,
    /// Every attempt failed with a transient error.
    Exhausted(DeliveryError),
    /// A permanent error stopped the cycle.
    Rejected(DeliveryError),
    /// Shutdown arrived while waiting to retry.
    Abandoned,
}

/// What happened during [`deliver_with_retry`].
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    pub outcome: DeliveryOutcome,
    pub attempts: u32,
    /// Backoff waits in the order they were taken.
    pub waits: Vec<Duration>,
}

enum WaitResult {
    Elapsed,
    Shutdown,
}

/// Sends `text`, retrying transient failures according to `policy`.
///
/// An attempt in flight always completes. Shutdown requests are only
/// honoured between attempts, which abandons the remaining retries.
pub async fn deliver_with_retry<S: MessageSender>(
    sender: &S,
    chat_id: i64,
    text: &str,
    policy: &RetryPolicy,
    state: &RwLock<SchedulerState>,
    rx: &mut mpsc::Receiver<SchedulerMessage>,
) -> DeliveryReport {
    let mut waits = Vec::new();
    let mut attempt = 0;

    loop {
        attempt += 1;
        state.write().await.phase = DeliveryPhase::Sending { attempt };

        let result = match timeout(policy.send_timeout, sender.send_text(chat_id, text)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout(policy.send_timeout)),
        };

        let err = match result {
            Ok(()) => {
                info!("Delivered daily message to chat {} (attempt {})", chat_id, attempt);
                return DeliveryReport {
                    outcome: DeliveryOutcome::Delivered,
                    attempts: attempt,
                    waits,
                };
            }
            Err(e) => e,
        };

        if !err.is_transient() {
            error!("Delivery to chat {} rejected: {}", chat_id, err);
            return DeliveryReport {
                outcome: DeliveryOutcome::Rejected(err),
                attempts: attempt,
                waits,
            };
        }

        if attempt >= policy.max_attempts {
            error!(
                "Giving up on chat {} after {} attempts: {}",
                chat_id, attempt, err
            );
            return DeliveryReport {
                outcome: DeliveryOutcome::Exhausted(err),
                attempts: attempt,
                waits,
            };
        }

        let mut delay = policy.delay_for(attempt);
        if let DeliveryError::RetryAfter(requested) = &err {
            delay = delay.max(*requested);
        }
        warn!(
            "Attempt {} for chat {} failed: {}; retrying in {:?}",
            attempt, chat_id, err, delay
        );

        waits.push(delay);
        state.write().await.phase = DeliveryPhase::RetryWait { attempt, delay };

        if let WaitResult::Shutdown = wait_or_shutdown(delay, rx).await {
            info!("Shutdown requested, abandoning pending retries");
            return DeliveryReport {
                outcome: DeliveryOutcome::Abandoned,
                attempts: attempt,
                waits,
            };
        }
    }
}

async fn wait_or_shutdown(delay: Duration, rx: &mut mpsc::Receiver<SchedulerMessage>) -> WaitResult {
    let deadline = sleep(delay);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            () = &mut deadline => return WaitResult::Elapsed,
            msg = rx.recv() => match msg {
                Some(SchedulerMessage::DeliverNow) => {
                    debug!("Delivery already in progress, ignoring trigger");
                }
                Some(SchedulerMessage::Shutdown) | None => return WaitResult::Shutdown,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// Replays a fixed list of results, then succeeds.
    struct ScriptedSender {
        script: Mutex<VecDeque<Result<(), DeliveryError>>>,
        calls: Mutex<u32>,
        latency: Duration,
    }

    impl ScriptedSender {
        fn new(script: Vec<Result<(), DeliveryError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(0),
                latency: Duration::ZERO,
            }
        }

        fn failing(n: usize) -> Self {
            Self::new(vec![Err(DeliveryError::Transient("connection reset".into())); n])
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    impl MessageSender for ScriptedSender {
        async fn send_text(&self, _chat_id: i64, _text: &str) -> Result<(), DeliveryError> {
            *self.calls.lock().unwrap() += 1;
            if !self.latency.is_zero() {
                sleep(self.latency).await;
            }
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or(Ok(()))
        }
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_secs(2),
            send_timeout: Duration::from_secs(10),
        }
    }

    async fn run(
        sender: &ScriptedSender,
        policy: &RetryPolicy,
    ) -> (DeliveryReport, mpsc::Sender<SchedulerMessage>) {
        let (tx, mut rx) = mpsc::channel(4);
        let state = RwLock::new(SchedulerState::new());
        let report = deliver_with_retry(sender, 1, "hello", policy, &state, &mut rx).await;
        (report, tx)
    }

    fn assert_strictly_increasing(waits: &[Duration]) {
        assert!(waits.windows(2).all(|w| w[0] < w[1]), "{waits:?}");
    }

    #[test]
    fn test_delay_doubles() {
        let policy = policy(5);
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_succeeds() {
        let sender = ScriptedSender::new(vec![]);
        let (report, _tx) = run(&sender, &policy(3)).await;

        assert!(matches!(report.outcome, DeliveryOutcome::Delivered));
        assert_eq!(report.attempts, 1);
        assert!(report.waits.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_fewer_failures_than_max() {
        for failures in 1..4 {
            let sender = ScriptedSender::failing(failures);
            let (report, _tx) = run(&sender, &policy(4)).await;

            assert!(matches!(report.outcome, DeliveryOutcome::Delivered));
            assert_eq!(report.attempts as usize, failures + 1);
            assert_eq!(sender.calls() as usize, failures + 1);
            assert_eq!(report.waits.len(), failures);
            assert_strictly_increasing(&report.waits);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_at_max_attempts() {
        let sender = ScriptedSender::failing(10);
        let started = tokio::time::Instant::now();
        let (report, _tx) = run(&sender, &policy(3)).await;

        assert!(matches!(report.outcome, DeliveryOutcome::Exhausted(_)));
        assert_eq!(report.attempts, 3);
        assert_eq!(sender.calls(), 3);
        assert_eq!(report.waits, vec![Duration::from_secs(2), Duration::from_secs(4)]);
        assert!(started.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_is_not_retried() {
        let sender = ScriptedSender::new(vec![Err(DeliveryError::Permanent("chat not found".into()))]);
        let (report, _tx) = run(&sender, &policy(5)).await;

        assert!(matches!(report.outcome, DeliveryOutcome::Rejected(_)));
        assert_eq!(sender.calls(), 1);
        assert!(report.waits.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_raises_wait() {
        let sender = ScriptedSender::new(vec![Err(DeliveryError::RetryAfter(Duration::from_secs(30)))]);
        let (report, _tx) = run(&sender, &policy(3)).await;

        assert!(matches!(report.outcome, DeliveryOutcome::Delivered));
        assert_eq!(report.waits, vec![Duration::from_secs(30)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_send_times_out_and_counts_as_transient() {
        let mut sender = ScriptedSender::new(vec![]);
        sender.latency = Duration::from_secs(60);
        let (report, _tx) = run(&sender, &policy(2)).await;

        assert!(matches!(
            report.outcome,
            DeliveryOutcome::Exhausted(DeliveryError::Timeout(_))
        ));
        assert_eq!(report.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_abandons_pending_retries() {
        let sender = ScriptedSender::failing(5);
        let (tx, mut rx) = mpsc::channel(4);
        tx.send(SchedulerMessage::Shutdown).await.unwrap();
        let state = RwLock::new(SchedulerState::new());

        let report = deliver_with_retry(&sender, 1, "hello", &policy(5), &state, &mut rx).await;

        assert!(matches!(report.outcome, DeliveryOutcome::Abandoned));
        assert_eq!(report.attempts, 1);
        assert_eq!(sender.calls(), 1);
        assert!(matches!(
            state.read().await.phase,
            DeliveryPhase::RetryWait { attempt: 1, .. }
        ));
    }
}
