//! Daily delivery loop.
//!
//! The loop follows a simple state machine:
//! 1. Compute the next slot strictly after now and wait for it
//! 2. Sleep in steps no longer than the check interval, so clock jumps and
//!    shutdown requests are noticed promptly
//! 3. When the slot is reached, pick a message, compose it and deliver it
//!    with retries
//! 4. On success persist the rotation marker, then go back to 1
//!
//! A failed cycle never touches the rotation marker, so the same message is
//! picked again next time.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::clock::format_local;
use super::compose::compose_daily_text;
use super::retry::{DeliveryOutcome, RetryPolicy, deliver_with_retry};
use super::DeliveryPhase;
use crate::context::AppContext;
use crate::store::{SentEntry, StoreError};
use crate::telegram::{DeliveryError, MessageSender, truncate_for_log};

/// Messages that can be sent to the scheduler.
#[derive(Debug, Clone)]
pub enum SchedulerMessage {
    /// Run a delivery cycle right away.
    DeliverNow,
    /// Stop the scheduler.
    Shutdown,
}

/// How a single delivery cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Delivered { message_id: u64 },
    /// Nothing to send.
    Skipped,
    Failed,
    /// Shutdown was requested mid-cycle.
    Stopped,
}

/// Daily message scheduler.
pub struct DailyScheduler<S> {
    sender: Arc<S>,
    ctx: AppContext,
    policy: RetryPolicy,
}

impl<S: MessageSender> DailyScheduler<S> {
    #[must_use]
    pub fn new(sender: Arc<S>, ctx: AppContext) -> Self {
        let policy = RetryPolicy::from(&ctx.settings.schedule);
        Self { sender, ctx, policy }
    }

    /// Tells the configured chat that the bot is up and when the next
    /// message goes out. A single attempt, bounded by the send timeout.
    pub async fn announce_start(&self) -> Result<(), DeliveryError> {
        let chat_id = self.ctx.settings.telegram.chat_id;
        let now = Utc::now();
        let language = self.ctx.language_for(chat_id).await;
        let next = format_local(self.ctx.next_fire(now), self.ctx.settings.schedule.timezone);
        let text = self.ctx.texts.render("startup.notice", language, &[("time", &next)]);

        tokio::time::timeout(self.policy.send_timeout, self.sender.send_text(chat_id, &text))
            .await
            .map_err(|_| DeliveryError::Timeout(self.policy.send_timeout))??;

        self.record_sent(SentEntry::new(now, chat_id, None, &text)).await;
        info!("Startup notice sent to chat {}", chat_id);
        Ok(())
    }

    /// Runs until a shutdown message arrives or the channel closes.
    pub async fn run(&self, mut rx: mpsc::Receiver<SchedulerMessage>) {
        let schedule = &self.ctx.settings.schedule;
        info!(
            "Daily scheduler started ({} {}, {:?} selection)",
            schedule.time.format("%H:%M"),
            schedule.timezone,
            schedule.selection
        );

        let mut next_fire = self.wait_for_next_slot().await;

        loop {
            let now = Utc::now();
            if now >= next_fire {
                if self.run_cycle(&mut rx).await == CycleOutcome::Stopped {
                    break;
                }
                next_fire = self.wait_for_next_slot().await;
                continue;
            }

            let remaining = (next_fire - now).to_std().unwrap_or_default();
            let step = remaining.min(schedule.check_interval);

            tokio::select! {
                () = sleep(step) => {}
                msg = rx.recv() => {
                    match msg {
                        Some(SchedulerMessage::DeliverNow) => {
                            debug!("Received immediate delivery request");
                            if self.run_cycle(&mut rx).await == CycleOutcome::Stopped {
                                break;
                            }
                            self.ctx.scheduler.write().await.phase =
                                DeliveryPhase::Waiting { until: next_fire };
                        }
                        Some(SchedulerMessage::Shutdown) | None => break,
                    }
                }
            }
        }

        self.ctx.scheduler.write().await.phase = DeliveryPhase::Stopped;
        info!("Scheduler shutting down");
    }

    /// Performs one delivery: select, compose, send, record.
    pub async fn run_cycle(&self, rx: &mut mpsc::Receiver<SchedulerMessage>) -> CycleOutcome {
        let settings = &self.ctx.settings;
        let chat_id = settings.telegram.chat_id;
        let last_sent = self.ctx.scheduler.read().await.last_sent_id;

        let (message_id, body) = {
            let mut store = self.ctx.messages.write().await;
            if let Err(e) = store.reload() {
                warn!("Failed to reload messages, using cached copy: {}", e);
            }
            match store.select_next(settings.schedule.selection, last_sent) {
                Ok(message) => (message.id, message.text.clone()),
                Err(StoreError::EmptyStore) => {
                    warn!("No messages configured, skipping daily delivery");
                    return CycleOutcome::Skipped;
                }
                Err(e) => {
                    error!("Failed to select message: {}", e);
                    return CycleOutcome::Skipped;
                }
            }
        };

        let now = Utc::now();
        let language = self.ctx.language_for(chat_id).await;
        let status = self.ctx.habits.read().await.status(chat_id, now);
        let local_date = now.with_timezone(&settings.schedule.timezone).date_naive();
        let text = compose_daily_text(
            &self.ctx.texts,
            language,
            &body,
            &status,
            local_date,
            settings.bot.include_date,
        );

        debug!(
            "Delivering message {} to chat {}: \"{}\"",
            message_id,
            chat_id,
            truncate_for_log(&body, 30)
        );

        let report = deliver_with_retry(
            self.sender.as_ref(),
            chat_id,
            &text,
            &self.policy,
            &self.ctx.scheduler,
            rx,
        )
        .await;

        match report.outcome {
            DeliveryOutcome::Delivered => {
                let delivered_at = Utc::now();
                {
                    let mut state = self.ctx.scheduler.write().await;
                    state.record_delivery(message_id, delivered_at);
                    if let Err(e) = state.to_persistent().save(self.ctx.rotation_path()) {
                        warn!("Failed to save rotation state: {}", e);
                    }
                }
                self.record_sent(SentEntry::new(delivered_at, chat_id, Some(message_id), &text))
                    .await;
                CycleOutcome::Delivered { message_id }
            }
            DeliveryOutcome::Exhausted(_) | DeliveryOutcome::Rejected(_) => CycleOutcome::Failed,
            DeliveryOutcome::Abandoned => CycleOutcome::Stopped,
        }
    }

    async fn record_sent(&self, entry: SentEntry) {
        if let Err(e) = self.ctx.sent_log.write().await.record(entry) {
            warn!("Failed to append to sent log: {}", e);
        }
    }

    async fn wait_for_next_slot(&self) -> chrono::DateTime<Utc> {
        let next_fire = self.ctx.next_fire(Utc::now());
        self.ctx.scheduler.write().await.phase = DeliveryPhase::Waiting { until: next_fire };
        info!("Next daily message at {}", next_fire);
        next_fire
    }
}

impl<S> std::fmt::Debug for DailyScheduler<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DailyScheduler")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::context::test_support::{CHAT_ID, context};
    use crate::scheduler::PersistentState;

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<(i64, String)>>,
        fail: bool,
    }

    impl RecordingSender {
        fn sent(&self) -> Vec<(i64, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl MessageSender for RecordingSender {
        async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), DeliveryError> {
            if self.fail {
                return Err(DeliveryError::Permanent("bot was blocked".into()));
            }
            self.sent.lock().unwrap().push((chat_id, text.to_owned()));
            Ok(())
        }
    }

    fn first_message_id(ctx: &AppContext) -> u64 {
        ctx.messages.try_read().unwrap().list()[0].id
    }

    #[tokio::test]
    async fn test_cycle_delivers_and_advances_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        let sender = Arc::new(RecordingSender::default());
        let scheduler = DailyScheduler::new(Arc::clone(&sender), ctx.clone());
        let (_tx, mut rx) = mpsc::channel(4);

        let first = scheduler.run_cycle(&mut rx).await;
        let second = scheduler.run_cycle(&mut rx).await;

        let CycleOutcome::Delivered { message_id: a } = first else {
            panic!("unexpected {first:?}");
        };
        let CycleOutcome::Delivered { message_id: b } = second else {
            panic!("unexpected {second:?}");
        };
        assert_eq!(a, first_message_id(&ctx));
        assert!(b > a);

        let sent = sender.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, CHAT_ID);
        assert!(sent[0].1.starts_with("📅 "));

        let persisted = PersistentState::load(ctx.rotation_path());
        assert_eq!(persisted.last_sent_id, Some(b));

        let log = ctx.sent_log.read().await;
        let ids: Vec<Option<u64>> = log.entries().map(|e| e.message_id).collect();
        assert_eq!(ids, vec![Some(a), Some(b)]);
        assert!(log.entries().all(|e| e.chat_id == CHAT_ID));
    }

    #[tokio::test]
    async fn test_announce_start_names_next_slot() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        let sender = Arc::new(RecordingSender::default());
        let scheduler = DailyScheduler::new(Arc::clone(&sender), ctx.clone());

        scheduler.announce_start().await.unwrap();

        let sent = sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, CHAT_ID);
        assert!(sent[0].1.contains("Next message scheduled for:"));
        assert!(sent[0].1.contains("09:00 UTC"));
        assert_eq!(ctx.sent_log.read().await.entries().next().unwrap().message_id, None);
        // The notice is not a daily delivery.
        assert_eq!(ctx.scheduler.read().await.last_sent_id, None);
    }

    #[tokio::test]
    async fn test_announce_start_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        let sender = Arc::new(RecordingSender {
            fail: true,
            ..RecordingSender::default()
        });
        let scheduler = DailyScheduler::new(sender, ctx.clone());

        assert!(scheduler.announce_start().await.is_err());
        assert!(ctx.sent_log.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_store_skips_without_sending() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        {
            let mut store = ctx.messages.write().await;
            let ids: Vec<u64> = store.list().iter().map(|m| m.id).collect();
            for id in ids {
                store.delete(id).unwrap();
            }
        }
        let sender = Arc::new(RecordingSender::default());
        let scheduler = DailyScheduler::new(Arc::clone(&sender), ctx.clone());
        let (_tx, mut rx) = mpsc::channel(4);

        assert_eq!(scheduler.run_cycle(&mut rx).await, CycleOutcome::Skipped);
        assert!(sender.sent().is_empty());
        assert_eq!(ctx.scheduler.read().await.last_sent_id, None);
    }

    #[tokio::test]
    async fn test_failed_cycle_keeps_rotation_marker() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        let sender = Arc::new(RecordingSender {
            fail: true,
            ..RecordingSender::default()
        });
        let scheduler = DailyScheduler::new(sender, ctx.clone());
        let (_tx, mut rx) = mpsc::channel(4);

        assert_eq!(scheduler.run_cycle(&mut rx).await, CycleOutcome::Failed);
        assert_eq!(ctx.scheduler.read().await.last_sent_id, None);
        assert!(ctx.sent_log.read().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_handles_deliver_now_then_stops() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        let sender = Arc::new(RecordingSender::default());
        let scheduler = DailyScheduler::new(Arc::clone(&sender), ctx.clone());

        let (tx, rx) = mpsc::channel(4);
        tx.send(SchedulerMessage::DeliverNow).await.unwrap();
        tx.send(SchedulerMessage::Shutdown).await.unwrap();

        scheduler.run(rx).await;

        assert_eq!(sender.sent().len(), 1);
        assert_eq!(ctx.scheduler.read().await.phase, DeliveryPhase::Stopped);
    }
}
