//! Daily delivery scheduler module.
//!
//! Decides when the daily message is due, composes it and delivers it with
//! retries.

mod clock;
mod compose;
mod retry;
mod runner;
mod state;

pub use clock::{format_local, next_fire_after};
pub use compose::{awareness_line, compose_daily_text};
pub use retry::{DeliveryOutcome, DeliveryReport, RetryPolicy, deliver_with_retry};
pub use runner::{CycleOutcome, DailyScheduler, SchedulerMessage};
pub use state::{DeliveryPhase, PersistentState, SchedulerState};
