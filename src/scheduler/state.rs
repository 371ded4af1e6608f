//! Scheduler state management.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::store::StoreError;
use crate::store::json_file::{read_json, write_json};

/// Rotation marker that survives restarts.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct PersistentState {
    /// Id of the last message delivered successfully.
    pub last_sent_id: Option<u64>,
    /// When that delivery happened.
    pub last_delivered_at: Option<DateTime<Utc>>,
}

impl PersistentState {
    /// Loads state from a JSON file, returns default if missing or unreadable.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match read_json(path) {
            Ok(state) => state.unwrap_or_default(),
            Err(e) => {
                warn!("Ignoring unreadable rotation state {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Saves state to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        write_json(path.as_ref(), self)
    }
}

/// Where the delivery loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryPhase {
    #[default]
    Idle,
    /// Sleeping until the next slot.
    Waiting { until: DateTime<Utc> },
    Sending { attempt: u32 },
    /// Backing off after a failed attempt.
    RetryWait { attempt: u32, delay: Duration },
    Stopped,
}

/// State of the daily scheduler.
#[derive(Debug, Default)]
pub struct SchedulerState {
    pub phase: DeliveryPhase,

    pub last_sent_id: Option<u64>,

    pub last_delivered_at: Option<DateTime<Utc>>,
}

impl SchedulerState {
    /// Creates a new scheduler state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates state from persistent state loaded from disk.
    #[must_use]
    pub fn from_persistent(persistent: &PersistentState) -> Self {
        Self {
            last_sent_id: persistent.last_sent_id,
            last_delivered_at: persistent.last_delivered_at,
            ..Self::default()
        }
    }

    /// Converts to persistent state for saving.
    #[must_use]
    pub fn to_persistent(&self) -> PersistentState {
        PersistentState {
            last_sent_id: self.last_sent_id,
            last_delivered_at: self.last_delivered_at,
        }
    }

    /// Records a successful delivery of message `id`.
    pub fn record_delivery(&mut self, id: u64, at: DateTime<Utc>) {
        self.last_sent_id = Some(id);
        self.last_delivered_at = Some(at);
    }

    /// The pending slot, if the loop is currently waiting for one.
    #[must_use]
    pub const fn next_fire(&self) -> Option<DateTime<Utc>> {
        match self.phase {
            DeliveryPhase::Waiting { until } => Some(until),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_default_state() {
        let state = SchedulerState::default();
        assert_eq!(state.phase, DeliveryPhase::Idle);
        assert!(state.last_sent_id.is_none());
        assert!(state.next_fire().is_none());
    }

    #[test]
    fn test_persistent_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rotation.json");
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();

        let mut state = SchedulerState::new();
        state.record_delivery(4, at);
        state.to_persistent().save(&path).unwrap();

        let restored = SchedulerState::from_persistent(&PersistentState::load(&path));
        assert_eq!(restored.last_sent_id, Some(4));
        assert_eq!(restored.last_delivered_at, Some(at));
        assert_eq!(restored.phase, DeliveryPhase::Idle);
    }

    #[test]
    fn test_load_corrupt_file_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rotation.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert_eq!(PersistentState::load(&path), PersistentState::default());
    }

    #[test]
    fn test_next_fire_only_while_waiting() {
        let until = Utc.with_ymd_and_hms(2024, 6, 2, 9, 0, 0).unwrap();
        let mut state = SchedulerState::new();
        state.phase = DeliveryPhase::Waiting { until };
        assert_eq!(state.next_fire(), Some(until));

        state.phase = DeliveryPhase::Sending { attempt: 1 };
        assert_eq!(state.next_fire(), None);
    }
}
