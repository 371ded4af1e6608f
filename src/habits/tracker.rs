//! Habit occurrence counting.
//!
//! The count only ever grows. There is no operation that lowers or resets
//! it, whatever the input.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::PhraseMatcher;
use crate::i18n::Language;
use crate::store::StoreError;
use crate::store::json_file::{read_json, write_json};

/// Cumulative record for one chat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HabitEntry {
    pub chat_id: i64,
    pub total_count: u64,
    pub first_occurrence: DateTime<Utc>,
    pub last_occurrence: DateTime<Utc>,
}

/// Outcome of feeding one inbound message to the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub matched: bool,
    /// The entry after the update, present only when `matched`.
    pub entry: Option<HabitEntry>,
}

/// Summary used for `/status` and the daily message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HabitStatus {
    pub total_count: u64,
    pub last_occurrence: Option<DateTime<Utc>>,
    /// Whole days since the last occurrence, rounded down.
    pub days_since_last: Option<i64>,
}

/// Per-chat habit counters persisted as JSON.
#[derive(Debug)]
pub struct HabitTracker {
    path: PathBuf,
    entries: BTreeMap<i64, HabitEntry>,
    matcher: PhraseMatcher,
}

impl HabitTracker {
    pub fn open(path: impl AsRef<Path>, matcher: PhraseMatcher) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let list: Vec<HabitEntry> = read_json(&path)?.unwrap_or_default();
        let entries = list.into_iter().map(|e| (e.chat_id, e)).collect();
        Ok(Self {
            path,
            entries,
            matcher,
        })
    }

    /// Re-reads the file so changes made by another process become visible.
    pub fn reload(&mut self) -> Result<(), StoreError> {
        let list: Vec<HabitEntry> = read_json(&self.path)?.unwrap_or_default();
        self.entries = list.into_iter().map(|e| (e.chat_id, e)).collect();
        Ok(())
    }

    /// Records an occurrence if `raw_text` contains a known phrase.
    pub fn record_if_matches(
        &mut self,
        chat_id: i64,
        raw_text: &str,
        language: Language,
    ) -> Result<MatchResult, StoreError> {
        self.record_if_matches_at(chat_id, raw_text, language, Utc::now())
    }

    /// Same as [`Self::record_if_matches`] with an explicit clock.
    pub fn record_if_matches_at(
        &mut self,
        chat_id: i64,
        raw_text: &str,
        language: Language,
        now: DateTime<Utc>,
    ) -> Result<MatchResult, StoreError> {
        if !self.matcher.is_match(raw_text, language) {
            debug!("No habit phrase in message from chat {}", chat_id);
            return Ok(MatchResult {
                matched: false,
                entry: None,
            });
        }

        let entry = match self.entries.get(&chat_id) {
            Some(existing) => HabitEntry {
                total_count: existing.total_count.saturating_add(1),
                last_occurrence: now.max(existing.last_occurrence),
                ..existing.clone()
            },
            None => HabitEntry {
                chat_id,
                total_count: 1,
                first_occurrence: now,
                last_occurrence: now,
            },
        };

        let mut next = self.entries.clone();
        next.insert(chat_id, entry.clone());
        let list: Vec<&HabitEntry> = next.values().collect();
        write_json(&self.path, &list)?;
        self.entries = next;

        info!(
            "Recorded habit occurrence for chat {} (total: {})",
            chat_id, entry.total_count
        );

        Ok(MatchResult {
            matched: true,
            entry: Some(entry),
        })
    }

    #[must_use]
    pub fn entry(&self, chat_id: i64) -> Option<&HabitEntry> {
        self.entries.get(&chat_id)
    }

    /// Reports the count and time since the last occurrence.
    #[must_use]
    pub fn status(&self, chat_id: i64, now: DateTime<Utc>) -> HabitStatus {
        match self.entries.get(&chat_id) {
            Some(entry) => HabitStatus {
                total_count: entry.total_count,
                last_occurrence: Some(entry.last_occurrence),
                days_since_last: Some(days_between(entry.last_occurrence, now)),
            },
            None => HabitStatus {
                total_count: 0,
                last_occurrence: None,
                days_since_last: None,
            },
        }
    }

    /// All entries ordered by chat id.
    pub fn all(&self) -> impl Iterator<Item = &HabitEntry> {
        self.entries.values()
    }
}

/// Whole days from `from` to `to`, floored, never negative.
fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_days().max(0)
}
