//! History of messages the bot has sent, newest last.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::json_file::{read_json, write_json};
use super::StoreError;

/// Entries kept on disk; older ones are dropped.
pub const MAX_SENT_LOG_ENTRIES: usize = 100;

/// Characters of message text kept per entry.
const PREVIEW_CHARS: usize = 100;

/// One outbound message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SentEntry {
    pub sent_at: DateTime<Utc>,
    pub chat_id: i64,
    /// Store id of the daily message; `None` for notices.
    pub message_id: Option<u64>,
    pub preview: String,
}

impl SentEntry {
    #[must_use]
    pub fn new(sent_at: DateTime<Utc>, chat_id: i64, message_id: Option<u64>, text: &str) -> Self {
        let preview = if text.chars().count() > PREVIEW_CHARS {
            format!("{}...", text.chars().take(PREVIEW_CHARS).collect::<String>())
        } else {
            text.to_owned()
        };
        Self {
            sent_at,
            chat_id,
            message_id,
            preview,
        }
    }
}

/// Bounded ring of sent messages persisted as JSON.
#[derive(Debug)]
pub struct SentLog {
    path: PathBuf,
    entries: VecDeque<SentEntry>,
}

impl SentLog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let entries: VecDeque<SentEntry> = read_json(&path)?.unwrap_or_default();
        Ok(Self { path, entries })
    }

    /// Appends an entry, dropping the oldest beyond the limit.
    pub fn record(&mut self, entry: SentEntry) -> Result<(), StoreError> {
        let mut next = self.entries.clone();
        next.push_back(entry);
        while next.len() > MAX_SENT_LOG_ENTRIES {
            next.pop_front();
        }

        write_json(&self.path, &next)?;
        self.entries = next;
        Ok(())
    }

    /// Entries from oldest to newest.
    pub fn entries(&self) -> impl DoubleEndedIterator<Item = &SentEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
