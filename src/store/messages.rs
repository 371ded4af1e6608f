//! Daily message storage.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::json_file::{read_json, write_json};
use super::StoreError;

/// Telegram refuses text messages longer than this.
pub const MAX_MESSAGE_LENGTH: usize = 4096;

/// A single daily message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Unique identifier, never reused after deletion.
    pub id: u64,

    /// The text that gets sent.
    pub text: String,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// How the scheduler picks the next message to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionPolicy {
    /// Walk the list in id order, wrapping around.
    #[default]
    Sequential,
    /// Pick at random, never the message that was sent last.
    Random,
}

impl FromStr for SelectionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sequential" | "rotate" | "rotation" => Ok(Self::Sequential),
            "random" => Ok(Self::Random),
            other => Err(format!("unknown selection policy '{other}' (expected sequential or random)")),
        }
    }
}

/// On-disk layout of `messages.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MessageFile {
    messages: Vec<Message>,
    next_id: u64,
    last_modified: DateTime<Utc>,
}

impl MessageFile {
    fn seeded(now: DateTime<Utc>) -> Self {
        let defaults = [
            "🌅 Good morning! Have a wonderful day ahead!",
            "💪 Stay strong and keep pushing forward!",
            "🌟 You're doing great! Keep up the good work!",
            "🎯 Focus on your goals and make today count!",
            "✨ Every day is a new opportunity to shine!",
        ];

        let messages: Vec<Message> = defaults
            .iter()
            .zip(1u64..)
            .map(|(text, id)| Message {
                id,
                text: (*text).to_owned(),
                created_at: now,
                updated_at: now,
            })
            .collect();

        Self {
            next_id: messages.len() as u64 + 1,
            messages,
            last_modified: now,
        }
    }
}

/// Ordered collection of daily messages persisted as JSON.
#[derive(Debug)]
pub struct MessageStore {
    path: PathBuf,
    data: MessageFile,
}

impl MessageStore {
    /// Opens the store, creating a file with default messages if none exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        let data = if let Some(data) = read_json(&path)? {
            data
        } else {
            let data = MessageFile::seeded(Utc::now());
            write_json(&path, &data)?;
            info!("Created default messages file: {}", path.display());
            data
        };

        Ok(Self { path, data })
    }

    /// Re-reads the file so edits made by another process become visible.
    pub fn reload(&mut self) -> Result<(), StoreError> {
        if let Some(data) = read_json(&self.path)? {
            self.data = data;
        }
        debug!("Reloaded {} messages", self.data.messages.len());
        Ok(())
    }

    /// Returns all messages in order.
    #[must_use]
    pub fn list(&self) -> &[Message] {
        &self.data.messages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.messages.is_empty()
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, id: u64) -> Result<&Message, StoreError> {
        self.data
            .messages
            .iter()
            .find(|m| m.id == id)
            .ok_or(StoreError::NotFound(id))
    }

    /// Appends a new message.
    pub fn add(&mut self, text: &str) -> Result<Message, StoreError> {
        let text = validate_message_text(text)?;
        let now = Utc::now();

        let mut next = self.data.clone();
        let message = Message {
            id: next.next_id,
            text,
            created_at: now,
            updated_at: now,
        };
        next.next_id += 1;
        next.messages.push(message.clone());
        next.last_modified = now;

        self.commit(next)?;
        Ok(message)
    }

    /// Replaces the text of an existing message.
    pub fn edit(&mut self, id: u64, text: &str) -> Result<Message, StoreError> {
        let text = validate_message_text(text)?;
        let now = Utc::now();

        let mut next = self.data.clone();
        let message = next
            .messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(StoreError::NotFound(id))?;
        message.text = text;
        message.updated_at = now;
        let updated = message.clone();
        next.last_modified = now;

        self.commit(next)?;
        Ok(updated)
    }

    /// Removes a message, returning what was deleted.
    pub fn delete(&mut self, id: u64) -> Result<Message, StoreError> {
        let mut next = self.data.clone();
        let index = next
            .messages
            .iter()
            .position(|m| m.id == id)
            .ok_or(StoreError::NotFound(id))?;
        let removed = next.messages.remove(index);
        next.last_modified = Utc::now();

        self.commit(next)?;
        Ok(removed)
    }

    /// Picks the message the scheduler should send next.
    ///
    /// `last_sent` is the id of the previously delivered message, if any. It
    /// may refer to a message that has since been deleted.
    pub fn select_next(
        &self,
        policy: SelectionPolicy,
        last_sent: Option<u64>,
    ) -> Result<&Message, StoreError> {
        let messages = &self.data.messages;
        let first = messages.first().ok_or(StoreError::EmptyStore)?;

        let picked = match policy {
            SelectionPolicy::Sequential => last_sent
                .and_then(|last| messages.iter().find(|m| m.id > last))
                .unwrap_or(first),
            SelectionPolicy::Random => {
                let candidates: Vec<&Message> = messages
                    .iter()
                    .filter(|m| messages.len() == 1 || Some(m.id) != last_sent)
                    .collect();
                candidates
                    .choose(&mut rand::rng())
                    .copied()
                    .unwrap_or(first)
            }
        };

        Ok(picked)
    }

    /// Writes `next` to disk and only then makes it the visible state.
    fn commit(&mut self, next: MessageFile) -> Result<(), StoreError> {
        write_json(&self.path, &next)?;
        self.data = next;
        Ok(())
    }
}

/// Checks that text is something Telegram will accept as a message.
fn validate_message_text(text: &str) -> Result<String, StoreError> {
    let text = text.trim();

    if text.is_empty() {
        return Err(StoreError::InvalidText("message text cannot be empty".to_owned()));
    }

    let char_count = text.chars().count();
    if char_count > MAX_MESSAGE_LENGTH {
        return Err(StoreError::InvalidText(format!(
            "message too long: {char_count} chars (max: {MAX_MESSAGE_LENGTH})"
        )));
    }

    if let Some(ch) = text.chars().find(|&ch| ch.is_control() && ch != '\n' && ch != '\t') {
        return Err(StoreError::InvalidText(format!(
            "invalid control character U+{:04X}",
            ch as u32
        )));
    }

    Ok(text.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_store(dir: &tempfile::TempDir) -> MessageStore {
        let path = dir.path().join("messages.json");
        let mut store = MessageStore::open(&path).unwrap();
        let ids: Vec<u64> = store.list().iter().map(|m| m.id).collect();
        for id in ids {
            store.delete(id).unwrap();
        }
        store
    }

    #[test]
    fn test_open_seeds_default_messages() {
        let dir = tempfile::tempdir().unwrap();
        let store = MessageStore::open(dir.path().join("messages.json")).unwrap();
        assert_eq!(store.len(), 5);
        assert!(dir.path().join("messages.json").exists());
    }

    #[test]
    fn test_operation_sequence_matches_sequential_application() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = empty_store(&dir);

        let a = store.add("first").unwrap();
        let b = store.add("second").unwrap();
        let c = store.add("third").unwrap();
        store.edit(b.id, "second, edited").unwrap();
        store.delete(a.id).unwrap();
        let d = store.add("fourth").unwrap();

        let texts: Vec<&str> = store.list().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["second, edited", "third", "fourth"]);
        assert!(d.id > c.id);

        // The same state is visible after reopening from disk.
        let reopened = MessageStore::open(store.path()).unwrap();
        assert_eq!(reopened.list(), store.list());
    }

    #[test]
    fn test_ids_are_not_reused_after_delete() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = empty_store(&dir);

        let a = store.add("one").unwrap();
        store.delete(a.id).unwrap();
        let b = store.add("two").unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_edit_and_delete_missing_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = empty_store(&dir);

        assert!(matches!(store.edit(42, "x"), Err(StoreError::NotFound(42))));
        assert!(matches!(store.delete(42), Err(StoreError::NotFound(42))));
        assert!(matches!(store.get(42), Err(StoreError::NotFound(42))));
    }

    #[test]
    fn test_rejects_blank_text() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = empty_store(&dir);

        assert!(matches!(store.add("   "), Err(StoreError::InvalidText(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn test_edit_updates_timestamp_only_for_target() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = empty_store(&dir);

        let a = store.add("a").unwrap();
        let b = store.add("b").unwrap();
        let edited = store.edit(a.id, "a2").unwrap();

        assert_eq!(edited.created_at, a.created_at);
        assert!(edited.updated_at >= a.updated_at);
        assert_eq!(store.get(b.id).unwrap(), &b);
    }

    #[test]
    fn test_select_next_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = empty_store(&dir);

        assert!(matches!(
            store.select_next(SelectionPolicy::Sequential, None),
            Err(StoreError::EmptyStore)
        ));
        assert!(matches!(
            store.select_next(SelectionPolicy::Random, None),
            Err(StoreError::EmptyStore)
        ));
    }

    #[test]
    fn test_sequential_rotation_wraps() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = empty_store(&dir);
        let a = store.add("a").unwrap();
        let b = store.add("b").unwrap();
        let c = store.add("c").unwrap();

        let policy = SelectionPolicy::Sequential;
        assert_eq!(store.select_next(policy, None).unwrap().id, a.id);
        assert_eq!(store.select_next(policy, Some(a.id)).unwrap().id, b.id);
        assert_eq!(store.select_next(policy, Some(b.id)).unwrap().id, c.id);
        assert_eq!(store.select_next(policy, Some(c.id)).unwrap().id, a.id);
    }

    #[test]
    fn test_sequential_skips_over_deleted_marker() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = empty_store(&dir);
        let a = store.add("a").unwrap();
        let b = store.add("b").unwrap();
        let c = store.add("c").unwrap();
        store.delete(b.id).unwrap();

        let next = store.select_next(SelectionPolicy::Sequential, Some(b.id)).unwrap();
        assert_eq!(next.id, c.id);
        assert_ne!(next.id, a.id);
    }

    #[test]
    fn test_random_never_repeats_last_sent() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = empty_store(&dir);
        let a = store.add("a").unwrap();
        store.add("b").unwrap();

        for _ in 0..50 {
            let next = store.select_next(SelectionPolicy::Random, Some(a.id)).unwrap();
            assert_ne!(next.id, a.id);
        }
    }

    #[test]
    fn test_random_with_single_message_repeats_it() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = empty_store(&dir);
        let a = store.add("only").unwrap();

        let next = store.select_next(SelectionPolicy::Random, Some(a.id)).unwrap();
        assert_eq!(next.id, a.id);
    }

    #[test]
    fn test_reload_sees_external_changes() {
        let dir = tempfile::tempdir().unwrap();
        let mut bot_view = empty_store(&dir);
        let mut cli_view = MessageStore::open(bot_view.path()).unwrap();

        cli_view.add("from the cli").unwrap();
        assert!(bot_view.is_empty());

        bot_view.reload().unwrap();
        assert_eq!(bot_view.len(), 1);
    }

    #[test]
    fn test_selection_policy_from_str() {
        assert_eq!("random".parse::<SelectionPolicy>(), Ok(SelectionPolicy::Random));
        assert_eq!(" Sequential ".parse::<SelectionPolicy>(), Ok(SelectionPolicy::Sequential));
        assert!("shuffle".parse::<SelectionPolicy>().is_err());
    }
}
