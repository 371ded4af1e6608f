//! Per-chat language preferences.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::json_file::{read_json, write_json};
use super::StoreError;
use crate::i18n::Language;

/// Language choice of a single chat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserPreference {
    pub chat_id: i64,
    pub language: Language,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Preferences keyed by chat id, persisted as JSON. Entries are never deleted.
#[derive(Debug)]
pub struct PreferenceStore {
    path: PathBuf,
    entries: BTreeMap<i64, UserPreference>,
}

impl PreferenceStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let list: Vec<UserPreference> = read_json(&path)?.unwrap_or_default();
        let entries = list.into_iter().map(|p| (p.chat_id, p)).collect();
        Ok(Self { path, entries })
    }

    /// Returns the stored preference without creating one.
    #[must_use]
    pub fn get(&self, chat_id: i64) -> Option<&UserPreference> {
        self.entries.get(&chat_id)
    }

    /// Returns the chat's language, recording the default on first interaction.
    pub fn language_for(&mut self, chat_id: i64) -> Result<Language, StoreError> {
        if let Some(pref) = self.entries.get(&chat_id) {
            return Ok(pref.language);
        }

        let now = Utc::now();
        let pref = UserPreference {
            chat_id,
            language: Language::default(),
            created_at: now,
            updated_at: now,
        };
        self.insert(pref)?;
        Ok(Language::default())
    }

    /// Persists a language choice for a chat.
    pub fn set_language(
        &mut self,
        chat_id: i64,
        language: Language,
    ) -> Result<UserPreference, StoreError> {
        let now = Utc::now();
        let pref = match self.entries.get(&chat_id) {
            Some(existing) => UserPreference {
                language,
                updated_at: now,
                ..existing.clone()
            },
            None => UserPreference {
                chat_id,
                language,
                created_at: now,
                updated_at: now,
            },
        };

        self.insert(pref.clone())?;
        info!("Set language for chat {} to {}", chat_id, language);
        Ok(pref)
    }

    /// All stored preferences ordered by chat id.
    pub fn all(&self) -> impl Iterator<Item = &UserPreference> {
        self.entries.values()
    }

    fn insert(&mut self, pref: UserPreference) -> Result<(), StoreError> {
        let mut next = self.entries.clone();
        next.insert(pref.chat_id, pref);
        let list: Vec<&UserPreference> = next.values().collect();
        write_json(&self.path, &list)?;
        self.entries = next;
        Ok(())
    }
}
