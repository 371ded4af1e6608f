//! State shared between the scheduler and the update dispatcher.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::Settings;
use crate::habits::{HabitTracker, PhraseMatcher};
use crate::i18n::{Language, LanguageProvider};
use crate::scheduler::{PersistentState, SchedulerState, next_fire_after};
use crate::store::{
    HABITS_FILE, MESSAGES_FILE, MessageStore, PREFERENCES_FILE, PreferenceStore, ROTATION_FILE,
    SENT_LOG_FILE, SentLog, StoreError,
};

/// Handles to every store, cheap to clone.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub settings: Arc<Settings>,
    pub texts: Arc<LanguageProvider>,
    pub messages: Arc<RwLock<MessageStore>>,
    pub preferences: Arc<RwLock<PreferenceStore>>,
    pub habits: Arc<RwLock<HabitTracker>>,
    pub sent_log: Arc<RwLock<SentLog>>,
    pub scheduler: Arc<RwLock<SchedulerState>>,
}

impl AppContext {
    /// Opens all stores under the configured data directory.
    pub fn open(settings: Settings) -> Result<Self, StoreError> {
        let bot = &settings.bot;
        let texts = LanguageProvider::load(&bot.locales_dir);
        let messages = MessageStore::open(bot.data_file(MESSAGES_FILE))?;
        let preferences = PreferenceStore::open(bot.data_file(PREFERENCES_FILE))?;
        let habits = HabitTracker::open(
            bot.data_file(HABITS_FILE),
            PhraseMatcher::new(bot.phrase_matching),
        )?;
        let sent_log = SentLog::open(bot.data_file(SENT_LOG_FILE))?;
        let rotation = PersistentState::load(bot.data_file(ROTATION_FILE));

        info!(
            "Loaded {} messages from {}",
            messages.len(),
            bot.data_dir.display()
        );

        Ok(Self {
            texts: Arc::new(texts),
            messages: Arc::new(RwLock::new(messages)),
            preferences: Arc::new(RwLock::new(preferences)),
            habits: Arc::new(RwLock::new(habits)),
            sent_log: Arc::new(RwLock::new(sent_log)),
            scheduler: Arc::new(RwLock::new(SchedulerState::from_persistent(&rotation))),
            settings: Arc::new(settings),
        })
    }

    /// Language for `chat_id`, registering the chat on first contact.
    pub async fn language_for(&self, chat_id: i64) -> Language {
        match self.preferences.write().await.language_for(chat_id) {
            Ok(language) => language,
            Err(e) => {
                warn!("Failed to store preference for chat {}: {}", chat_id, e);
                Language::default()
            }
        }
    }

    pub async fn set_user_language(
        &self,
        chat_id: i64,
        language: Language,
    ) -> Result<(), StoreError> {
        self.preferences
            .write()
            .await
            .set_language(chat_id, language)?;
        info!("Chat {} switched language to {}", chat_id, language.code());
        Ok(())
    }

    /// Next daily slot after `now`.
    #[must_use]
    pub fn next_fire(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let schedule = &self.settings.schedule;
        next_fire_after(now, schedule.time, schedule.timezone)
    }

    #[must_use]
    pub fn rotation_path(&self) -> PathBuf {
        self.settings.bot.data_file(ROTATION_FILE)
    }
}
