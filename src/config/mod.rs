//! Configuration module for the daily habit bot.
//!
//! Handles loading and validation of the bot configuration: Telegram
//! credentials, the delivery schedule and application settings.

mod settings;

pub use settings::{
    BotSettings, ConfigError, DEFAULT_CONFIG_PATH, MAX_RETRY_ATTEMPTS, RawConfig, ScheduleConfig,
    Settings, TelegramConfig, parse_schedule_time,
};
