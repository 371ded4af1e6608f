//! Application settings and Telegram configuration.
//!
//! Values are layered: built-in defaults, then `config.toml`, then
//! environment variables. The Telegram secrets are validated separately so
//! the CLI can run without them.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use crate::habits::PhraseMatching;
use crate::store::SelectionPolicy;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Upper bound for delivery attempts per cycle.
pub const MAX_RETRY_ATTEMPTS: u32 = 10;

const DEFAULT_CONFIG_TEMPLATE: &str = r##"# Daily habit bot configuration.
# Environment variables override every value in this file.

[telegram]
# Get from @BotFather on Telegram (env: TELEGRAM_BOT_TOKEN)
bot_token = "# Get from @BotFather on Telegram"
# Your Telegram chat ID (env: TELEGRAM_CHAT_ID)
chat_id = "# Your Telegram chat ID"

[schedule]
time = "09:00"
timezone = "UTC"
# sequential or random
selection = "sequential"

[application]
log_level = "info"
include_date = true
retry_attempts = 3
retry_delay_secs = 60
send_timeout_secs = 10
check_interval_secs = 30
data_dir = "data"
locales_dir = "locales"
# substring or whole_words
phrase_matching = "substring"
"##;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    MissingValue(&'static str),

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Failed to access configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// `[telegram]` section as written in the file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramSection {
    pub bot_token: Option<String>,
    /// Accepts both `chat_id = 123` and `chat_id = "123"`.
    pub chat_id: Option<toml::Value>,
}

/// `[schedule]` section as written in the file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleSection {
    pub time: Option<String>,
    pub timezone: Option<String>,
    pub selection: Option<String>,
}

/// `[application]` section as written in the file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationSection {
    pub log_level: Option<String>,
    pub include_date: Option<bool>,
    pub retry_attempts: Option<u32>,
    pub retry_delay_secs: Option<u64>,
    pub send_timeout_secs: Option<u64>,
    pub check_interval_secs: Option<u64>,
    pub data_dir: Option<PathBuf>,
    pub locales_dir: Option<PathBuf>,
    pub phrase_matching: Option<String>,
}

/// Unvalidated settings after merging file and environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawConfig {
    pub telegram: TelegramSection,
    pub schedule: ScheduleSection,
    pub application: ApplicationSection,
}

impl RawConfig {
    /// Parses TOML configuration text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Writes the default template to `path` unless a file is already there.
    ///
    /// Returns `true` if the file was created.
    pub fn create_default(path: impl AsRef<Path>) -> Result<bool, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            return Ok(false);
        }

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, DEFAULT_CONFIG_TEMPLATE)?;
        Ok(true)
    }

    /// Reads and parses the configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Applies overrides from the process environment.
    pub fn with_process_env(self) -> Result<Self, ConfigError> {
        self.with_env(|name| std::env::var(name).ok())
    }

    /// Applies overrides from `env`.
    ///
    /// Empty values are ignored. Values that do not parse are rejected just
    /// like the same value in the file would be.
    pub fn with_env(mut self, env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| env(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = Some(v);
        }
        if let Some(v) = var("TELEGRAM_CHAT_ID") {
            self.telegram.chat_id = Some(toml::Value::String(v));
        }
        if let Some(v) = var("SCHEDULE_TIME") {
            self.schedule.time = Some(v);
        }
        if let Some(v) = var("SCHEDULE_TIMEZONE") {
            self.schedule.timezone = Some(v);
        }
        if let Some(v) = var("MESSAGE_SELECTION") {
            self.schedule.selection = Some(v);
        }

        let app = &mut self.application;
        if let Some(v) = var("LOG_LEVEL") {
            app.log_level = Some(v);
        }
        if let Some(v) = var("INCLUDE_DATE") {
            let flag = parse_bool(&v).ok_or_else(|| ConfigError::InvalidValue {
                field: "INCLUDE_DATE",
                value: v.clone(),
                reason: "must be true or false".to_owned(),
            })?;
            app.include_date = Some(flag);
        }
        if let Some(v) = var("RETRY_ATTEMPTS") {
            app.retry_attempts = Some(parse_number("RETRY_ATTEMPTS", &v)?);
        }
        if let Some(v) = var("RETRY_DELAY") {
            app.retry_delay_secs = Some(parse_number("RETRY_DELAY", &v)?);
        }
        if let Some(v) = var("SEND_TIMEOUT") {
            app.send_timeout_secs = Some(parse_number("SEND_TIMEOUT", &v)?);
        }
        if let Some(v) = var("DATA_DIR") {
            app.data_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = var("LOCALES_DIR") {
            app.locales_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = var("PHRASE_MATCHING") {
            app.phrase_matching = Some(v);
        }

        Ok(self)
    }
}

/// Telegram bot credentials and target chat.
#[derive(Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot API token from @BotFather.
    pub bot_token: String,

    /// Chat that receives the daily message.
    pub chat_id: i64,
}

impl TelegramConfig {
    /// Creates a new Telegram configuration.
    #[must_use]
    pub fn new(bot_token: String, chat_id: i64) -> Self {
        Self { bot_token, chat_id }
    }

    /// Extracts the credentials, failing if either is absent.
    pub fn from_raw(raw: &RawConfig) -> Result<Self, ConfigError> {
        let bot_token = raw
            .telegram
            .bot_token
            .as_deref()
            .map(str::trim)
            .filter(|t| is_set(t))
            .ok_or(ConfigError::MissingValue("telegram.bot_token"))?
            .to_owned();

        let chat_id_raw = match &raw.telegram.chat_id {
            Some(toml::Value::Integer(id)) => id.to_string(),
            Some(toml::Value::String(s)) => s.trim().to_owned(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        if !is_set(&chat_id_raw) {
            return Err(ConfigError::MissingValue("telegram.chat_id"));
        }
        let chat_id = chat_id_raw.parse().map_err(|_| ConfigError::InvalidValue {
            field: "telegram.chat_id",
            value: chat_id_raw.clone(),
            reason: "must be an integer".to_owned(),
        })?;

        Ok(Self { bot_token, chat_id })
    }

    /// Token with everything but the last four characters hidden.
    #[must_use]
    pub fn masked_token(&self) -> String {
        let chars: Vec<char> = self.bot_token.chars().collect();
        if chars.len() > 4 {
            format!("****{}", chars[chars.len() - 4..].iter().collect::<String>())
        } else {
            "****".to_owned()
        }
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &self.masked_token())
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

/// When and how the daily message is delivered. Immutable for the process lifetime.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// Local time of day to send at.
    pub time: NaiveTime,

    /// Zone `time` is interpreted in.
    pub timezone: Tz,

    pub selection: SelectionPolicy,

    /// Total delivery attempts per cycle.
    pub retry_attempts: u32,

    /// Wait before the first retry; doubles for each further retry.
    pub retry_base_delay: Duration,

    /// Upper bound for a single send call.
    pub send_timeout: Duration,

    /// How often the loop re-checks the clock.
    pub check_interval: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            time: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
            timezone: Tz::UTC,
            selection: SelectionPolicy::default(),
            retry_attempts: 3,
            retry_base_delay: Duration::from_secs(60),
            send_timeout: Duration::from_secs(10),
            check_interval: Duration::from_secs(30),
        }
    }
}

impl ScheduleConfig {
    pub fn from_raw(raw: &RawConfig) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let app = &raw.application;

        let time = match raw.schedule.time.as_deref() {
            Some(s) => parse_schedule_time(s)?,
            None => defaults.time,
        };

        let timezone = match raw.schedule.timezone.as_deref() {
            Some(s) => s.trim().parse::<Tz>().map_err(|e| ConfigError::InvalidValue {
                field: "schedule.timezone",
                value: s.to_owned(),
                reason: e.to_string(),
            })?,
            None => defaults.timezone,
        };

        let selection = match raw.schedule.selection.as_deref() {
            Some(s) => s.parse().map_err(|reason| ConfigError::InvalidValue {
                field: "schedule.selection",
                value: s.to_owned(),
                reason,
            })?,
            None => defaults.selection,
        };

        let retry_attempts = app.retry_attempts.unwrap_or(defaults.retry_attempts);
        if !(1..=MAX_RETRY_ATTEMPTS).contains(&retry_attempts) {
            return Err(ConfigError::InvalidValue {
                field: "application.retry_attempts",
                value: retry_attempts.to_string(),
                reason: format!("must be between 1 and {MAX_RETRY_ATTEMPTS}"),
            });
        }

        let retry_base_delay = positive_secs(
            "application.retry_delay_secs",
            app.retry_delay_secs,
            defaults.retry_base_delay,
        )?;
        let send_timeout = positive_secs(
            "application.send_timeout_secs",
            app.send_timeout_secs,
            defaults.send_timeout,
        )?;
        let check_interval = positive_secs(
            "application.check_interval_secs",
            app.check_interval_secs,
            defaults.check_interval,
        )?;

        Ok(Self {
            time,
            timezone,
            selection,
            retry_attempts,
            retry_base_delay,
            send_timeout,
            check_interval,
        })
    }
}

/// Bot-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotSettings {
    /// Log level for the application.
    pub log_level: String,

    /// Prefix the daily message with the date and an awareness line.
    pub include_date: bool,

    /// Directory holding messages, preferences, habits and rotation state.
    pub data_dir: PathBuf,

    /// Directory holding `english.json` and `arabic.json`.
    pub locales_dir: PathBuf,

    pub phrase_matching: PhraseMatching,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            include_date: true,
            data_dir: PathBuf::from("data"),
            locales_dir: PathBuf::from("locales"),
            phrase_matching: PhraseMatching::default(),
        }
    }
}

impl BotSettings {
    pub fn from_raw(raw: &RawConfig) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let app = &raw.application;

        let phrase_matching = match app.phrase_matching.as_deref() {
            Some(s) => s.parse().map_err(|reason| ConfigError::InvalidValue {
                field: "application.phrase_matching",
                value: s.to_owned(),
                reason,
            })?,
            None => defaults.phrase_matching,
        };

        Ok(Self {
            log_level: app.log_level.clone().unwrap_or(defaults.log_level),
            include_date: app.include_date.unwrap_or(defaults.include_date),
            data_dir: app.data_dir.clone().unwrap_or(defaults.data_dir),
            locales_dir: app.locales_dir.clone().unwrap_or(defaults.locales_dir),
            phrase_matching,
        })
    }

    /// Path of a file inside the data directory.
    #[must_use]
    pub fn data_file(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }
}

/// Everything the bot daemon needs, fully validated.
#[derive(Debug, Clone)]
pub struct Settings {
    pub telegram: TelegramConfig,
    pub schedule: ScheduleConfig,
    pub bot: BotSettings,
}

impl Settings {
    /// Validates every section of a merged configuration.
    pub fn from_raw(raw: &RawConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            telegram: TelegramConfig::from_raw(raw)?,
            schedule: ScheduleConfig::from_raw(raw)?,
            bot: BotSettings::from_raw(raw)?,
        })
    }

}

/// Parses `HH:MM` in 24-hour format.
pub fn parse_schedule_time(s: &str) -> Result<NaiveTime, ConfigError> {
    let invalid = || ConfigError::InvalidValue {
        field: "schedule.time",
        value: s.to_owned(),
        reason: "must be HH:MM (24-hour)".to_owned(),
    };

    let (hour, minute) = s.trim().split_once(':').ok_or_else(invalid)?;
    let two_digits = |part: &str| part.len() == 2 && part.bytes().all(|b| b.is_ascii_digit());
    if !two_digits(hour) || !two_digits(minute) {
        return Err(invalid());
    }
    let hour: u32 = hour.parse().map_err(|_| invalid())?;
    let minute: u32 = minute.parse().map_err(|_| invalid())?;
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(invalid)
}

/// The generated config file uses `#`-prefixed placeholders for secrets.
fn is_set(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty() && !value.starts_with('#')
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_number<T: FromStr>(field: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        field,
        value: value.to_owned(),
        reason: "must be a whole number".to_owned(),
    })
}

fn positive_secs(
    field: &'static str,
    value: Option<u64>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match value {
        Some(0) => Err(ConfigError::InvalidValue {
            field,
            value: "0".to_owned(),
            reason: "must be at least 1 second".to_owned(),
        }),
        Some(secs) => Ok(Duration::from_secs(secs)),
        None => Ok(default),
    }
}
