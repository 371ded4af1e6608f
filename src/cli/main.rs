//! Command-line management tool for the daily habit bot.
//!
//! Edits the message store and inspects persisted state directly on disk.
//! It does not need a bot token and can run while the bot is running.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use dialoguer::Confirm;
use serde::Serialize;

use daily_habit_bot::config::{
    BotSettings, DEFAULT_CONFIG_PATH, RawConfig, ScheduleConfig, TelegramConfig,
};
use daily_habit_bot::habits::{HabitEntry, HabitTracker, PhraseMatcher};
use daily_habit_bot::scheduler::{PersistentState, format_local, next_fire_after};
use daily_habit_bot::store::json_file::write_json;
use daily_habit_bot::store::{
    HABITS_FILE, MESSAGES_FILE, Message, MessageStore, PREFERENCES_FILE, PreferenceStore,
    ROTATION_FILE, SENT_LOG_FILE, SelectionPolicy, SentEntry, SentLog, UserPreference,
};

/// Daily habit bot management tool.
#[derive(Parser, Debug)]
#[command(name = "daily_cli")]
#[command(about = "Manage daily messages and inspect habit tracking data")]
#[command(version)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, global = true)]
    config: String,

    /// Path to the .env file for environment variables.
    #[arg(long, default_value = ".env", global = true)]
    env_file: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List all daily messages.
    List,

    /// Add a daily message.
    Add {
        /// Message text.
        text: String,
    },

    /// Replace the text of a message.
    Edit {
        id: u64,
        /// New message text.
        text: String,
    },

    /// Delete a message.
    Delete {
        id: u64,
        /// Skip the confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Show habit tracking statistics.
    Status {
        /// Only show this chat (defaults to the configured chat).
        #[arg(long)]
        chat: Option<i64>,
    },

    /// Show when the next message goes out and which one it is.
    Next,

    /// Show recently sent messages.
    History {
        /// Number of entries to show, newest first.
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,
    },

    /// Show the resolved configuration.
    Config,

    /// Write all persisted state to a single JSON file.
    Export {
        /// Output path.
        path: PathBuf,
    },
}

/// Configuration as far as the CLI needs it. The token is optional here.
struct CliSettings {
    telegram: Option<TelegramConfig>,
    schedule: ScheduleConfig,
    bot: BotSettings,
}

impl CliSettings {
    fn load(path: &str) -> Result<Self> {
        if RawConfig::create_default(path)
            .with_context(|| format!("Failed to create configuration file {path}"))?
        {
            println!("Created default configuration at {path}");
        }
        let raw = RawConfig::load(path)
            .with_context(|| format!("Failed to read configuration from {path}"))?
            .with_process_env()
            .context("Invalid environment override")?;

        Ok(Self {
            telegram: TelegramConfig::from_raw(&raw).ok(),
            schedule: ScheduleConfig::from_raw(&raw).context("Invalid schedule configuration")?,
            bot: BotSettings::from_raw(&raw).context("Invalid application configuration")?,
        })
    }

    fn messages(&self) -> Result<MessageStore> {
        MessageStore::open(self.bot.data_file(MESSAGES_FILE)).context("Failed to open message store")
    }

    fn habits(&self) -> Result<HabitTracker> {
        HabitTracker::open(
            self.bot.data_file(HABITS_FILE),
            PhraseMatcher::new(self.bot.phrase_matching),
        )
        .context("Failed to open habit data")
    }

    fn sent_log(&self) -> Result<SentLog> {
        SentLog::open(self.bot.data_file(SENT_LOG_FILE)).context("Failed to open sent log")
    }
}

/// Everything the bot persists, in one document.
#[derive(Serialize)]
struct ExportBundle {
    exported_at: DateTime<Utc>,
    messages: Vec<Message>,
    preferences: Vec<UserPreference>,
    habits: Vec<HabitEntry>,
    rotation: PersistentState,
    sent: Vec<SentEntry>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    // A missing .env file is fine
    let _ = dotenvy::from_filename(&args.env_file);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("✗ {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let settings = CliSettings::load(&args.config)?;

    match args.command {
        Command::List => list_messages(&settings),
        Command::Add { text } => add_message(&settings, &text),
        Command::Edit { id, text } => edit_message(&settings, id, &text),
        Command::Delete { id, yes } => delete_message(&settings, id, yes),
        Command::Status { chat } => show_status(&settings, chat),
        Command::Next => show_next(&settings),
        Command::History { limit } => show_history(&settings, limit),
        Command::Config => show_config(&settings, &args.config),
        Command::Export { path } => export(&settings, &path),
    }
}

fn list_messages(settings: &CliSettings) -> Result<()> {
    let store = settings.messages()?;

    if store.is_empty() {
        println!("No messages. Add one with: daily_cli add \"<text>\"");
        return Ok(());
    }

    println!("{} message(s) in {}\n", store.len(), store.path().display());
    for message in store.list() {
        println!(
            "[{}] {} (updated {})",
            message.id,
            truncate(&message.text, 60),
            message.updated_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

fn add_message(settings: &CliSettings, text: &str) -> Result<()> {
    let mut store = settings.messages()?;
    let message = store.add(text).context("Failed to add message")?;
    println!("✓ Added message [{}]", message.id);
    Ok(())
}

fn edit_message(settings: &CliSettings, id: u64, text: &str) -> Result<()> {
    let mut store = settings.messages()?;
    let message = store
        .edit(id, text)
        .with_context(|| format!("Failed to edit message {id}"))?;
    println!("✓ Updated message [{}]: {}", message.id, truncate(&message.text, 60));
    Ok(())
}

fn delete_message(settings: &CliSettings, id: u64, yes: bool) -> Result<()> {
    let mut store = settings.messages()?;
    let message = store.get(id).with_context(|| format!("Cannot delete message {id}"))?;

    if !yes {
        let confirmed = Confirm::new()
            .with_prompt(format!("Delete [{}] \"{}\"?", id, truncate(&message.text, 40)))
            .default(false)
            .interact()
            .context("Failed to read confirmation")?;
        if !confirmed {
            println!("Cancelled");
            return Ok(());
        }
    }

    store.delete(id).with_context(|| format!("Failed to delete message {id}"))?;
    println!("✓ Deleted message [{id}]");
    Ok(())
}

fn show_status(settings: &CliSettings, chat: Option<i64>) -> Result<()> {
    let tracker = settings.habits()?;
    let now = Utc::now();
    let tz = settings.schedule.timezone;
    let chat = chat.or_else(|| settings.telegram.as_ref().map(|t| t.chat_id));

    let chats: Vec<i64> = match chat {
        Some(chat_id) => vec![chat_id],
        None => tracker.all().map(|e| e.chat_id).collect(),
    };

    if chats.is_empty() {
        println!("No habit data recorded yet");
        return Ok(());
    }

    for chat_id in chats {
        let status = tracker.status(chat_id, now);
        println!("Chat {chat_id}");
        println!("  Total recorded: {}", status.total_count);
        match (status.last_occurrence, status.days_since_last) {
            (Some(last), Some(days)) => {
                println!("  Last recorded:  {}", format_local(last, tz));
                println!("  Days since:     {days}");
            }
            _ => println!("  Last recorded:  never"),
        }
    }
    Ok(())
}

fn show_next(settings: &CliSettings) -> Result<()> {
    let schedule = &settings.schedule;
    let next = next_fire_after(Utc::now(), schedule.time, schedule.timezone);
    println!("Next delivery: {}", format_local(next, schedule.timezone));

    let store = settings.messages()?;
    match schedule.selection {
        SelectionPolicy::Sequential => {
            let rotation = PersistentState::load(settings.bot.data_file(ROTATION_FILE));
            let message = store
                .select_next(SelectionPolicy::Sequential, rotation.last_sent_id)
                .context("Nothing to send")?;
            println!("Next message:  [{}] {}", message.id, truncate(&message.text, 60));
        }
        SelectionPolicy::Random => {
            if store.is_empty() {
                bail!("Nothing to send: the message store is empty");
            }
            println!("Next message:  random pick from {} messages", store.len());
        }
    }
    Ok(())
}

fn show_history(settings: &CliSettings, limit: usize) -> Result<()> {
    let log = settings.sent_log()?;
    if log.is_empty() {
        println!("Nothing sent yet");
        return Ok(());
    }

    let tz = settings.schedule.timezone;
    println!("Last {} of {} sent message(s)\n", limit.min(log.len()), log.len());
    for entry in log.entries().rev().take(limit) {
        let id = entry
            .message_id
            .map_or_else(|| "notice".to_owned(), |id| format!("[{id}]"));
        println!(
            "{}  {}  {}",
            format_local(entry.sent_at, tz),
            id,
            truncate(&entry.preview, 50)
        );
    }
    Ok(())
}

fn show_config(settings: &CliSettings, path: &str) -> Result<()> {
    let schedule = &settings.schedule;
    let bot = &settings.bot;

    println!("Configuration file: {path}\n");
    println!("[telegram]");
    match &settings.telegram {
        Some(telegram) => {
            println!("  bot_token       = {}", telegram.masked_token());
            println!("  chat_id         = {}", telegram.chat_id);
        }
        None => println!("  (bot token or chat id not set, the bot will not start)"),
    }
    println!("[schedule]");
    println!("  time            = {}", schedule.time.format("%H:%M"));
    println!("  timezone        = {}", schedule.timezone);
    println!("  selection       = {:?}", schedule.selection);
    println!("[application]");
    println!("  log_level       = {}", bot.log_level);
    println!("  include_date    = {}", bot.include_date);
    println!("  retry_attempts  = {}", schedule.retry_attempts);
    println!("  retry_delay     = {}s", schedule.retry_base_delay.as_secs());
    println!("  send_timeout    = {}s", schedule.send_timeout.as_secs());
    println!("  check_interval  = {}s", schedule.check_interval.as_secs());
    println!("  data_dir        = {}", bot.data_dir.display());
    println!("  locales_dir     = {}", bot.locales_dir.display());
    println!("  phrase_matching = {:?}", bot.phrase_matching);
    Ok(())
}

fn export(settings: &CliSettings, path: &Path) -> Result<()> {
    let messages = settings.messages()?;
    let preferences = PreferenceStore::open(settings.bot.data_file(PREFERENCES_FILE))
        .context("Failed to open preferences")?;
    let habits = settings.habits()?;
    let sent = settings.sent_log()?;

    let bundle = ExportBundle {
        exported_at: Utc::now(),
        messages: messages.list().to_vec(),
        preferences: preferences.all().cloned().collect(),
        habits: habits.all().cloned().collect(),
        rotation: PersistentState::load(settings.bot.data_file(ROTATION_FILE)),
        sent: sent.entries().cloned().collect(),
    };

    write_json(path, &bundle).with_context(|| format!("Failed to write {}", path.display()))?;
    println!(
        "✓ Exported {} messages, {} preferences and {} habit entries to {}",
        bundle.messages.len(),
        bundle.preferences.len(),
        bundle.habits.len(),
        path.display()
    );
    Ok(())
}

/// Truncates a string for display.
fn truncate(s: &str, max_len: usize) -> String {
    let single_line = s.replace('\n', " ");
    if single_line.chars().count() <= max_len {
        single_line
    } else {
        format!("{}...", single_line.chars().take(max_len).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use daily_habit_bot::store::StoreError;
    use tempfile::TempDir;

    use super::*;

    /// Config file pointing the data directory into a fresh temp dir.
    fn workspace() -> (TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("config.toml");
        let data = dir.path().join("data");
        std::fs::write(
            &config,
            format!("[application]\ndata_dir = '{}'\n", data.display()),
        )
        .unwrap();
        let config = config.display().to_string();
        (dir, config)
    }

    fn cli(config: &str, args: &[&str]) -> Result<()> {
        let mut argv = vec!["daily_cli", "--config", config];
        argv.extend_from_slice(args);
        run(Args::try_parse_from(argv).unwrap())
    }

    fn store(dir: &TempDir) -> MessageStore {
        MessageStore::open(dir.path().join("data").join(MESSAGES_FILE)).unwrap()
    }

    fn store_error(result: Result<()>) -> StoreError {
        let err = result.unwrap_err();
        match err.downcast::<StoreError>() {
            Ok(e) => e,
            Err(other) => panic!("not a store error: {other:#}"),
        }
    }

    #[test]
    fn test_add_edit_delete() {
        let (dir, config) = workspace();

        cli(&config, &["list"]).unwrap();
        cli(&config, &["add", "Stay curious"]).unwrap();
        let id = store(&dir).list().last().unwrap().id;
        cli(&config, &["edit", &id.to_string(), "Stay kind"]).unwrap();
        assert_eq!(store(&dir).get(id).unwrap().text, "Stay kind");

        let before = store(&dir).len();
        cli(&config, &["delete", &id.to_string(), "--yes"]).unwrap();
        assert_eq!(store(&dir).len(), before - 1);
        assert!(store(&dir).get(id).is_err());
    }

    #[test]
    fn test_missing_id_fails() {
        let (_dir, config) = workspace();

        assert!(matches!(
            store_error(cli(&config, &["edit", "99", "x"])),
            StoreError::NotFound(99)
        ));
        assert!(matches!(
            store_error(cli(&config, &["delete", "99", "--yes"])),
            StoreError::NotFound(99)
        ));
    }

    #[test]
    fn test_blank_text_fails() {
        let (_dir, config) = workspace();
        assert!(matches!(
            store_error(cli(&config, &["add", "   "])),
            StoreError::InvalidText(_)
        ));
    }

    #[test]
    fn test_next_on_empty_store_fails() {
        let (dir, config) = workspace();
        cli(&config, &["next"]).unwrap();

        let ids: Vec<u64> = store(&dir).list().iter().map(|m| m.id).collect();
        for id in ids {
            cli(&config, &["delete", &id.to_string(), "--yes"]).unwrap();
        }

        cli(&config, &["list"]).unwrap();
        assert!(matches!(
            store_error(cli(&config, &["next"])),
            StoreError::EmptyStore
        ));
    }

    #[test]
    fn test_status_and_config_without_token() {
        let (_dir, config) = workspace();
        cli(&config, &["status"]).unwrap();
        cli(&config, &["status", "--chat", "42"]).unwrap();
        cli(&config, &["config"]).unwrap();
    }

    #[test]
    fn test_history_and_export() {
        let (dir, config) = workspace();
        cli(&config, &["history"]).unwrap();

        let mut log = SentLog::open(dir.path().join("data").join(SENT_LOG_FILE)).unwrap();
        log.record(SentEntry::new(Utc::now(), 42, Some(1), "Good morning"))
            .unwrap();
        cli(&config, &["history", "-n", "5"]).unwrap();

        let out = dir.path().join("export.json");
        cli(&config, &["export", &out.display().to_string()]).unwrap();

        let bundle: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(bundle["messages"].as_array().unwrap().len(), store(&dir).len());
        assert_eq!(bundle["sent"][0]["preview"], "Good morning");
    }

    #[test]
    fn test_creates_missing_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("config.toml").display().to_string();

        cli(&config, &["config"]).unwrap();
        assert!(dir.path().join("config.toml").exists());
    }
}
