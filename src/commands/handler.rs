//! Command handler implementation.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use super::types::{
    BotCommand, CallbackButton, CommandResult, EventKind, InboundEvent, LANGUAGE_CALLBACK_PREFIX,
};
use crate::context::AppContext;
use crate::i18n::{Language, LanguageProvider};
use crate::scheduler::format_local;

/// Turns inbound events into replies, one at a time.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    ctx: AppContext,
}

impl CommandHandler {
    /// Creates a new command handler.
    #[must_use]
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    /// Handles one event.
    ///
    /// Returns `None` when nothing should be sent back, e.g. for free text
    /// that is not a habit report. Events from any chat other than the
    /// configured one are dropped without touching state.
    pub async fn dispatch(&self, event: &InboundEvent) -> Option<CommandResult> {
        let chat_id = event.chat_id;
        if chat_id != self.ctx.settings.telegram.chat_id {
            debug!("Ignoring event from foreign chat {}", chat_id);
            return None;
        }

        let result = match &event.kind {
            EventKind::Text(text) => match BotCommand::parse(text) {
                Some(command) => {
                    debug!("Handling command {} from chat {}", command, chat_id);
                    Some(self.execute(chat_id, command, event.timestamp).await)
                }
                None => self.handle_free_text(chat_id, text, event.timestamp).await,
            },
            EventKind::Callback { data, .. } => self.handle_callback(chat_id, data).await,
        };

        if let Some(result) = &result {
            info!(
                "Reply to chat {}: success={}, trigger_delivery={}",
                chat_id, result.success, result.trigger_delivery
            );
        }
        result
    }

    /// Executes a parsed command.
    async fn execute(&self, chat_id: i64, command: BotCommand, now: DateTime<Utc>) -> CommandResult {
        let language = self.ctx.language_for(chat_id).await;
        match command {
            BotCommand::Help => self.handle_help(language),
            BotCommand::Status => self.handle_status(chat_id, language, now).await,
            BotCommand::Language(None) => self.handle_language_prompt(language),
            BotCommand::Language(Some(code)) => self.handle_language_change(chat_id, language, &code).await,
            BotCommand::Next => self.handle_next(language, now),
            BotCommand::Test => self.handle_test(language),
            BotCommand::Unknown(name) => {
                debug!("Unknown command /{}, showing help", name);
                self.handle_help(language)
            }
        }
    }

    fn handle_help(&self, language: Language) -> CommandResult {
        CommandResult::success(self.ctx.texts.text("help", language))
    }

    async fn handle_status(&self, chat_id: i64, language: Language, now: DateTime<Utc>) -> CommandResult {
        let texts = &self.ctx.texts;
        let tz = self.ctx.settings.schedule.timezone;
        let status = self.ctx.habits.read().await.status(chat_id, now);

        let mut message = texts.text("status.title", language);

        match (status.last_occurrence, status.days_since_last) {
            (Some(last), Some(days)) => {
                let date = format_local(last, tz);
                message += &texts.render("status.last_entry", language, &[("date", &date)]);
                message += &match days {
                    0 => texts.text("status.today", language),
                    1 => texts.text("status.yesterday", language),
                    _ => texts.render("status.days_ago", language, &[("days", &days.to_string())]),
                };
            }
            _ => message += &texts.text("status.no_entries", language),
        }

        let count = status.total_count.to_string();
        message += &texts.render("status.total_entries", language, &[("count", &count)]);
        let next = format_local(self.ctx.next_fire(now), tz);
        message += &texts.render("status.next_reminder", language, &[("time", &next)]);

        CommandResult::success(message)
    }

    fn handle_language_prompt(&self, language: Language) -> CommandResult {
        let buttons = Language::ALL
            .iter()
            .map(|lang| CallbackButton {
                label: lang.native_name().to_owned(),
                data: format!("{LANGUAGE_CALLBACK_PREFIX}{}", lang.code()),
            })
            .collect();

        CommandResult::success(self.ctx.texts.text("language.prompt", language)).with_buttons(buttons)
    }

    async fn handle_language_change(&self, chat_id: i64, current: Language, code: &str) -> CommandResult {
        let Some(language) = Language::parse(code) else {
            return CommandResult::error(self.ctx.texts.text("language.invalid", current));
        };
        self.apply_language(chat_id, language).await
    }

    async fn apply_language(&self, chat_id: i64, language: Language) -> CommandResult {
        match self.ctx.set_user_language(chat_id, language).await {
            Ok(()) => CommandResult::success(self.ctx.texts.text("language.changed", language)),
            Err(e) => {
                error!("Failed to save language for chat {}: {}", chat_id, e);
                CommandResult::error(self.ctx.texts.text("error.generic", language))
            }
        }
    }

    fn handle_next(&self, language: Language, now: DateTime<Utc>) -> CommandResult {
        let next = self.ctx.next_fire(now);
        let wait = (next - now).num_seconds().max(0).unsigned_abs();
        let time = format_local(next, self.ctx.settings.schedule.timezone);
        let wait = format_duration(&self.ctx.texts, language, wait);
        CommandResult::success(self.ctx.texts.render(
            "next.reminder",
            language,
            &[("time", &time), ("wait", &wait)],
        ))
    }

    fn handle_test(&self, language: Language) -> CommandResult {
        CommandResult::success_with_delivery(self.ctx.texts.text("test.queued", language))
    }

    async fn handle_free_text(&self, chat_id: i64, text: &str, now: DateTime<Utc>) -> Option<CommandResult> {
        let language = self.ctx.language_for(chat_id).await;
        let outcome = self
            .ctx
            .habits
            .write()
            .await
            .record_if_matches_at(chat_id, text, language, now);

        match outcome {
            Ok(result) => {
                let entry = result.entry?;
                let texts = &self.ctx.texts;
                let count = entry.total_count.to_string();
                let message = texts.text("tracking.entry_recorded", language)
                    + &texts.render("tracking.total_times", language, &[("count", &count)])
                    + &texts.text("tracking.awareness", language);
                Some(CommandResult::success(message))
            }
            Err(e) => {
                error!("Failed to record habit for chat {}: {}", chat_id, e);
                Some(CommandResult::error(self.ctx.texts.text("error.generic", language)))
            }
        }
    }

    async fn handle_callback(&self, chat_id: i64, data: &str) -> Option<CommandResult> {
        let Some(code) = data.strip_prefix(LANGUAGE_CALLBACK_PREFIX) else {
            warn!("Ignoring unknown callback data '{}'", data);
            return None;
        };

        match Language::parse(code) {
            Some(language) => Some(self.apply_language(chat_id, language).await),
            None => {
                let current = self.ctx.language_for(chat_id).await;
                Some(CommandResult::error(self.ctx.texts.text("language.invalid", current)))
            }
        }
    }
}

/// Formats a duration in seconds to a short localized string.
fn format_duration(texts: &LanguageProvider, language: Language, secs: u64) -> String {
    if secs < 60 {
        texts.render("duration.seconds", language, &[("s", &secs.to_string())])
    } else if secs < 3600 {
        texts.render("duration.minutes", language, &[("m", &(secs / 60).to_string())])
    } else {
        let hours = (secs / 3600).to_string();
        let mins = (secs % 3600) / 60;
        if mins == 0 {
            texts.render("duration.hours", language, &[("h", &hours)])
        } else {
            texts.render(
                "duration.hours_minutes",
                language,
                &[("h", &hours), ("m", &mins.to_string())],
            )
        }
    }
}
