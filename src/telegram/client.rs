//! Outbound message delivery through the Telegram Bot API.

use std::future::Future;
use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::InlineKeyboardMarkup;
use teloxide::RequestError;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::TelegramConfig;

/// Errors that can occur while delivering a message.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// Network hiccup or similar; worth retrying.
    #[error("Transient delivery failure: {0}")]
    Transient(String),

    /// Rejected by Telegram (bad chat, blocked bot); retrying won't help.
    #[error("Delivery rejected: {0}")]
    Permanent(String),

    #[error("Send timed out after {0:?}")]
    Timeout(Duration),

    #[error("Rate limited, retry after {0:?}")]
    RetryAfter(Duration),
}

impl DeliveryError {
    /// Returns true if another attempt may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        !matches!(self, Self::Permanent(_))
    }
}

impl From<RequestError> for DeliveryError {
    fn from(err: RequestError) -> Self {
        match &err {
            RequestError::RetryAfter(secs) => Self::RetryAfter(secs.duration()),
            RequestError::Api(_) | RequestError::MigrateToChatId(_) => {
                Self::Permanent(err.to_string())
            }
            _ => Self::Transient(err.to_string()),
        }
    }
}

/// Anything that can put text into a chat.
pub trait MessageSender: Send + Sync {
    fn send_text(
        &self,
        chat_id: i64,
        text: &str,
    ) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}

/// Telegram bot client.
#[derive(Clone)]
pub struct TelegramBot {
    bot: Bot,
}

impl TelegramBot {
    /// Creates a client for the configured bot token.
    #[must_use]
    pub fn new(config: &TelegramConfig) -> Self {
        info!("Creating Telegram bot client (token {})", config.masked_token());
        Self {
            bot: Bot::new(&config.bot_token),
        }
    }

    /// Checks the token and connectivity by asking Telegram who we are.
    ///
    /// Returns the bot's username.
    pub async fn verify(&self) -> Result<String, DeliveryError> {
        let me = self.bot.get_me().await?;
        let username = me.username().to_owned();
        info!("Bot connected: @{}", username);
        Ok(username)
    }

    /// Sends `text` with an inline keyboard attached.
    pub async fn send_with_keyboard(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: InlineKeyboardMarkup,
    ) -> Result<(), DeliveryError> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .reply_markup(keyboard)
            .await?;
        Ok(())
    }

    /// Acknowledges a button press so the client stops showing a spinner.
    pub async fn answer_callback(&self, callback_id: &str) -> Result<(), DeliveryError> {
        self.bot.answer_callback_query(callback_id.to_owned()).await?;
        Ok(())
    }

    /// Returns the underlying teloxide bot for the update dispatcher.
    #[must_use]
    pub fn inner(&self) -> &Bot {
        &self.bot
    }
}

impl MessageSender for TelegramBot {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), DeliveryError> {
        debug!("Sending to chat {}: \"{}\"", chat_id, truncate_for_log(text, 30));
        self.bot.send_message(ChatId(chat_id), text).await?;
        Ok(())
    }
}

impl std::fmt::Debug for TelegramBot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramBot").finish_non_exhaustive()
    }
}

/// Truncates a string for logging purposes.
pub(crate) fn truncate_for_log(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_owned()
    } else {
        format!("{}...", s.chars().take(max_len).collect::<String>())
    }
}
