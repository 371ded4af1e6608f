//! Command handling module.
//!
//! Processes commands, language buttons and habit reports sent to the bot.

mod handler;
mod types;

pub use handler::CommandHandler;
pub use types::{
    BotCommand, CallbackButton, CommandResult, EventKind, InboundEvent, LANGUAGE_CALLBACK_PREFIX,
};
