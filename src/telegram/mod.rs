//! Telegram client wrapper module.
//!
//! Outbound delivery behind the [`MessageSender`] trait, and the long-polling
//! dispatcher that feeds inbound updates to the command handler.

mod client;
mod updates;

pub(crate) use client::truncate_for_log;
pub use client::{DeliveryError, MessageSender, TelegramBot};
pub use updates::{build_dispatcher, event_from_callback, event_from_message, keyboard};
