//! Inbound updates: long polling, conversion to events, replies.

use std::sync::Arc;

use chrono::Utc;
use teloxide::dispatching::{DefaultKey, UpdateFilterExt, UpdateHandler};
use teloxide::error_handlers::LoggingErrorHandler;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, MaybeInaccessibleMessage};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{DeliveryError, MessageSender, TelegramBot};
use crate::commands::{CallbackButton, CommandHandler, CommandResult, EventKind, InboundEvent};
use crate::scheduler::SchedulerMessage;

/// Builds the long-polling dispatcher.
pub fn build_dispatcher(
    bot: TelegramBot,
    handler: CommandHandler,
    scheduler_tx: mpsc::Sender<SchedulerMessage>,
) -> Dispatcher<Bot, DeliveryError, DefaultKey> {
    Dispatcher::builder(bot.inner().clone(), schema())
        .dependencies(dptree::deps![bot, Arc::new(handler), scheduler_tx])
        .default_handler(|_update: Arc<Update>| async {
            debug!("Ignoring unsupported update");
        })
        .error_handler(LoggingErrorHandler::with_custom_text(
            "Failed to handle update",
        ))
        .build()
}

/// Build the handler schema.
fn schema() -> UpdateHandler<DeliveryError> {
    dptree::entry()
        .branch(Update::filter_message().endpoint(on_message))
        .branch(Update::filter_callback_query().endpoint(on_callback))
}

async fn on_message(
    bot: TelegramBot,
    msg: Message,
    handler: Arc<CommandHandler>,
    scheduler_tx: mpsc::Sender<SchedulerMessage>,
) -> Result<(), DeliveryError> {
    let Some(event) = event_from_message(&msg) else {
        return Ok(());
    };
    respond(&bot, &handler, &scheduler_tx, &event).await
}

async fn on_callback(
    bot: TelegramBot,
    query: CallbackQuery,
    handler: Arc<CommandHandler>,
    scheduler_tx: mpsc::Sender<SchedulerMessage>,
) -> Result<(), DeliveryError> {
    bot.answer_callback(&query.id).await?;
    let Some(event) = event_from_callback(&query) else {
        return Ok(());
    };
    respond(&bot, &handler, &scheduler_tx, &event).await
}

async fn respond(
    bot: &TelegramBot,
    handler: &CommandHandler,
    scheduler_tx: &mpsc::Sender<SchedulerMessage>,
    event: &InboundEvent,
) -> Result<(), DeliveryError> {
    let Some(result) = handler.dispatch(event).await else {
        return Ok(());
    };

    send_result(bot, event.chat_id, &result).await?;

    if result.trigger_delivery && scheduler_tx.send(SchedulerMessage::DeliverNow).await.is_err() {
        warn!("Scheduler is not running, cannot deliver now");
    }
    Ok(())
}

async fn send_result(
    bot: &TelegramBot,
    chat_id: i64,
    result: &CommandResult,
) -> Result<(), DeliveryError> {
    match keyboard(&result.buttons) {
        Some(markup) => bot.send_with_keyboard(chat_id, &result.message, markup).await,
        None => bot.send_text(chat_id, &result.message).await,
    }
}

/// Text messages become events; stickers, photos and the like are dropped.
#[must_use]
pub fn event_from_message(msg: &Message) -> Option<InboundEvent> {
    let text = msg.text()?;
    Some(InboundEvent::text(msg.chat.id.0, text, msg.date))
}

/// Button presses become events, attributed to the chat the button lives in.
#[must_use]
pub fn event_from_callback(query: &CallbackQuery) -> Option<InboundEvent> {
    let data = query.data.clone()?;
    let chat_id = match &query.message {
        Some(MaybeInaccessibleMessage::Regular(msg)) => msg.chat.id.0,
        Some(MaybeInaccessibleMessage::Inaccessible(msg)) => msg.chat.id.0,
        None => i64::try_from(query.from.id.0).ok()?,
    };

    Some(InboundEvent {
        chat_id,
        kind: EventKind::Callback {
            id: query.id.clone(),
            data,
        },
        timestamp: Utc::now(),
    })
}

/// Lays the buttons out in a single row.
#[must_use]
pub fn keyboard(buttons: &[CallbackButton]) -> Option<InlineKeyboardMarkup> {
    if buttons.is_empty() {
        return None;
    }
    let row = buttons
        .iter()
        .map(|b| InlineKeyboardButton::callback(b.label.clone(), b.data.clone()))
        .collect::<Vec<_>>();
    Some(InlineKeyboardMarkup::new(vec![row]))
}

#[cfg(test)]
mod tests {
    use teloxide::types::InlineKeyboardButtonKind;

    use super::*;

    #[test]
    fn test_no_buttons_no_keyboard() {
        assert!(keyboard(&[]).is_none());
    }

    #[test]
    fn test_keyboard_single_row() {
        let buttons = vec![
            CallbackButton {
                label: "English".into(),
                data: "lang:english".into(),
            },
            CallbackButton {
                label: "العربية".into(),
                data: "lang:arabic".into(),
            },
        ];

        let markup = keyboard(&buttons).unwrap();
        assert_eq!(markup.inline_keyboard.len(), 1);
        let row = &markup.inline_keyboard[0];
        assert_eq!(row.len(), 2);
        assert!(matches!(
            &row[1].kind,
            InlineKeyboardButtonKind::CallbackData(data) if data == "lang:arabic"
        ));
    }
}
