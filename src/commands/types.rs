//! Command types and definitions.

use std::fmt;

use chrono::{DateTime, Utc};

/// Callback data prefix used by the language keyboard.
pub const LANGUAGE_CALLBACK_PREFIX: &str = "lang:";

/// What arrived from Telegram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A plain text message, command or not.
    Text(String),
    /// An inline keyboard button press.
    Callback { id: String, data: String },
}

/// An inbound update reduced to what the handler needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub chat_id: i64,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
}

impl InboundEvent {
    #[must_use]
    pub fn text(chat_id: i64, text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            chat_id,
            kind: EventKind::Text(text.into()),
            timestamp,
        }
    }

    #[must_use]
    pub fn callback(
        chat_id: i64,
        id: impl Into<String>,
        data: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            chat_id,
            kind: EventKind::Callback {
                id: id.into(),
                data: data.into(),
            },
            timestamp,
        }
    }
}

/// Available bot commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    /// Show help information.
    Help,

    /// Show the habit count and the time since the last occurrence.
    Status,

    /// Switch language; without an argument, offer a keyboard.
    Language(Option<String>),

    /// Show when the next daily message goes out.
    Next,

    /// Send the daily message right now.
    Test,

    /// Anything else starting with `/`.
    Unknown(String),
}

impl BotCommand {
    /// Parses a command from a message text.
    ///
    /// Returns `None` if the message is not a command. A `@botname` suffix
    /// on the command word is ignored.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let after_slash = text.trim().strip_prefix('/')?;

        let (head, args) = match after_slash.split_once(char::is_whitespace) {
            Some((head, args)) => (head, Some(args.trim())),
            None => (after_slash, None),
        };
        let cmd = head
            .split_once('@')
            .map_or(head, |(cmd, _bot)| cmd)
            .to_lowercase();

        Some(match cmd.as_str() {
            "help" | "start" => Self::Help,
            "status" | "stats" => Self::Status,
            "language" | "lang" => Self::Language(
                args.filter(|a| !a.is_empty()).map(str::to_owned),
            ),
            "next" => Self::Next,
            "test" => Self::Test,
            _ => Self::Unknown(cmd),
        })
    }

    /// Returns the command name as it appears in help.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Help => "help",
            Self::Status => "status",
            Self::Language(_) => "language",
            Self::Next => "next",
            Self::Test => "test",
            Self::Unknown(name) => name,
        }
    }
}

impl fmt::Display for BotCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Language(Some(code)) => write!(f, "/language {code}"),
            _ => write!(f, "/{}", self.name()),
        }
    }
}

/// An inline keyboard button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackButton {
    pub label: String,
    pub data: String,
}

/// Result of command execution.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Whether the command was successful.
    pub success: bool,

    /// Response message to show the user.
    pub message: String,

    /// Buttons to attach, laid out in one row.
    pub buttons: Vec<CallbackButton>,

    /// Whether to run a delivery cycle right away.
    pub trigger_delivery: bool,
}

impl CommandResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            buttons: Vec::new(),
            trigger_delivery: false,
        }
    }

    /// Creates a successful result that triggers a delivery.
    #[must_use]
    pub fn success_with_delivery(message: impl Into<String>) -> Self {
        Self {
            trigger_delivery: true,
            ..Self::success(message)
        }
    }

    /// Creates an error result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            ..Self::success(message)
        }
    }

    #[must_use]
    pub fn with_buttons(mut self, buttons: Vec<CallbackButton>) -> Self {
        self.buttons = buttons;
        self
    }
}
