//! File-backed persistence for messages, chat preferences and send history.
//!
//! Every store keeps its state in memory and writes the whole document
//! back on each mutation. A write that fails leaves the in-memory state
//! untouched.

pub mod json_file;
mod messages;
mod preferences;
mod sent_log;

use thiserror::Error;

pub use messages::{MAX_MESSAGE_LENGTH, Message, MessageStore, SelectionPolicy};
pub use preferences::{PreferenceStore, UserPreference};
pub use sent_log::{MAX_SENT_LOG_ENTRIES, SentEntry, SentLog};

/// File names inside the data directory.
pub const MESSAGES_FILE: &str = "messages.json";
pub const PREFERENCES_FILE: &str = "preferences.json";
pub const HABITS_FILE: &str = "habits.json";
pub const ROTATION_FILE: &str = "rotation.json";
pub const SENT_LOG_FILE: &str = "sent_log.json";

/// Errors raised by the stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Message not found: {0}")]
    NotFound(u64),

    #[error("No messages configured")]
    EmptyStore,

    #[error("Invalid message text: {0}")]
    InvalidText(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed storage file: {0}")]
    Json(#[from] serde_json::Error),
}
