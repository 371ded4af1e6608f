//! Supported languages.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Languages the bot can talk in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    English,
    Arabic,
}

impl Language {
    /// All supported languages, default first.
    pub const ALL: [Self; 2] = [Self::English, Self::Arabic];

    /// Parses a language code (`english`, `en`, `arabic`, `ar`, case-insensitive).
    #[must_use]
    pub fn parse(code: &str) -> Option<Self> {
        match code.trim().to_lowercase().as_str() {
            "english" | "en" => Some(Self::English),
            "arabic" | "ar" | "العربية" => Some(Self::Arabic),
            _ => None,
        }
    }

    /// Parses a language code, falling back to the default for unknown codes.
    #[must_use]
    pub fn from_code_or_default(code: &str) -> Self {
        Self::parse(code).unwrap_or_default()
    }

    /// Canonical code, also used as the catalog file stem.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::English => "english",
            Self::Arabic => "arabic",
        }
    }

    /// Name of the language written in itself.
    #[must_use]
    pub const fn native_name(self) -> &'static str {
        match self {
            Self::English => "🇬🇧 English",
            Self::Arabic => "🇸🇦 العربية",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
