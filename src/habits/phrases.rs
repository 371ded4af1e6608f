//! Recognition of habit reports in free text.

use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::i18n::Language;

const ENGLISH_PHRASES: &[&str] = &[
    "i did it",
    "did it",
    "slipped up",
    "had the habit",
    "relapsed",
    "fell back",
    "messed up",
    "gave in",
    "happened again",
    "went back to it",
    "did the thing",
    "broke my streak",
    "couldn't resist",
    "lost control",
];

const ARABIC_PHRASES: &[&str] = &[
    "فعلتها",
    "عملتها",
    "انتكست",
    "مارست العادة",
    "رجعت",
    "رجعت لها",
    "ضعفت",
    "استسلمت",
    "حصلت مرة أخرى",
    "لم أستطع المقاومة",
];

/// Fixed phrase list for a language.
#[must_use]
pub fn phrases_for(language: Language) -> &'static [&'static str] {
    match language {
        Language::English => ENGLISH_PHRASES,
        Language::Arabic => ARABIC_PHRASES,
    }
}

/// How a phrase has to appear in a message to count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhraseMatching {
    /// Phrase appears anywhere in the lowercased text.
    #[default]
    Substring,
    /// Phrase appears bounded by non-word characters.
    WholeWords,
}

impl FromStr for PhraseMatching {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "substring" => Ok(Self::Substring),
            "whole_words" | "words" => Ok(Self::WholeWords),
            other => Err(format!("unknown phrase matching '{other}' (expected substring or whole_words)")),
        }
    }
}

/// Precompiled matcher for both languages.
#[derive(Debug, Clone)]
pub struct PhraseMatcher {
    mode: PhraseMatching,
    english: Vec<Regex>,
    arabic: Vec<Regex>,
}

impl PhraseMatcher {
    #[must_use]
    pub fn new(mode: PhraseMatching) -> Self {
        Self {
            mode,
            english: compile(ENGLISH_PHRASES),
            arabic: compile(ARABIC_PHRASES),
        }
    }

    #[must_use]
    pub const fn mode(&self) -> PhraseMatching {
        self.mode
    }

    /// Returns true if `text` reports a habit occurrence in `language`.
    #[must_use]
    pub fn is_match(&self, text: &str, language: Language) -> bool {
        let text = text.to_lowercase();
        match self.mode {
            PhraseMatching::Substring => phrases_for(language)
                .iter()
                .any(|phrase| text.contains(phrase)),
            PhraseMatching::WholeWords => {
                let patterns = match language {
                    Language::English => &self.english,
                    Language::Arabic => &self.arabic,
                };
                patterns.iter().any(|re| re.is_match(&text))
            }
        }
    }
}

fn compile(phrases: &[&str]) -> Vec<Regex> {
    phrases
        .iter()
        .filter_map(|phrase| {
            let pattern = format!(r"(?:^|\W){}(?:\W|$)", regex::escape(phrase));
            Regex::new(&pattern)
                .map_err(|e| warn!("Skipping phrase '{}': {}", phrase, e))
                .ok()
        })
        .collect()
}
