//! Habit awareness tracking.
//!
//! Users report occurrences in plain text ("I did it", "فعلتها"). Each
//! recognized report adds one to a per-chat counter that is never reset.

mod phrases;
mod tracker;

pub use phrases::{PhraseMatcher, PhraseMatching, phrases_for};
pub use tracker::{HabitEntry, HabitStatus, HabitTracker, MatchResult};
