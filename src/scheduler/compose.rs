//! Builds the text of the daily message.

use chrono::NaiveDate;

use crate::habits::HabitStatus;
use crate::i18n::{Language, LanguageProvider};

/// Prefixes `body` with the date and appends an awareness line.
///
/// With `include_date` off the body is sent unchanged.
#[must_use]
pub fn compose_daily_text(
    texts: &LanguageProvider,
    language: Language,
    body: &str,
    status: &HabitStatus,
    date: NaiveDate,
    include_date: bool,
) -> String {
    if !include_date {
        return body.to_owned();
    }

    let date = date.format("%B %d, %Y").to_string();
    let header = texts.render("daily.header", language, &[("date", &date)]);
    let awareness = awareness_line(texts, language, status.days_since_last);
    format!("{header}{body}{awareness}")
}

/// Encouragement based on how long ago the habit last happened.
#[must_use]
pub fn awareness_line(texts: &LanguageProvider, language: Language, days: Option<i64>) -> String {
    let Some(days) = days else {
        return String::new();
    };
    let count = days.to_string();
    match days {
        0 => texts.text("awareness.new_opportunity", language),
        1 => texts.text("awareness.one_day", language),
        2..=6 => texts.render("awareness.few_days", language, &[("days", &count)]),
        _ => texts.render("awareness.many_days", language, &[("days", &count)]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(days: Option<i64>) -> HabitStatus {
        HabitStatus {
            total_count: u64::from(days.is_some()),
            last_occurrence: None,
            days_since_last: days,
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
    }

    #[test]
    fn test_plain_body_without_date() {
        let texts = LanguageProvider::embedded();
        let text = compose_daily_text(&texts, Language::English, "Breathe.", &status(Some(3)), date(), false);
        assert_eq!(text, "Breathe.");
    }

    #[test]
    fn test_header_and_awareness() {
        let texts = LanguageProvider::embedded();
        let text = compose_daily_text(&texts, Language::English, "Breathe.", &status(Some(3)), date(), true);
        assert!(text.starts_with("📅 March 05, 2024\n\nBreathe."));
        assert!(text.ends_with("3 days of awareness. Stay mindful."));
    }

    #[test]
    fn test_no_history_means_no_awareness_line() {
        let texts = LanguageProvider::embedded();
        let text = compose_daily_text(&texts, Language::English, "Breathe.", &status(None), date(), true);
        assert!(text.ends_with("Breathe."));
    }

    #[test]
    fn test_awareness_thresholds() {
        let texts = LanguageProvider::embedded();
        let line = |days| awareness_line(&texts, Language::English, Some(days));
        assert!(line(0).contains("new opportunity"));
        assert!(line(1).contains("One day"));
        assert!(line(6).contains("6 days"));
        assert!(line(30).contains("strong patterns"));
    }

    #[test]
    fn test_missing_arabic_key_falls_back_to_english() {
        let texts = LanguageProvider::embedded();
        let line = awareness_line(&texts, Language::Arabic, Some(10));
        assert!(line.contains("10 days of awareness"));
    }
}
