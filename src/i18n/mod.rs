//! Localization.
//!
//! Strings live in flat JSON catalogs, one per language. The English
//! catalog is the fallback for keys missing elsewhere.

mod catalog;
mod language;

pub use catalog::LanguageProvider;
pub use language::Language;
