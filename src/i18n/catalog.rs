//! Localized string catalogs.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info, warn};

use super::Language;

const EMBEDDED_ENGLISH: &str = include_str!("../../locales/english.json");
const EMBEDDED_ARABIC: &str = include_str!("../../locales/arabic.json");

/// Flat `key → text` mapping for one language.
type Catalog = HashMap<String, String>;

/// Looks up localized strings, falling back to English and then to the key.
#[derive(Debug, Clone)]
pub struct LanguageProvider {
    catalogs: HashMap<Language, Catalog>,
}

impl LanguageProvider {
    /// Loads `english.json` and `arabic.json` from `dir`.
    ///
    /// A file that is missing or malformed is replaced by the catalog
    /// compiled into the binary, so loading never fails.
    #[must_use]
    pub fn load(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let mut catalogs = HashMap::new();

        for language in Language::ALL {
            let path = dir.join(format!("{}.json", language.code()));
            let catalog = match std::fs::read_to_string(&path) {
                Ok(content) => match serde_json::from_str::<Catalog>(&content) {
                    Ok(catalog) => {
                        debug!("Loaded {} strings from {}", catalog.len(), path.display());
                        catalog
                    }
                    Err(e) => {
                        warn!("Malformed language file {}: {}. Using built-in strings.", path.display(), e);
                        embedded(language)
                    }
                },
                Err(e) => {
                    debug!("Language file {} not readable ({}), using built-in strings", path.display(), e);
                    embedded(language)
                }
            };
            catalogs.insert(language, catalog);
        }

        info!("Language catalogs loaded");
        Self { catalogs }
    }

    /// Provider backed only by the catalogs compiled into the binary.
    #[must_use]
    pub fn embedded() -> Self {
        let catalogs = Language::ALL
            .into_iter()
            .map(|language| (language, embedded(language)))
            .collect();
        Self { catalogs }
    }

    /// Returns the text for `key`, never failing.
    #[must_use]
    pub fn text(&self, key: &str, language: Language) -> String {
        self.lookup(key, language)
            .or_else(|| self.lookup(key, Language::default()))
            .map_or_else(
                || {
                    warn!("Missing text for key '{}'", key);
                    key.to_owned()
                },
                str::to_owned,
            )
    }

    /// Returns the text for `key` with `{name}` placeholders filled in.
    #[must_use]
    pub fn render(&self, key: &str, language: Language, args: &[(&str, &str)]) -> String {
        let mut text = self.text(key, language);
        for (name, value) in args {
            text = text.replace(&format!("{{{name}}}"), value);
        }
        text
    }

    /// Keys available in the default language.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.catalogs
            .get(&Language::default())
            .into_iter()
            .flat_map(|catalog| catalog.keys().map(String::as_str))
    }

    fn lookup(&self, key: &str, language: Language) -> Option<&str> {
        self.catalogs
            .get(&language)
            .and_then(|catalog| catalog.get(key))
            .map(String::as_str)
    }
}

fn embedded(language: Language) -> Catalog {
    let source = match language {
        Language::English => EMBEDDED_ENGLISH,
        Language::Arabic => EMBEDDED_ARABIC,
    };
    serde_json::from_str(source).unwrap_or_else(|e| {
        warn!("Built-in {} catalog is malformed: {}", language, e);
        Catalog::new()
    })
}
