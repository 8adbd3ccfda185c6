//! Multilingual text with language fallback.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Language used when the requested one is unavailable.
pub const FALLBACK_LANGUAGE: &str = "en";

/// Pick the best entry for a language.
///
/// Order: requested language → `en` → first available (alphabetical).
pub fn pick_language<'a, T>(
    map: &'a BTreeMap<String, T>,
    language: &str,
) -> Option<(&'a str, &'a T)> {
    let requested = language.trim().to_lowercase();
    map.get_key_value(requested.as_str())
        .or_else(|| map.get_key_value(FALLBACK_LANGUAGE))
        .or_else(|| map.iter().next())
        .map(|(k, v)| (k.as_str(), v))
}

/// Text keyed by language code (`es`, `pt`, `en`, ...).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct LocalizedText(pub BTreeMap<String, String>);

impl LocalizedText {
    /// Create text with a single English entry.
    pub fn english(text: impl Into<String>) -> Self {
        let mut map = BTreeMap::new();
        map.insert(FALLBACK_LANGUAGE.to_string(), text.into());
        Self(map)
    }

    /// Builder-style insert.
    pub fn with(mut self, language: &str, text: impl Into<String>) -> Self {
        self.insert(language, text);
        self
    }

    /// Set the text for a language.
    pub fn insert(&mut self, language: &str, text: impl Into<String>) {
        self.0.insert(language.trim().to_lowercase(), text.into());
    }

    /// Text for a language, with fallback.
    pub fn get(&self, language: &str) -> Option<&str> {
        pick_language(&self.0, language).map(|(_, text)| text.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
