//! Interpretation lookup: score → meaning and recommendation.
//!
//! Entries are scanned in order and the first range containing the score
//! wins. A miss is not an error; the configured fallback texts are returned.

mod range;

pub use range::{Bound, ScoreRange};

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::models::{InterpretationEntry, InterpretationTable};

/// Resolved interpretation for one score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Interpretation {
    /// The matched range key, `None` on fallback
    pub range: Option<String>,
    pub meaning: String,
    pub recommendation: String,
}

impl Interpretation {
    pub fn is_fallback(&self) -> bool {
        self.range.is_none()
    }

    fn fallback(config: &EngineConfig) -> Self {
        Self {
            range: None,
            meaning: config.fallback_interpretation.clone(),
            recommendation: config.fallback_recommendation.clone(),
        }
    }
}

/// First entry whose range contains the score.
pub fn find_entry(score: f64, entries: &[InterpretationEntry]) -> Option<&InterpretationEntry> {
    entries.iter().find(|entry| {
        ScoreRange::parse(&entry.range)
            .map(|range| range.contains(score))
            .unwrap_or(false)
    })
}

/// Entry stored under an exact range key.
pub fn lookup_range<'a>(
    table: &'a InterpretationTable,
    language: &str,
    range: &str,
) -> Option<&'a InterpretationEntry> {
    table
        .entries(language)
        .iter()
        .find(|entry| entry.range.trim() == range.trim())
}

/// Interpret a score in a language (requested → `en` → first available).
pub fn interpret(
    score: f64,
    table: &InterpretationTable,
    language: &str,
    config: &EngineConfig,
) -> Interpretation {
    match find_entry(score, table.entries(language)) {
        Some(entry) => Interpretation {
            range: Some(entry.range.clone()),
            meaning: entry.meaning.clone(),
            recommendation: entry.recommendation.clone(),
        },
        None => {
            tracing::debug!(score, language, "No interpretation range matched");
            Interpretation::fallback(config)
        }
    }
}
