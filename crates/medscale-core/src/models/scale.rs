//! Scale definitions and their interpretation tables.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{pick_language, LocalizedText, ScoringRule};

/// A clinical scale: variables, one scoring rule, interpretation entries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scale {
    /// Unique normalized identifier (e.g. "cha2ds2_vasc")
    pub code_name: String,
    /// Display name per language
    #[serde(default)]
    pub name: LocalizedText,
    /// Variable references by name, in display order
    pub variables: Vec<String>,
    /// Scoring rule
    pub rule: ScoringRule,
    /// Interpretation entries per language
    #[serde(default)]
    pub interpretation: InterpretationTable,
    #[serde(default)]
    pub description: String,
    /// Category tags (e.g. "cardiology")
    #[serde(default)]
    pub category: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Guidance passed to an LLM when explaining results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpretation_prompt_for_llm: Option<String>,
    /// Bumped by persistence when content changes
    #[serde(default)]
    pub version: u32,
    /// RFC 3339, set by persistence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// RFC 3339, set by persistence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Scale {
    /// Create an unpersisted scale.
    pub fn new(
        code_name: &str,
        name: LocalizedText,
        variables: Vec<String>,
        rule: ScoringRule,
    ) -> Self {
        Self {
            code_name: code_name.to_string(),
            name,
            variables,
            rule,
            interpretation: InterpretationTable::default(),
            description: String::new(),
            category: Vec::new(),
            reference: None,
            interpretation_prompt_for_llm: None,
            version: 0,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn with_interpretation(mut self, interpretation: InterpretationTable) -> Self {
        self.interpretation = interpretation;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Display name in a language, falling back to the code name.
    pub fn display_name(&self, language: &str) -> String {
        self.name
            .get(language)
            .map(str::to_string)
            .unwrap_or_else(|| self.code_name.clone())
    }
}

/// One row of an interpretation table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InterpretationEntry {
    /// Textual range such as "0-1", ">=20", "5+"
    pub range: String,
    pub meaning: String,
    #[serde(default)]
    pub recommendation: String,
}

impl InterpretationEntry {
    pub fn new(range: &str, meaning: &str, recommendation: &str) -> Self {
        Self {
            range: range.to_string(),
            meaning: meaning.to_string(),
            recommendation: recommendation.to_string(),
        }
    }
}

/// Language → ordered interpretation entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct InterpretationTable(pub BTreeMap<String, Vec<InterpretationEntry>>);

impl InterpretationTable {
    /// Table with a single English entry list.
    pub fn english(entries: Vec<InterpretationEntry>) -> Self {
        let mut map = BTreeMap::new();
        map.insert(super::FALLBACK_LANGUAGE.to_string(), entries);
        Self(map)
    }

    pub fn insert(&mut self, language: &str, entries: Vec<InterpretationEntry>) {
        self.0.insert(language.trim().to_lowercase(), entries);
    }

    /// Entries for a language, with fallback.
    pub fn entries(&self, language: &str) -> &[InterpretationEntry] {
        pick_language(&self.0, language)
            .map(|(_, entries)| entries.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }

    /// Flattened `{lang: {range: meaning}}` form used by persisted documents.
    pub fn to_dict(&self) -> BTreeMap<String, BTreeMap<String, String>> {
        self.0
            .iter()
            .map(|(lang, entries)| {
                let ranges = entries
                    .iter()
                    .map(|e| (e.range.clone(), e.meaning.clone()))
                    .collect();
                (lang.clone(), ranges)
            })
            .collect()
    }
}
