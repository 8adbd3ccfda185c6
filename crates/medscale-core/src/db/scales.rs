//! Scale document operations.

use std::collections::BTreeMap;

use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{now, Database, DbError, DbResult};
use crate::models::{InterpretationTable, LocalizedText, Scale, ScoringRule, Variable};

/// Result of an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// No document existed for the code name
    pub created: bool,
    /// Version after the write
    pub version: u32,
}

/// A stored scale plus its storage metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleRecord {
    pub document_id: String,
    pub content_hash: String,
    pub scale: Scale,
}

/// Persisted scale document in its exchange shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScaleDocument {
    pub document_id: String,
    pub code_name: String,
    pub name: LocalizedText,
    pub variables: Vec<String>,
    /// Serialized scoring rule
    pub get_value_function: String,
    pub interpretation_dict: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interpretation_prompt_for_llm: Option<String>,
    pub description: String,
    pub category: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub version: u32,
}

impl ScaleRecord {
    pub fn to_document(&self) -> DbResult<ScaleDocument> {
        let scale = &self.scale;
        Ok(ScaleDocument {
            document_id: self.document_id.clone(),
            code_name: scale.code_name.clone(),
            name: scale.name.clone(),
            variables: scale.variables.clone(),
            get_value_function: serde_json::to_string(&scale.rule)?,
            interpretation_dict: scale.interpretation.to_dict(),
            interpretation_prompt_for_llm: scale.interpretation_prompt_for_llm.clone(),
            description: scale.description.clone(),
            category: scale.category.clone(),
            reference: scale.reference.clone(),
            created_at: scale.created_at.clone().unwrap_or_default(),
            updated_at: scale.updated_at.clone().unwrap_or_default(),
            version: scale.version,
        })
    }
}

/// Digest of everything that changes a scale's results.
pub fn content_hash(scale: &Scale) -> DbResult<String> {
    #[derive(Serialize)]
    struct Content<'a> {
        variables: &'a [String],
        rule: &'a ScoringRule,
        interpretation: &'a InterpretationTable,
    }

    let canonical = serde_json::to_vec(&Content {
        variables: &scale.variables,
        rule: &scale.rule,
        interpretation: &scale.interpretation,
    })?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(hex::encode(hasher.finalize()))
}

const SELECT_COLUMNS: &str = r#"
    SELECT s.code_name, s.document_id, s.name, s.variables, s.get_value_function,
           s.interpretation_entries, s.interpretation_prompt_for_llm, s.description,
           s.category, s.reference, s.content_hash, s.version, s.created_at, s.updated_at
    FROM scales s
"#;

impl Database {
    /// Insert or update a scale by code name (last write wins).
    ///
    /// `version` starts at 1 and increments only when the content hash
    /// changes; `updated_at` moves on every write.
    pub fn upsert_scale(&self, scale: &Scale) -> DbResult<UpsertOutcome> {
        let name_json = serde_json::to_string(&scale.name)?;
        let search_name = scale.name.0.values().cloned().collect::<Vec<_>>().join(" ");
        let variables_json = serde_json::to_string(&scale.variables)?;
        let rule_json = serde_json::to_string(&scale.rule)?;
        let entries_json = serde_json::to_string(&scale.interpretation)?;
        let dict_json = serde_json::to_string(&scale.interpretation.to_dict())?;
        let category_json = serde_json::to_string(&scale.category)?;
        let hash = content_hash(scale)?;
        let timestamp = now();

        let existed: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM scales WHERE code_name = ?)",
            [&scale.code_name],
            |row| row.get(0),
        )?;

        self.conn.execute(
            r#"
            INSERT INTO scales (
                code_name, document_id, name, search_name, variables, get_value_function,
                interpretation_entries, interpretation_dict, interpretation_prompt_for_llm,
                description, category, reference, content_hash, version, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, 1, ?14, ?14)
            ON CONFLICT(code_name) DO UPDATE SET
                name = excluded.name,
                search_name = excluded.search_name,
                variables = excluded.variables,
                get_value_function = excluded.get_value_function,
                interpretation_entries = excluded.interpretation_entries,
                interpretation_dict = excluded.interpretation_dict,
                interpretation_prompt_for_llm = excluded.interpretation_prompt_for_llm,
                description = excluded.description,
                category = excluded.category,
                reference = excluded.reference,
                version = CASE
                    WHEN scales.content_hash = excluded.content_hash THEN scales.version
                    ELSE scales.version + 1
                END,
                content_hash = excluded.content_hash,
                updated_at = excluded.updated_at
            "#,
            params![
                scale.code_name,
                uuid::Uuid::new_v4().to_string(),
                name_json,
                search_name,
                variables_json,
                rule_json,
                entries_json,
                dict_json,
                scale.interpretation_prompt_for_llm,
                scale.description,
                category_json,
                scale.reference,
                hash,
                timestamp,
            ],
        )?;

        let version: u32 = self.conn.query_row(
            "SELECT version FROM scales WHERE code_name = ?",
            [&scale.code_name],
            |row| row.get(0),
        )?;

        tracing::info!(
            code_name = %scale.code_name,
            rule = scale.rule.kind_name(),
            created = !existed,
            version,
            "Upserted scale"
        );

        Ok(UpsertOutcome {
            created: !existed,
            version,
        })
    }

    /// Upsert a scale together with the variables it names, atomically.
    pub fn store_scale(&self, scale: &Scale, variables: &[Variable]) -> DbResult<UpsertOutcome> {
        self.transaction(|db| {
            for variable in variables {
                db.upsert_variable(variable)?;
            }
            db.upsert_scale(scale)
        })
    }

    /// Get a scale with its storage metadata.
    pub fn get_scale_record(&self, code_name: &str) -> DbResult<Option<ScaleRecord>> {
        let sql = format!("{} WHERE s.code_name = ?", SELECT_COLUMNS);
        let row = self
            .conn
            .query_row(&sql, [code_name], ScaleRow::from_row)
            .optional()?;

        row.map(ScaleRecord::try_from).transpose()
    }

    /// Get a scale by code name.
    pub fn get_scale(&self, code_name: &str) -> DbResult<Option<Scale>> {
        Ok(self.get_scale_record(code_name)?.map(|r| r.scale))
    }

    /// All scales ordered by code name.
    pub fn list_scales(&self) -> DbResult<Vec<Scale>> {
        let sql = format!("{} ORDER BY s.code_name", SELECT_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], ScaleRow::from_row)?;

        let mut scales = Vec::new();
        for row in rows {
            scales.push(ScaleRecord::try_from(row?)?.scale);
        }
        Ok(scales)
    }

    /// Search scales by name, code name and description (BM25 ranking).
    pub fn search_scales(&self, query: &str, limit: usize) -> DbResult<Vec<Scale>> {
        let escaped_query = escape_fts_query(query);
        if escaped_query.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "{} JOIN scales_fts fts ON s.rowid = fts.rowid
             WHERE scales_fts MATCH ?
             ORDER BY bm25(scales_fts)
             LIMIT ?",
            SELECT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![escaped_query, limit as i64], ScaleRow::from_row)?;

        let mut scales = Vec::new();
        for row in rows {
            scales.push(ScaleRecord::try_from(row?)?.scale);
        }
        Ok(scales)
    }

    /// Delete a scale.
    pub fn delete_scale(&self, code_name: &str) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM scales WHERE code_name = ?", [code_name])?;
        Ok(rows_affected > 0)
    }
}

/// Intermediate row struct for database mapping.
struct ScaleRow {
    code_name: String,
    document_id: String,
    name: String,
    variables: String,
    get_value_function: String,
    interpretation_entries: String,
    interpretation_prompt_for_llm: Option<String>,
    description: String,
    category: String,
    reference: Option<String>,
    content_hash: String,
    version: u32,
    created_at: String,
    updated_at: String,
}

impl ScaleRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            code_name: row.get(0)?,
            document_id: row.get(1)?,
            name: row.get(2)?,
            variables: row.get(3)?,
            get_value_function: row.get(4)?,
            interpretation_entries: row.get(5)?,
            interpretation_prompt_for_llm: row.get(6)?,
            description: row.get(7)?,
            category: row.get(8)?,
            reference: row.get(9)?,
            content_hash: row.get(10)?,
            version: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }
}

impl TryFrom<ScaleRow> for ScaleRecord {
    type Error = DbError;

    fn try_from(row: ScaleRow) -> Result<Self, Self::Error> {
        let scale = Scale {
            code_name: row.code_name,
            name: serde_json::from_str(&row.name)?,
            variables: serde_json::from_str(&row.variables)?,
            rule: serde_json::from_str(&row.get_value_function)?,
            interpretation: serde_json::from_str(&row.interpretation_entries)?,
            description: row.description,
            category: serde_json::from_str(&row.category)?,
            reference: row.reference,
            interpretation_prompt_for_llm: row.interpretation_prompt_for_llm,
            version: row.version,
            created_at: Some(row.created_at),
            updated_at: Some(row.updated_at),
        };
        Ok(ScaleRecord {
            document_id: row.document_id,
            content_hash: row.content_hash,
            scale,
        })
    }
}

/// Escape special FTS5 characters and prepare query for prefix matching.
fn escape_fts_query(query: &str) -> String {
    let cleaned: String = query
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    cleaned
        .split_whitespace()
        .map(|word| format!("{}*", word))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InterpretationEntry;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn curb65() -> Scale {
        Scale::new(
            "curb_65",
            LocalizedText::english("CURB-65 Score").with("pt", "Escore CURB-65"),
            vec!["confusion".into(), "bun".into()],
            ScoringRule::SumOfPoints,
        )
        .with_description("Pneumonia severity")
        .with_interpretation(InterpretationTable::english(vec![InterpretationEntry::new(
            "0-1", "Low", "Outpatient",
        )]))
    }

    #[test]
    fn test_upsert_and_get() {
        let db = setup_db();
        let outcome = db.upsert_scale(&curb65()).unwrap();
        assert_eq!(outcome, UpsertOutcome { created: true, version: 1 });

        let record = db.get_scale_record("curb_65").unwrap().unwrap();
        assert_eq!(record.scale.rule, ScoringRule::SumOfPoints);
        assert_eq!(record.scale.name.get("pt"), Some("Escore CURB-65"));
        assert_eq!(record.scale.interpretation.entries("en")[0].recommendation, "Outpatient");
        assert!(record.scale.created_at.is_some());
        assert_eq!(record.content_hash.len(), 64);
        assert!(uuid::Uuid::parse_str(&record.document_id).is_ok());
    }

    #[test]
    fn test_store_scale_is_atomic() {
        let db = setup_db();
        let confusion = Variable::categorical(
            "confusion",
            "New onset confusion",
            vec![crate::models::CategoricalOption::new("No", 0.0)],
        );
        db.conn()
            .execute_batch(
                "CREATE TEMP TRIGGER reject_scales BEFORE INSERT ON scales
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        assert!(db.store_scale(&curb65(), &[confusion.clone()]).is_err());
        assert!(db.get_variable("confusion").unwrap().is_none());

        db.conn().execute_batch("DROP TRIGGER reject_scales;").unwrap();
        assert!(db.store_scale(&curb65(), &[confusion]).unwrap().created);
        assert!(db.get_variable("confusion").unwrap().is_some());
    }

    #[test]
    fn test_version_bumps_only_on_content_change() {
        let db = setup_db();
        let mut scale = curb65();
        db.upsert_scale(&scale).unwrap();
        let first = db.get_scale_record("curb_65").unwrap().unwrap();

        scale.description = "Reworded".into();
        let outcome = db.upsert_scale(&scale).unwrap();
        assert_eq!(outcome, UpsertOutcome { created: false, version: 1 });

        scale.variables.push("rr".into());
        let outcome = db.upsert_scale(&scale).unwrap();
        assert_eq!(outcome.version, 2);

        let record = db.get_scale_record("curb_65").unwrap().unwrap();
        assert_eq!(record.document_id, first.document_id);
        assert_eq!(record.scale.description, "Reworded");
        assert_ne!(record.content_hash, first.content_hash);
    }

    #[test]
    fn test_search_scales() {
        let db = setup_db();
        db.upsert_scale(&curb65()).unwrap();
        db.upsert_scale(&Scale::new(
            "wells_dvt",
            LocalizedText::english("Wells Score for DVT"),
            vec![],
            ScoringRule::SumOfPoints,
        ))
        .unwrap();

        let results = db.search_scales("pneumonia", 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].code_name, "curb_65");

        // Prefix search over localized names
        let results = db.search_scales("escor", 10).unwrap();
        assert_eq!(results.len(), 1);

        let results = db.search_scales("score", 10).unwrap();
        assert_eq!(results.len(), 2);

        assert!(db.search_scales("\"*", 10).unwrap().is_empty());
    }

    #[test]
    fn test_list_and_delete() {
        let db = setup_db();
        db.upsert_scale(&curb65()).unwrap();
        assert_eq!(db.list_scales().unwrap().len(), 1);

        assert!(db.delete_scale("curb_65").unwrap());
        assert!(!db.delete_scale("curb_65").unwrap());
        assert!(db.get_scale("curb_65").unwrap().is_none());
        assert!(db.search_scales("curb", 10).unwrap().is_empty());
    }

    #[test]
    fn test_document_shape() {
        let db = setup_db();
        db.upsert_scale(&curb65()).unwrap();
        let document = db.get_scale_record("curb_65").unwrap().unwrap().to_document().unwrap();

        assert_eq!(document.get_value_function, r#"{"type":"sum_of_points"}"#);
        assert_eq!(document.interpretation_dict["en"]["0-1"], "Low");
        assert_eq!(document.version, 1);
    }

    #[test]
    fn test_escape_fts_query() {
        assert_eq!(escape_fts_query("CURB-65"), "CURB* 65*");
        assert_eq!(escape_fts_query("  "), "");
    }
}
