//! SQLite schema definition.

/// Complete database schema for medscale.
pub const SCHEMA: &str = r#"
-- ============================================================================
-- Scales
-- ============================================================================

CREATE TABLE IF NOT EXISTS scales (
    code_name TEXT PRIMARY KEY,
    document_id TEXT NOT NULL UNIQUE,             -- uuid v4, stable across updates
    name TEXT NOT NULL DEFAULT '{}',              -- JSON object {lang: text}
    search_name TEXT NOT NULL DEFAULT '',         -- every localized name, space separated
    variables TEXT NOT NULL DEFAULT '[]',         -- JSON array of variable names
    get_value_function TEXT NOT NULL,             -- JSON ScoringRule
    interpretation_entries TEXT NOT NULL DEFAULT '{}', -- JSON {lang: [entry]}
    interpretation_dict TEXT NOT NULL DEFAULT '{}',    -- JSON {lang: {range: meaning}}
    interpretation_prompt_for_llm TEXT,
    description TEXT NOT NULL DEFAULT '',
    category TEXT NOT NULL DEFAULT '[]',          -- JSON array of strings
    reference TEXT,
    content_hash TEXT NOT NULL,                   -- SHA-256 of variables, rule, interpretation
    version INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- FTS5 virtual table for full-text search
CREATE VIRTUAL TABLE IF NOT EXISTS scales_fts USING fts5(
    code_name,
    search_name,
    description,
    content='scales',
    content_rowid='rowid'
);

-- Triggers to keep FTS5 in sync with main table
CREATE TRIGGER IF NOT EXISTS scales_ai AFTER INSERT ON scales BEGIN
    INSERT INTO scales_fts(rowid, code_name, search_name, description)
    VALUES (new.rowid, new.code_name, new.search_name, new.description);
END;

CREATE TRIGGER IF NOT EXISTS scales_ad AFTER DELETE ON scales BEGIN
    INSERT INTO scales_fts(scales_fts, rowid, code_name, search_name, description)
    VALUES ('delete', old.rowid, old.code_name, old.search_name, old.description);
END;

CREATE TRIGGER IF NOT EXISTS scales_au AFTER UPDATE ON scales BEGIN
    INSERT INTO scales_fts(scales_fts, rowid, code_name, search_name, description)
    VALUES ('delete', old.rowid, old.code_name, old.search_name, old.description);
    INSERT INTO scales_fts(rowid, code_name, search_name, description)
    VALUES (new.rowid, new.code_name, new.search_name, new.description);
END;

-- ============================================================================
-- Variables (shared across scales by name)
-- ============================================================================

CREATE TABLE IF NOT EXISTS variables (
    name TEXT PRIMARY KEY,
    medical_name TEXT NOT NULL DEFAULT '{}',      -- JSON object {lang: text}
    description TEXT NOT NULL DEFAULT '',
    type TEXT NOT NULL CHECK (type IN ('categorical', 'numerical')),
    possible_values TEXT,                         -- JSON array of options (categorical only)
    standardized_unit_of_measurement TEXT,        -- numerical only
    possible_units TEXT,                          -- JSON array of strings (numerical only)
    min_value REAL,
    max_value REAL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Categorical variables never carry unit metadata
CREATE TRIGGER IF NOT EXISTS variables_check_kind BEFORE INSERT ON variables
WHEN new.type = 'categorical'
BEGIN
    SELECT CASE
        WHEN new.standardized_unit_of_measurement IS NOT NULL OR new.possible_units IS NOT NULL THEN
            RAISE(ABORT, 'Categorical variables cannot have units')
    END;
END;
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_valid() {
        let conn = Connection::open_in_memory().unwrap();
        let result = conn.execute_batch(SCHEMA);
        assert!(result.is_ok(), "Schema should be valid SQL: {:?}", result);
    }

    #[test]
    fn test_fts_trigger() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        conn.execute(
            "INSERT INTO scales (code_name, document_id, search_name, get_value_function, content_hash, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            ["curb_65", "doc-1", "CURB-65 Score", r#"{"type":"sum_of_points"}"#, "abc", "t0", "t0"],
        )
        .unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM scales_fts WHERE scales_fts MATCH 'score'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_categorical_unit_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        let result = conn.execute(
            "INSERT INTO variables (name, type, standardized_unit_of_measurement, created_at, updated_at)
             VALUES ('sex', 'categorical', 'kg', 't0', 't0')",
            [],
        );
        assert!(result.is_err());

        let result = conn.execute(
            "INSERT INTO variables (name, type, possible_values, created_at, updated_at)
             VALUES ('sex', 'categorical', '[]', 't0', 't0')",
            [],
        );
        assert!(result.is_ok());
    }
}
