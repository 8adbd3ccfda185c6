//! Variable document operations.

use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::{now, Database, DbError, DbResult};
use crate::models::{CategoricalOption, LocalizedText, Variable, VariableKind};

/// Persisted variable document in its exchange shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VariableDocument {
    pub name: String,
    pub medical_name: LocalizedText,
    pub description: String,
    /// "categorical" or "numerical"
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub possible_values: Option<Vec<CategoricalOption>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standardized_unit_of_measurement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub possible_units: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
}

impl From<&Variable> for VariableDocument {
    fn from(variable: &Variable) -> Self {
        let mut document = VariableDocument {
            name: variable.name.clone(),
            medical_name: variable.medical_name.clone(),
            description: variable.description.clone(),
            kind: String::new(),
            possible_values: None,
            standardized_unit_of_measurement: None,
            possible_units: None,
            min_value: None,
            max_value: None,
        };
        match &variable.kind {
            VariableKind::Categorical { options } => {
                document.kind = "categorical".into();
                document.possible_values = Some(options.clone());
            }
            VariableKind::Numerical {
                standard_unit,
                possible_units,
                min,
                max,
            } => {
                document.kind = "numerical".into();
                document.standardized_unit_of_measurement = standard_unit.clone();
                document.possible_units = Some(possible_units.clone());
                document.min_value = *min;
                document.max_value = *max;
            }
        }
        document
    }
}

impl TryFrom<VariableDocument> for Variable {
    type Error = DbError;

    fn try_from(document: VariableDocument) -> Result<Self, Self::Error> {
        let kind = match document.kind.as_str() {
            "categorical" => VariableKind::Categorical {
                options: document.possible_values.unwrap_or_default(),
            },
            "numerical" => VariableKind::Numerical {
                standard_unit: document.standardized_unit_of_measurement,
                possible_units: document.possible_units.unwrap_or_default(),
                min: document.min_value,
                max: document.max_value,
            },
            other => {
                return Err(DbError::InvalidColumn {
                    column: "type",
                    value: other.to_string(),
                })
            }
        };
        Ok(Variable {
            name: document.name,
            medical_name: document.medical_name,
            description: document.description,
            kind,
        })
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT name, medical_name, description, type, possible_values,
           standardized_unit_of_measurement, possible_units, min_value, max_value
    FROM variables
"#;

impl Database {
    /// Insert or update a variable by name. Redefinition overwrites.
    ///
    /// Returns true when the variable was newly created.
    pub fn upsert_variable(&self, variable: &Variable) -> DbResult<bool> {
        let document = VariableDocument::from(variable);
        let medical_name_json = serde_json::to_string(&document.medical_name)?;
        let values_json = document
            .possible_values
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let units_json = document
            .possible_units
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let timestamp = now();

        let existed: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM variables WHERE name = ?)",
            [&document.name],
            |row| row.get(0),
        )?;

        // Every column is overwritten: the kind may change on redefinition.
        self.conn.execute(
            r#"
            INSERT INTO variables (
                name, medical_name, description, type, possible_values,
                standardized_unit_of_measurement, possible_units, min_value, max_value,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
            ON CONFLICT(name) DO UPDATE SET
                medical_name = excluded.medical_name,
                description = excluded.description,
                type = excluded.type,
                possible_values = excluded.possible_values,
                standardized_unit_of_measurement = excluded.standardized_unit_of_measurement,
                possible_units = excluded.possible_units,
                min_value = excluded.min_value,
                max_value = excluded.max_value,
                updated_at = excluded.updated_at
            "#,
            params![
                document.name,
                medical_name_json,
                document.description,
                document.kind,
                values_json,
                document.standardized_unit_of_measurement,
                units_json,
                document.min_value,
                document.max_value,
                timestamp,
            ],
        )?;

        tracing::info!(
            name = %document.name,
            kind = %document.kind,
            created = !existed,
            "Upserted variable"
        );
        Ok(!existed)
    }

    /// Get a variable by name.
    pub fn get_variable(&self, name: &str) -> DbResult<Option<Variable>> {
        let sql = format!("{} WHERE name = ?", SELECT_COLUMNS);
        let row = self
            .conn
            .query_row(&sql, [name], VariableRow::from_row)
            .optional()?;

        row.map(Variable::try_from).transpose()
    }

    /// Variables for the given names, in request order. Unknown names are skipped.
    pub fn get_variables(&self, names: &[String]) -> DbResult<Vec<Variable>> {
        let mut variables = Vec::with_capacity(names.len());
        for name in names {
            if let Some(variable) = self.get_variable(name)? {
                variables.push(variable);
            }
        }
        Ok(variables)
    }

    /// All variables ordered by name.
    pub fn list_variables(&self) -> DbResult<Vec<Variable>> {
        let sql = format!("{} ORDER BY name", SELECT_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], VariableRow::from_row)?;

        let mut variables = Vec::new();
        for row in rows {
            variables.push(Variable::try_from(row?)?);
        }
        Ok(variables)
    }
}

/// Intermediate row struct for database mapping.
struct VariableRow {
    name: String,
    medical_name: String,
    description: String,
    kind: String,
    possible_values: Option<String>,
    standardized_unit_of_measurement: Option<String>,
    possible_units: Option<String>,
    min_value: Option<f64>,
    max_value: Option<f64>,
}

impl VariableRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            name: row.get(0)?,
            medical_name: row.get(1)?,
            description: row.get(2)?,
            kind: row.get(3)?,
            possible_values: row.get(4)?,
            standardized_unit_of_measurement: row.get(5)?,
            possible_units: row.get(6)?,
            min_value: row.get(7)?,
            max_value: row.get(8)?,
        })
    }
}

impl TryFrom<VariableRow> for Variable {
    type Error = DbError;

    fn try_from(row: VariableRow) -> Result<Self, Self::Error> {
        let document = VariableDocument {
            name: row.name,
            medical_name: serde_json::from_str(&row.medical_name)?,
            description: row.description,
            kind: row.kind,
            possible_values: row
                .possible_values
                .map(|s| serde_json::from_str(&s))
                .transpose()?,
            standardized_unit_of_measurement: row.standardized_unit_of_measurement,
            possible_units: row
                .possible_units
                .map(|s| serde_json::from_str(&s))
                .transpose()?,
            min_value: row.min_value,
            max_value: row.max_value,
        };
        Variable::try_from(document)
    }
}
