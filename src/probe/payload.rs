use serde_json::{json, Map, Value};

use crate::config::InsertMode;
use crate::parser::schema::{ColumnSpec, SchemaCatalog};

/// Marker written into text columns so leftover test rows are easy to find.
pub const PROBE_TEXT_MARKER: &str = "rls_probe";

/// Builds INSERT/UPDATE bodies for probe runs.
#[derive(Debug, Clone, Default)]
pub struct PayloadBuilder {
    mode: InsertMode,
    catalog: Option<SchemaCatalog>,
}

impl PayloadBuilder {
    /// Always sends `{}`.
    pub fn minimal() -> Self {
        Self {
            mode: InsertMode::Minimal,
            catalog: None,
        }
    }

    /// Fills required columns from `catalog`; unknown tables fall back to `{}`.
    pub fn schema_aware(catalog: SchemaCatalog) -> Self {
        Self {
            mode: InsertMode::SchemaAware,
            catalog: Some(catalog),
        }
    }

    /// Mode in effect.
    pub fn mode(&self) -> InsertMode {
        self.mode
    }

    /// Body for the INSERT probe on `table`.
    pub fn insert_payload(&self, table: &str) -> Value {
        let Some(schema) = self
            .catalog
            .as_ref()
            .filter(|_| self.mode == InsertMode::SchemaAware)
            .and_then(|catalog| catalog.table(table))
        else {
            return Value::Object(Map::new());
        };

        let body: Map<String, Value> = schema
            .required_columns()
            .map(|column| (column.name.clone(), guess_value(column)))
            .collect();
        Value::Object(body)
    }

    /// Body for the UPDATE probe: rewrites one text column when one is known,
    /// otherwise re-sends the insert payload.
    pub fn update_payload(&self, table: &str) -> Value {
        let text_column = self
            .catalog
            .as_ref()
            .and_then(|catalog| catalog.table(table))
            .and_then(|schema| {
                schema
                    .required_columns()
                    .find(|c| is_text_type(&c.data_type.to_ascii_lowercase()))
            });
        match text_column {
            Some(column) => {
                let mut body = Map::new();
                body.insert(
                    column.name.clone(),
                    Value::String(format!("{PROBE_TEXT_MARKER}_updated")),
                );
                Value::Object(body)
            }
            None => self.insert_payload(table),
        }
    }
}

fn is_text_type(lower: &str) -> bool {
    lower.contains("char") || lower.contains("text") || lower.contains("citext")
}

/// Guess a value that satisfies the column's declared type.
pub fn guess_value(column: &ColumnSpec) -> Value {
    let lower = column.data_type.to_ascii_lowercase();

    if lower.ends_with("[]") || lower.starts_with("array") {
        return json!([]);
    }
    if lower.contains("uuid") {
        return Value::String(uuid::Uuid::new_v4().to_string());
    }
    if lower.contains("json") {
        return json!({});
    }
    if lower.contains("bool") {
        return Value::Bool(false);
    }
    if lower.contains("timestamp") {
        return Value::String("2024-01-01T00:00:00Z".to_string());
    }
    if lower == "date" {
        return Value::String("2024-01-01".to_string());
    }
    if lower.starts_with("time") {
        return Value::String("00:00:00".to_string());
    }
    if lower.contains("int") || lower.contains("serial") {
        return json!(1);
    }
    if lower.contains("numeric")
        || lower.contains("decimal")
        || lower.contains("real")
        || lower.contains("double")
        || lower.contains("float")
    {
        return json!(1.0);
    }
    if lower.contains("inet") {
        return Value::String("127.0.0.1".to_string());
    }
    if column.name.contains("email") {
        return Value::String(format!("{PROBE_TEXT_MARKER}@example.com"));
    }
    Value::String(PROBE_TEXT_MARKER.to_string())
}
