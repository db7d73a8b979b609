use serde::{Deserialize, Serialize};
use sqlparser::ast::{ColumnDef, ColumnOption, Statement};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

use crate::parser::names::{normalize_identifier, TableRef};

/// A single column as far as test-row construction is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Column name, normalized.
    pub name: String,
    /// Declared data type as rendered by `sqlparser` (e.g. `UUID`, `VARCHAR(255)`).
    pub data_type: String,
    /// True when an INSERT must supply a value: NOT NULL or primary key,
    /// with no default, and not generated or serial.
    pub required: bool,
}

/// Columns of one table declared in the DDL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Schema qualifier when declared (`public.x` -> `public`).
    pub schema: Option<String>,
    /// Normalized relation name.
    pub name: String,
    /// Columns in declaration order.
    pub columns: Vec<ColumnSpec>,
}

impl TableSchema {
    /// Iterate over columns an INSERT must populate.
    pub fn required_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter().filter(|c| c.required)
    }
}

/// All tables found in a DDL file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaCatalog {
    /// Tables in declaration order.
    pub tables: Vec<TableSchema>,
}

impl SchemaCatalog {
    /// Resolve a table by name.
    ///
    /// A qualified name matches its own schema first, then a table declared
    /// without a schema; never a table in another schema. An unqualified
    /// name matches the first table with that relation name.
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        let wanted = TableRef::parse(name);
        let relation = wanted.normalized_relation();
        let mut named = self.tables.iter().filter(|t| t.name == relation);

        match wanted.normalized_schema() {
            Some(schema) => {
                let candidates: Vec<&TableSchema> = named.collect();
                candidates
                    .iter()
                    .find(|t| t.schema.as_deref() == Some(schema.as_str()))
                    .or_else(|| candidates.iter().find(|t| t.schema.is_none()))
                    .copied()
            }
            None => named.next(),
        }
    }

    /// Table names in declaration order.
    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.name.clone()).collect()
    }

    /// Number of parsed tables.
    pub fn number_of_tables(&self) -> usize {
        self.tables.len()
    }
}

/// Parse SQL DDL into a [`SchemaCatalog`].
///
/// Statements other than `CREATE TABLE` are accepted and ignored.
pub fn parse_schema(sql: &str) -> Result<SchemaCatalog, String> {
    let statements = Parser::parse_sql(&PostgreSqlDialect {}, sql).map_err(|e| e.to_string())?;

    let mut catalog = SchemaCatalog::default();
    for statement in statements {
        let Statement::CreateTable(create) = statement else {
            continue;
        };

        let raw_name = create.name.to_string();
        let table_ref = TableRef::parse(&raw_name);
        let schema = table_ref.normalized_schema();
        let name = table_ref.normalized_relation();

        let table_pk_columns: Vec<String> = create
            .constraints
            .iter()
            .filter_map(|constraint| primary_key_columns(&constraint.to_string()))
            .flatten()
            .collect();

        let columns = create
            .columns
            .iter()
            .map(|column| column_spec(column, &table_pk_columns))
            .collect();

        catalog.tables.push(TableSchema {
            schema,
            name,
            columns,
        });
    }

    Ok(catalog)
}

fn column_spec(column: &ColumnDef, table_pk_columns: &[String]) -> ColumnSpec {
    let name = normalize_identifier(&column.name.value);
    let data_type = column.data_type.to_string();

    let mut not_null = false;
    let mut has_default = false;
    let mut generated = data_type.to_ascii_uppercase().contains("SERIAL");
    let mut primary_key = table_pk_columns.contains(&name);

    for option in &column.options {
        match &option.option {
            ColumnOption::NotNull => not_null = true,
            ColumnOption::Default(_) => has_default = true,
            other => {
                let rendered = other.to_string().to_ascii_uppercase();
                if rendered.contains("PRIMARY KEY") {
                    primary_key = true;
                }
                if rendered.contains("GENERATED")
                    || rendered.contains("IDENTITY")
                    || rendered.contains("AUTOINCREMENT")
                    || rendered.contains("AUTO_INCREMENT")
                {
                    generated = true;
                }
            }
        }
    }

    ColumnSpec {
        name,
        data_type,
        required: (not_null || primary_key) && !has_default && !generated,
    }
}

/// Extract column names from a rendered `PRIMARY KEY (a, b)` table constraint.
fn primary_key_columns(rendered: &str) -> Option<Vec<String>> {
    let upper = rendered.to_ascii_uppercase();
    let start = upper.find("PRIMARY KEY")?;
    let rest = &rendered[start..];
    let open = rest.find('(')?;
    let close = rest[open..].find(')')? + open;
    Some(
        rest[open + 1..close]
            .split(',')
            .map(normalize_identifier)
            .filter(|c| !c.is_empty())
            .collect(),
    )
}
