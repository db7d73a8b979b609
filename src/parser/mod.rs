/// Identifier and table-name normalization helpers (schema-qualified names, quoted identifiers).
pub mod names;
/// `CREATE TABLE` parsing into a column catalog used for schema-aware test rows.
pub mod schema;
