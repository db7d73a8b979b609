//! Table and identifier names as they appear in DDL, REST paths, and generated SQL.

/// Strip one pair of surrounding double quotes.
pub fn unquote_identifier(ident: &str) -> &str {
    ident
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(ident)
}

/// Trimmed, unquoted, lowercased identifier for case-insensitive matching.
pub fn normalize_identifier(ident: &str) -> String {
    unquote_identifier(ident.trim()).to_ascii_lowercase()
}

/// Dot-separated segments, ignoring dots inside double quotes.
fn segments(name: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut quoted = false;
    let mut from = 0;
    for (i, b) in name.bytes().enumerate() {
        match b {
            b'"' => quoted = !quoted,
            b'.' if !quoted => {
                out.push(name[from..i].trim());
                from = i + 1;
            }
            _ => {}
        }
    }
    out.push(name[from..].trim());
    out
}

/// A table name split into optional schema and relation.
///
/// Quotes are removed and case is preserved; use the `normalized_*`
/// accessors for matching. Only the last two segments of a longer
/// dotted name are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableRef<'a> {
    /// Schema qualifier, when present.
    pub schema: Option<&'a str>,
    /// Relation name.
    pub relation: &'a str,
}

impl<'a> TableRef<'a> {
    /// Parse `table`, `schema.table`, or `"Schema"."Table.Name"`.
    pub fn parse(name: &'a str) -> Self {
        let name = name.trim();
        match segments(name).as_slice() {
            [.., schema, relation] => Self {
                schema: Some(unquote_identifier(schema)),
                relation: unquote_identifier(relation),
            },
            _ => Self {
                schema: None,
                relation: unquote_identifier(name),
            },
        }
    }

    /// Lowercased relation.
    pub fn normalized_relation(&self) -> String {
        self.relation.to_ascii_lowercase()
    }

    /// Lowercased schema.
    pub fn normalized_schema(&self) -> Option<String> {
        self.schema.map(str::to_ascii_lowercase)
    }

    /// `"schema"."relation"`, using `default_schema` when unqualified.
    pub fn qualified(&self, default_schema: &str) -> String {
        format!(
            "{}.{}",
            quote_identifier(self.schema.unwrap_or(default_schema)),
            quote_identifier(self.relation)
        )
    }
}

/// Lowercased relation part of a possibly qualified name (`public.Proveedores` -> `proveedores`).
pub fn normalize_relation_name(name: &str) -> String {
    TableRef::parse(name).normalized_relation()
}

/// Quote an identifier for `PostgreSQL`, doubling embedded quotes.
pub fn quote_identifier(ident: &str) -> String {
    format!("\"{}\"", unquote_identifier(ident.trim()).replace('"', "\"\""))
}

/// `"schema"."table"` for generated DDL; a schema already in `table` wins.
pub fn qualified_table_name(default_schema: &str, table: &str) -> String {
    TableRef::parse(table).qualified(default_schema)
}

/// Relation name reduced to `[a-z0-9_]`, with runs of `_` collapsed and trimmed.
///
/// Empty results become `"table"`.
pub fn policy_safe_name(name: &str) -> String {
    let mapped: String = TableRef::parse(name)
        .relation
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    let collapsed = mapped
        .split('_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    if collapsed.is_empty() {
        "table".to_string()
    } else {
        collapsed
    }
}
