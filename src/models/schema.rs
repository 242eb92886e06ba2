//! Schema-related data models.
//!
//! Rows returned by catalog introspection. Field names follow the catalog
//! column names so they read the same as the underlying views.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One row of `information_schema.columns`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnInfo {
    pub column_name: String,
    pub data_type: String,
    pub character_maximum_length: Option<i32>,
    /// "YES" or "NO"
    pub is_nullable: String,
    pub column_default: Option<String>,
}

impl ColumnInfo {
    pub fn is_nullable(&self) -> bool {
        self.is_nullable.eq_ignore_ascii_case("YES")
    }

    /// Column definition as used in a reconstructed `CREATE TABLE`.
    pub fn definition(&self) -> String {
        let mut def = format!("{} {}", quote_identifier(&self.column_name), self.data_type);
        if let Some(len) = self.character_maximum_length {
            def.push_str(&format!("({})", len));
        }
        if !self.is_nullable() {
            def.push_str(" NOT NULL");
        }
        def
    }
}

/// One row of `information_schema.table_constraints`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConstraintInfo {
    pub constraint_name: String,
    /// PRIMARY KEY, FOREIGN KEY, UNIQUE, CHECK
    pub constraint_type: String,
}

/// One row of `pg_indexes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IndexInfo {
    pub indexname: String,
    pub indexdef: String,
}

/// A table with its columns and constraints.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<ColumnInfo>,
    pub constraints: Vec<ConstraintInfo>,
}

/// One row of the database listing.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DatabaseInfo {
    pub name: String,
    pub owner: String,
    pub encoding: String,
    pub collation: String,
    pub ctype: String,
    pub size_bytes: i64,
    pub size: String,
    pub allow_connections: bool,
    pub connection_limit: i32,
    pub active_connections: i64,
}

/// Quote an identifier with double quotes, doubling any embedded quote.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a possibly schema-qualified name (`name` or `schema.name`) part by part.
pub fn quote_qualified_name(name: &str) -> Option<String> {
    let parts: Vec<&str> = name.split('.').map(str::trim).collect();
    if parts.len() > 2 || parts.iter().any(|p| p.is_empty()) {
        return None;
    }
    Some(
        parts
            .into_iter()
            .map(quote_identifier)
            .collect::<Vec<_>>()
            .join("."),
    )
}

/// Quote a string literal with single quotes, doubling any embedded quote.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier_escapes_quotes() {
        assert_eq!(quote_identifier("users"), "\"users\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_quote_qualified_name() {
        assert_eq!(
            quote_qualified_name("sales.orders").as_deref(),
            Some("\"sales\".\"orders\"")
        );
        assert_eq!(quote_qualified_name("orders").as_deref(), Some("\"orders\""));
        assert_eq!(quote_qualified_name(""), None);
        assert_eq!(quote_qualified_name("a..b"), None);
        assert_eq!(quote_qualified_name("a.b.c"), None);
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("UTF8"), "'UTF8'");
        assert_eq!(quote_literal("it's"), "'it''s'");
    }

    #[test]
    fn test_column_definition() {
        let col = ColumnInfo {
            column_name: "name".to_string(),
            data_type: "character varying".to_string(),
            character_maximum_length: Some(50),
            is_nullable: "NO".to_string(),
            column_default: None,
        };
        assert_eq!(col.definition(), "\"name\" character varying(50) NOT NULL");

        let col = ColumnInfo {
            column_name: "score".to_string(),
            data_type: "integer".to_string(),
            character_maximum_length: None,
            is_nullable: "YES".to_string(),
            column_default: Some("0".to_string()),
        };
        assert_eq!(col.definition(), "\"score\" integer");
    }
}
