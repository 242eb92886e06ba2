//! Schema introspection module.
//!
//! Read-only catalog queries used by the schema tools, the database lifecycle
//! tools and the SQL-script backup strategy.
//!
//! # Architecture
//!
//! SQL is kept in the `queries` submodule. Catalog columns typed as
//! information_schema domains (`sql_identifier`, `yes_or_no`,
//! `cardinal_number`) are cast to plain `text`/`int4` so they decode without
//! domain-aware type checks.

use crate::db::params::PgQuery;
use crate::db::types::{PgValue, row_values_strict};
use crate::error::{DbError, DbResult};
use crate::models::{
    ColumnInfo, ConstraintInfo, DatabaseInfo, IndexInfo, TableSchema, quote_identifier,
};
use futures_util::TryStreamExt;
use sqlx::Row;
use sqlx::postgres::{PgConnection, PgRow};
use std::time::Duration;
use tracing::debug;

/// System databases: hidden from listings by default and never dropped.
pub const SYSTEM_DATABASES: &[&str] = &["template0", "template1", "postgres"];

// =============================================================================
// SQL Query Templates
// =============================================================================

mod queries {
    pub const LIST_TABLES: &str = r#"
        SELECT tablename::text AS tablename
        FROM pg_catalog.pg_tables
        WHERE schemaname = $1
          AND schemaname NOT IN ('pg_catalog', 'information_schema')
        ORDER BY tablename
        "#;

    pub const LIST_TABLES_WITH_SYSTEM: &str = r#"
        SELECT tablename::text AS tablename
        FROM pg_catalog.pg_tables
        WHERE schemaname = $1
        ORDER BY tablename
        "#;

    pub const DESCRIBE_COLUMNS: &str = r#"
        SELECT
            column_name::text AS column_name,
            data_type::text AS data_type,
            character_maximum_length::int4 AS character_maximum_length,
            is_nullable::text AS is_nullable,
            column_default::text AS column_default
        FROM information_schema.columns
        WHERE table_schema = $1 AND table_name = $2
        ORDER BY ordinal_position
        "#;

    pub const DESCRIBE_CONSTRAINTS: &str = r#"
        SELECT
            constraint_name::text AS constraint_name,
            constraint_type::text AS constraint_type
        FROM information_schema.table_constraints
        WHERE table_schema = $1 AND table_name = $2
        "#;

    pub const DESCRIBE_INDEXES: &str = r#"
        SELECT indexname::text AS indexname, indexdef
        FROM pg_indexes
        WHERE schemaname = $1 AND tablename = $2
        "#;

    pub const LIST_DATABASES: &str = r#"
        SELECT
            d.datname::text AS name,
            pg_catalog.pg_get_userbyid(d.datdba)::text AS owner,
            pg_catalog.pg_encoding_to_char(d.encoding)::text AS encoding,
            d.datcollate::text AS collation,
            d.datctype::text AS ctype,
            pg_catalog.pg_database_size(d.datname) AS size_bytes,
            pg_catalog.pg_size_pretty(pg_catalog.pg_database_size(d.datname)) AS size,
            d.datallowconn AS allow_connections,
            d.datconnlimit AS connection_limit,
            (SELECT count(*) FROM pg_stat_activity a WHERE a.datname = d.datname) AS active_connections
        FROM pg_catalog.pg_database d
        WHERE $1 OR d.datname NOT IN ('template0', 'template1', 'postgres')
        ORDER BY d.datname
        "#;

    pub const DATABASE_EXISTS: &str =
        "SELECT EXISTS (SELECT 1 FROM pg_catalog.pg_database WHERE datname = $1)";

    pub const TERMINATE_BACKENDS: &str = r#"
        SELECT pg_terminate_backend(pid)
        FROM pg_stat_activity
        WHERE datname = $1 AND pid <> pg_backend_pid()
        "#;
}

/// Catalog queries bound to a per-command timeout.
pub struct SchemaInspector {
    command_timeout: Duration,
}

impl SchemaInspector {
    pub fn new(command_timeout: Duration) -> Self {
        Self { command_timeout }
    }

    async fn fetch_all(
        &self,
        conn: &mut PgConnection,
        query: PgQuery<'_>,
        operation: &str,
    ) -> DbResult<Vec<PgRow>> {
        tokio::time::timeout(self.command_timeout, query.fetch_all(&mut *conn))
            .await
            .map_err(|_| DbError::timeout(operation, self.command_timeout.as_secs()))?
            .map_err(DbError::from)
    }

    /// Table names in `schema`, ordered by name.
    pub async fn list_tables(
        &self,
        conn: &mut PgConnection,
        schema: &str,
        include_system: bool,
    ) -> DbResult<Vec<String>> {
        let sql = if include_system {
            queries::LIST_TABLES_WITH_SYSTEM
        } else {
            queries::LIST_TABLES
        };
        let rows = self
            .fetch_all(conn, sqlx::query(sql).bind(schema), "listing tables")
            .await?;

        let tables = rows
            .iter()
            .map(|row| row.try_get::<String, _>("tablename"))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(count = tables.len(), schema = schema, "Listed tables");
        Ok(tables)
    }

    pub async fn fetch_columns(
        &self,
        conn: &mut PgConnection,
        schema: &str,
        table: &str,
    ) -> DbResult<Vec<ColumnInfo>> {
        let query = sqlx::query(queries::DESCRIBE_COLUMNS)
            .bind(schema)
            .bind(table);
        let rows = self.fetch_all(conn, query, "describing columns").await?;

        rows.iter()
            .map(|row| -> DbResult<ColumnInfo> {
                Ok(ColumnInfo {
                    column_name: row.try_get("column_name")?,
                    data_type: row.try_get("data_type")?,
                    character_maximum_length: row.try_get("character_maximum_length")?,
                    is_nullable: row.try_get("is_nullable")?,
                    column_default: row.try_get("column_default")?,
                })
            })
            .collect()
    }

    pub async fn fetch_constraints(
        &self,
        conn: &mut PgConnection,
        schema: &str,
        table: &str,
    ) -> DbResult<Vec<ConstraintInfo>> {
        let query = sqlx::query(queries::DESCRIBE_CONSTRAINTS)
            .bind(schema)
            .bind(table);
        let rows = self.fetch_all(conn, query, "describing constraints").await?;

        rows.iter()
            .map(|row| -> DbResult<ConstraintInfo> {
                Ok(ConstraintInfo {
                    constraint_name: row.try_get("constraint_name")?,
                    constraint_type: row.try_get("constraint_type")?,
                })
            })
            .collect()
    }

    pub async fn fetch_indexes(
        &self,
        conn: &mut PgConnection,
        schema: &str,
        table: &str,
    ) -> DbResult<Vec<IndexInfo>> {
        let query = sqlx::query(queries::DESCRIBE_INDEXES)
            .bind(schema)
            .bind(table);
        let rows = self.fetch_all(conn, query, "describing indexes").await?;

        rows.iter()
            .map(|row| -> DbResult<IndexInfo> {
                Ok(IndexInfo {
                    indexname: row.try_get("indexname")?,
                    indexdef: row.try_get("indexdef")?,
                })
            })
            .collect()
    }

    /// Live row count of `schema.table`.
    pub async fn count_rows(
        &self,
        conn: &mut PgConnection,
        schema: &str,
        table: &str,
    ) -> DbResult<i64> {
        let sql = count_rows_sql(schema, table);
        let rows = self
            .fetch_all(conn, sqlx::query(&sql), "counting rows")
            .await?;
        match rows.first() {
            Some(row) => Ok(row.try_get::<i64, _>("count")?),
            None => Ok(0),
        }
    }

    /// Stream every row of a table to `on_row`, decoded for literal rendering.
    /// Returns the number of rows read.
    ///
    /// Rows are read over the simple query protocol so every value arrives in
    /// text format; types without a dedicated decoder (intervals, network
    /// types, money, enums) keep their text rendering. The whole read is
    /// bounded by `limit`.
    pub async fn dump_rows<F>(
        &self,
        conn: &mut PgConnection,
        schema: &str,
        table: &str,
        limit: Duration,
        mut on_row: F,
    ) -> DbResult<u64>
    where
        F: FnMut(Vec<(String, PgValue)>) + Send,
    {
        let sql = select_all_sql(schema, table);
        let read = async {
            let mut rows = sqlx::raw_sql(&sql).fetch(&mut *conn);
            let mut count = 0u64;
            while let Some(row) = rows.try_next().await? {
                on_row(row_values_strict(&row)?);
                count += 1;
            }
            Ok::<_, DbError>(count)
        };
        tokio::time::timeout(limit, read)
            .await
            .map_err(|_| DbError::timeout("reading table data", limit.as_secs()))?
    }

    /// Tables of `schema` with their columns and constraints.
    pub async fn describe_schema(
        &self,
        conn: &mut PgConnection,
        schema: &str,
        include_system: bool,
    ) -> DbResult<Vec<TableSchema>> {
        let tables = self.list_tables(conn, schema, include_system).await?;
        let mut described = Vec::with_capacity(tables.len());
        for table in tables {
            let columns = self.fetch_columns(conn, schema, &table).await?;
            let constraints = self.fetch_constraints(conn, schema, &table).await?;
            described.push(TableSchema {
                table,
                columns,
                constraints,
            });
        }
        Ok(described)
    }

    /// Databases on the server, ordered by name.
    pub async fn list_databases(
        &self,
        conn: &mut PgConnection,
        include_system: bool,
    ) -> DbResult<Vec<DatabaseInfo>> {
        let query = sqlx::query(queries::LIST_DATABASES).bind(include_system);
        let rows = self.fetch_all(conn, query, "listing databases").await?;

        let databases = rows
            .iter()
            .map(database_from_row)
            .collect::<DbResult<Vec<_>>>()?;

        debug!(count = databases.len(), "Listed databases");
        Ok(databases)
    }

    pub async fn database_exists(&self, conn: &mut PgConnection, name: &str) -> DbResult<bool> {
        let query = sqlx::query(queries::DATABASE_EXISTS).bind(name);
        let rows = self
            .fetch_all(conn, query, "checking database existence")
            .await?;
        match rows.first() {
            Some(row) => Ok(row.try_get::<bool, _>(0)?),
            None => Ok(false),
        }
    }

    /// Terminate every other session connected to `name`. Returns how many
    /// sessions were signalled.
    pub async fn terminate_backends(&self, conn: &mut PgConnection, name: &str) -> DbResult<usize> {
        let query = sqlx::query(queries::TERMINATE_BACKENDS).bind(name);
        let rows = self
            .fetch_all(conn, query, "terminating connections")
            .await?;
        Ok(rows.len())
    }
}

fn database_from_row(row: &PgRow) -> DbResult<DatabaseInfo> {
    Ok(DatabaseInfo {
        name: row.try_get("name")?,
        owner: row.try_get("owner")?,
        encoding: row.try_get("encoding")?,
        collation: row.try_get("collation")?,
        ctype: row.try_get("ctype")?,
        size_bytes: row.try_get("size_bytes")?,
        size: row.try_get("size")?,
        allow_connections: row.try_get("allow_connections")?,
        connection_limit: row.try_get("connection_limit")?,
        active_connections: row.try_get("active_connections")?,
    })
}

fn count_rows_sql(schema: &str, table: &str) -> String {
    format!(
        "SELECT COUNT(*) AS count FROM {}.{}",
        quote_identifier(schema),
        quote_identifier(table)
    )
}

fn select_all_sql(schema: &str, table: &str) -> String {
    format!(
        "SELECT * FROM {}.{}",
        quote_identifier(schema),
        quote_identifier(table)
    )
}
