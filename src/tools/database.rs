//! Database lifecycle tools.
//!
//! This module implements `create_database`, `drop_database` and
//! `list_databases`. CREATE and DROP DATABASE cannot run inside a
//! transaction block, so both use a direct connection to the maintenance
//! database rather than the pool.

use crate::db::{ConnectionHandle, PoolManager, SYSTEM_DATABASES, SchemaInspector, execute_statement};
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseInfo, quote_identifier, quote_literal};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

fn default_encoding() -> String {
    "UTF8".to_string()
}

fn default_template() -> String {
    "template1".to_string()
}

fn default_true() -> bool {
    true
}

/// Input for the create_database tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CreateDatabaseInput {
    /// Name of the new database (letters, digits, underscore and hyphen only)
    pub database_name: String,
    /// Role that will own the database
    #[serde(default)]
    pub owner: Option<String>,
    /// Character set encoding. Default: UTF8
    #[serde(default = "default_encoding")]
    pub encoding: String,
    /// Template database to copy. Default: template1
    #[serde(default = "default_template")]
    pub template: String,
}

impl CreateDatabaseInput {
    pub fn named(database_name: impl Into<String>) -> Self {
        Self {
            database_name: database_name.into(),
            owner: None,
            encoding: default_encoding(),
            template: default_template(),
        }
    }
}

/// Output from the create_database tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct CreateDatabaseOutput {
    pub message: String,
    pub database_name: String,
    pub encoding: String,
    pub template: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

/// Input for the drop_database tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DropDatabaseInput {
    /// Database to drop
    pub database_name: String,
    /// Terminate other sessions connected to the database first
    #[serde(default)]
    pub force: bool,
    /// Succeed without changes when the database does not exist. Default: true
    #[serde(default = "default_true")]
    pub if_exists: bool,
}

/// Output from the drop_database tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct DropDatabaseOutput {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forced: Option<bool>,
}

/// Input for the list_databases tool.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ListDatabasesInput {
    /// Include postgres, template0 and template1
    #[serde(default)]
    pub include_system_databases: bool,
}

/// Output from the list_databases tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ListDatabasesOutput {
    pub database_count: usize,
    pub databases: Vec<DatabaseInfo>,
}

pub struct DatabaseToolHandler {
    pool: Arc<PoolManager>,
    inspector: SchemaInspector,
}

impl DatabaseToolHandler {
    pub fn new(pool: Arc<PoolManager>) -> Self {
        let inspector = SchemaInspector::new(pool.command_timeout());
        Self { pool, inspector }
    }

    pub async fn create_database(
        &self,
        input: CreateDatabaseInput,
    ) -> DbResult<CreateDatabaseOutput> {
        validate_database_name(&input.database_name)?;
        let sql = create_database_sql(&input);

        let mut handle = self.pool.acquire_maintenance().await?;
        let result = self.create_on(&mut handle, &input.database_name, &sql).await;
        handle.release().await;
        result?;

        info!(database = %input.database_name, "Database created");
        Ok(CreateDatabaseOutput {
            message: format!("Database '{}' created successfully", input.database_name),
            database_name: input.database_name,
            encoding: input.encoding,
            template: input.template,
            owner: input.owner,
        })
    }

    async fn create_on(
        &self,
        handle: &mut ConnectionHandle,
        name: &str,
        sql: &str,
    ) -> DbResult<()> {
        if self.inspector.database_exists(handle.conn(), name).await? {
            return Err(DbError::already_exists(format!("Database '{}'", name)));
        }
        execute_statement(handle.conn(), sql, &[], self.pool.command_timeout()).await?;
        Ok(())
    }

    /// Create `name` with default options unless it already exists.
    /// Returns true when the database was created.
    pub async fn ensure_database(&self, name: &str) -> DbResult<bool> {
        match self.create_database(CreateDatabaseInput::named(name)).await {
            Ok(_) => Ok(true),
            Err(DbError::AlreadyExists { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn drop_database(&self, input: DropDatabaseInput) -> DbResult<DropDatabaseOutput> {
        validate_database_name(&input.database_name)?;
        if is_protected_database(&input.database_name) {
            return Err(DbError::invalid_input(format!(
                "Cannot drop system database '{}'",
                input.database_name
            )));
        }

        let mut handle = self.pool.acquire_maintenance().await?;
        let result = self.drop_on(&mut handle, &input).await;
        handle.release().await;
        let dropped = result?;

        if !dropped {
            return Ok(DropDatabaseOutput {
                message: format!(
                    "Database '{}' does not exist (skipped)",
                    input.database_name
                ),
                database_name: None,
                forced: None,
            });
        }

        info!(database = %input.database_name, forced = input.force, "Database dropped");
        Ok(DropDatabaseOutput {
            message: format!("Database '{}' dropped successfully", input.database_name),
            database_name: Some(input.database_name),
            forced: Some(input.force),
        })
    }

    /// Returns false when the database was absent and `if_exists` allowed skipping.
    async fn drop_on(
        &self,
        handle: &mut ConnectionHandle,
        input: &DropDatabaseInput,
    ) -> DbResult<bool> {
        let name = &input.database_name;
        if !self.inspector.database_exists(handle.conn(), name).await? {
            if input.if_exists {
                return Ok(false);
            }
            return Err(DbError::not_found(format!("Database '{}'", name)));
        }

        if input.force {
            let terminated = self.inspector.terminate_backends(handle.conn(), name).await?;
            warn!(database = %name, terminated = terminated, "Terminated connections before drop");
        }

        let sql = drop_database_sql(name, input.if_exists);
        execute_statement(handle.conn(), &sql, &[], self.pool.command_timeout()).await?;
        Ok(true)
    }

    pub async fn list_databases(&self, input: ListDatabasesInput) -> DbResult<ListDatabasesOutput> {
        let mut handle = self.pool.acquire(None).await?;
        let result = self
            .inspector
            .list_databases(handle.conn(), input.include_system_databases)
            .await;
        handle.release().await;
        let databases = result?;

        Ok(ListDatabasesOutput {
            database_count: databases.len(),
            databases,
        })
    }
}

/// Accept only ASCII letters, digits, underscore and hyphen.
pub fn validate_database_name(name: &str) -> DbResult<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(DbError::invalid_input(
            "Invalid database name. Use only alphanumeric characters, underscores, and hyphens.",
        ));
    }
    Ok(())
}

pub fn is_protected_database(name: &str) -> bool {
    SYSTEM_DATABASES
        .iter()
        .any(|system| system.eq_ignore_ascii_case(name))
}

fn create_database_sql(input: &CreateDatabaseInput) -> String {
    let mut sql = format!("CREATE DATABASE {}", quote_identifier(&input.database_name));

    if let Some(owner) = input.owner.as_deref().filter(|o| !o.is_empty()) {
        sql.push_str(&format!(" OWNER = {}", quote_identifier(owner)));
    }
    if !input.encoding.is_empty() {
        sql.push_str(&format!(" ENCODING = {}", quote_literal(&input.encoding)));
    }
    if !input.template.is_empty() {
        sql.push_str(&format!(" TEMPLATE = {}", quote_identifier(&input.template)));
    }
    sql
}

fn drop_database_sql(name: &str, if_exists: bool) -> String {
    format!(
        "DROP DATABASE {}{}",
        if if_exists { "IF EXISTS " } else { "" },
        quote_identifier(name)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_database_name() {
        for name in ["app", "app_2", "my-db", "A1"] {
            assert!(validate_database_name(name).is_ok(), "{}", name);
        }
        for name in ["", "db; DROP TABLE x", "a b", "caf\u{e9}", "x\"y", "a.b"] {
            let err = validate_database_name(name).unwrap_err();
            assert_eq!(err.kind(), "validation_error", "{}", name);
        }
    }

    #[test]
    fn test_protected_databases_any_case() {
        assert!(is_protected_database("postgres"));
        assert!(is_protected_database("Template0"));
        assert!(is_protected_database("TEMPLATE1"));
        assert!(!is_protected_database("postgres2"));
    }

    #[test]
    fn test_create_database_sql_defaults() {
        let input = CreateDatabaseInput::named("app");
        assert_eq!(
            create_database_sql(&input),
            "CREATE DATABASE \"app\" ENCODING = 'UTF8' TEMPLATE = \"template1\""
        );
    }

    #[test]
    fn test_create_database_sql_escapes_components() {
        let input = CreateDatabaseInput {
            database_name: "app".to_string(),
            owner: Some("o\"wner".to_string()),
            encoding: "UTF'8".to_string(),
            template: "template0".to_string(),
        };
        assert_eq!(
            create_database_sql(&input),
            "CREATE DATABASE \"app\" OWNER = \"o\"\"wner\" ENCODING = 'UTF''8' TEMPLATE = \"template0\""
        );
    }

    #[test]
    fn test_drop_database_sql() {
        assert_eq!(drop_database_sql("app", true), "DROP DATABASE IF EXISTS \"app\"");
        assert_eq!(drop_database_sql("app", false), "DROP DATABASE \"app\"");
    }

    #[test]
    fn test_drop_input_defaults() {
        let input: DropDatabaseInput = serde_json::from_str(r#"{"database_name": "x"}"#).unwrap();
        assert!(!input.force);
        assert!(input.if_exists);
    }

    #[tokio::test]
    async fn test_protected_drop_rejected_before_connecting() {
        use crate::config::PoolSettings;
        use crate::db::StaticCredential;

        let provider =
            Arc::new(StaticCredential::from_url("postgres://u:p@127.0.0.1:1/app").unwrap());
        let handler = DatabaseToolHandler::new(Arc::new(PoolManager::new(
            provider,
            PoolSettings::default(),
            "postgres",
        )));

        for (force, if_exists) in [(false, false), (true, true), (true, false)] {
            let err = handler
                .drop_database(DropDatabaseInput {
                    database_name: "template1".to_string(),
                    force,
                    if_exists,
                })
                .await
                .unwrap_err();
            assert!(err.to_string().contains("Cannot drop system database"));
        }

        let err = handler
            .create_database(CreateDatabaseInput::named("db; DROP TABLE x"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }
}
