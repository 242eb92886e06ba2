//! Transaction block tool.
//!
//! This module implements the `execute_transaction` MCP tool. All statements
//! of a block run in order on one connection inside one transaction at the
//! requested isolation level. The first failure rolls the whole block back
//! and no partial results are returned.

use crate::db::{PoolManager, run_statement};
use crate::error::{DbError, DbResult};
use crate::models::{IsolationLevel, QueryParamInput, StatementOutcome, into_params};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sqlx::Connection;
use std::sync::Arc;
use tracing::{info, warn};

/// One statement of a transaction block.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct TransactionStatement {
    /// SQL statement
    pub query: String,
    /// Positional parameters for $1, $2, ... placeholders
    #[serde(default)]
    pub params: Vec<QueryParamInput>,
}

/// Input for the execute_transaction tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct TransactionInput {
    /// Statements to execute in order; all succeed or none take effect
    pub statements: Vec<TransactionStatement>,
    /// Isolation level. Default: read_committed
    #[serde(default)]
    pub isolation_level: IsolationLevel,
}

/// Result of one statement inside a committed block.
#[derive(Debug, Clone, Serialize)]
pub struct StatementResult {
    pub query: String,
    #[serde(flatten)]
    pub outcome: StatementOutcome,
}

/// Output from the execute_transaction tool.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionOutput {
    pub message: String,
    pub isolation_level: IsolationLevel,
    pub results: Vec<StatementResult>,
}

pub struct TransactionToolHandler {
    pool: Arc<PoolManager>,
}

impl TransactionToolHandler {
    pub fn new(pool: Arc<PoolManager>) -> Self {
        Self { pool }
    }

    pub async fn execute_transaction(&self, input: TransactionInput) -> DbResult<TransactionOutput> {
        validate_statements(&input.statements)?;

        let mut handle = self.pool.acquire(None).await?;
        let result = self
            .run_block(handle.conn(), &input.statements, input.isolation_level)
            .await;
        handle.release().await;
        let results = result?;

        info!(
            statements = results.len(),
            isolation_level = %input.isolation_level,
            "Transaction committed"
        );

        Ok(TransactionOutput {
            message: "Transaction completed successfully".to_string(),
            isolation_level: input.isolation_level,
            results,
        })
    }

    async fn run_block(
        &self,
        conn: &mut sqlx::PgConnection,
        statements: &[TransactionStatement],
        isolation_level: IsolationLevel,
    ) -> DbResult<Vec<StatementResult>> {
        let timeout = self.pool.command_timeout();
        let mut tx = conn.begin().await?;

        let isolation_sql = format!("SET TRANSACTION ISOLATION LEVEL {}", isolation_level.as_sql());
        let mut results = Vec::with_capacity(statements.len());
        let mut failure = run_statement(&mut tx, &isolation_sql, &[], timeout)
            .await
            .err();

        if failure.is_none() {
            for (index, statement) in statements.iter().enumerate() {
                let params = into_params(statement.params.clone());
                match run_statement(&mut tx, &statement.query, &params, timeout).await {
                    Ok(outcome) => results.push(StatementResult {
                        query: statement.query.clone(),
                        outcome,
                    }),
                    Err(e) => {
                        warn!(statement = index + 1, error = %e, "Transaction statement failed");
                        failure = Some(e);
                        break;
                    }
                }
            }
        }

        if let Some(error) = failure {
            if let Err(e) = tx.rollback().await {
                warn!(error = %e, "Rollback failed");
            }
            return Err(error);
        }

        tx.commit().await?;
        Ok(results)
    }
}

fn validate_statements(statements: &[TransactionStatement]) -> DbResult<()> {
    if statements.is_empty() {
        return Err(DbError::invalid_input(
            "Transaction must contain at least one statement",
        ));
    }
    if let Some(index) = statements.iter().position(|s| s.query.trim().is_empty()) {
        return Err(DbError::invalid_input(format!(
            "Statement {} has an empty query",
            index + 1
        )));
    }
    Ok(())
}
