//! MCP service implementation using rmcp.
//!
//! [`PgService`] advertises the tool catalog and forwards every call to the
//! shared [`ToolDispatcher`]. Tool failures are reported inside the result
//! envelope (with `is_error` set), never as protocol errors.

use crate::tools::{ResultEnvelope, ToolDefinition, ToolDispatcher};
use rmcp::{
    ErrorData as McpError, RoleServer, ServerHandler,
    model::{
        CallToolRequestParam, CallToolResult, Content, Implementation, ListToolsResult,
        PaginatedRequestParam, ProtocolVersion, ServerCapabilities, ServerInfo, Tool,
    },
    service::RequestContext,
};
use serde_json::Value as JsonValue;
use std::sync::Arc;

const INSTRUCTIONS: &str = "PostgreSQL tools for querying, changing and administering databases.\n\
\n\
## Tool families\n\
- Queries: `select`, `execute_raw_sql` (use $1, $2, ... placeholders with `params`)\n\
- Writes: `insert`, `update`, `delete` (RETURNING rows are included in the result)\n\
- Definitions: `create_table`, `alter_table`, `drop_table`, `create_index`, `drop_index`\n\
- Transactions: `execute_transaction` runs a list of statements atomically at a chosen isolation level\n\
- Introspection: `get_schema_info`, `get_table_info`\n\
- Databases: `create_database`, `drop_database`, `list_databases`\n\
- Backups: `backup_database`, `restore_database`, `list_backups`, `check_backup_tools`\n\
\n\
## Results\n\
Every tool returns a JSON object with `success`. Failures carry `error`, `error_kind` and `tool`,\n\
plus `suggestion` or `stderr` when available.\n\
\n\
## Backups\n\
pg_dump/pg_restore are used when installed. Without them backups are written as plain SQL\n\
and only .sql/.sql.gz files can be restored. Call `check_backup_tools` to see what is available.";

#[derive(Clone)]
pub struct PgService {
    dispatcher: Arc<ToolDispatcher>,
}

impl PgService {
    pub fn new(dispatcher: Arc<ToolDispatcher>) -> Self {
        Self { dispatcher }
    }

    fn to_tool(definition: ToolDefinition) -> Tool {
        Tool::new(
            definition.name,
            definition.description,
            Arc::new(definition.input_schema),
        )
    }
}

/// Wrap an envelope as MCP content.
pub fn envelope_result(envelope: ResultEnvelope) -> CallToolResult {
    let content = vec![Content::text(envelope.to_json_string())];
    if envelope.is_success() {
        CallToolResult::success(content)
    } else {
        CallToolResult::error(content)
    }
}

impl ServerHandler for PgService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "pg-mcp-server".to_owned(),
                title: Some("PostgreSQL MCP Server".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(INSTRUCTIONS.to_string()),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        let tools = self
            .dispatcher
            .list_tools()
            .into_iter()
            .map(Self::to_tool)
            .collect();
        Ok(ListToolsResult::with_all_items(tools))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let args = request
            .arguments
            .map(JsonValue::Object)
            .unwrap_or(JsonValue::Null);
        let envelope = self.dispatcher.invoke(&request.name, args).await;
        Ok(envelope_result(envelope))
    }
}
