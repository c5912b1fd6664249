//! The MCP tool surface, built on rmcp's router macros.
//!
//! Every database tool hangs off [`MssqlService`]. Tools that execute
//! statements return structured outcomes with a `success` flag instead of
//! protocol errors, so clients always receive a payload they can inspect;
//! introspection tools report failures as MCP errors.

use crate::db::{PoolStats, QueryEngine};
use crate::models::{ProcedureOutcome, QueryOutcome, WriteOutcome};
use crate::tools::procedure::{ExecuteProcedureInput, ProcedureToolHandler};
use crate::tools::query::{QueryInput, QueryToolHandler};
use crate::tools::schema::{
    DescribeTableInput, ListDatabasesOutput, ListTablesInput, ListTablesOutput,
    SchemaToolHandler, TableDescription,
};
use crate::tools::write::{ExecuteWriteInput, WriteToolHandler};
use rmcp::Json;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct MssqlService {
    /// Execution engine shared by every tool call
    engine: Arc<QueryEngine>,
    /// Dispatch table generated by the `tool_router` macro
    tool_router: ToolRouter<Self>,
}

impl MssqlService {
    pub fn new(engine: Arc<QueryEngine>) -> Self {
        Self {
            engine,
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router]
impl MssqlService {
    #[tool(
        description = "Execute a SQL query (SELECT only by default) against the database.\nResults are capped at max_rows (default 1000). Multi-statement batches are rejected."
    )]
    async fn mssql_query(
        &self,
        Parameters(input): Parameters<QueryInput>,
    ) -> Json<QueryOutcome> {
        let handler = QueryToolHandler::new(self.engine.clone());
        Json(handler.query(input).await)
    }

    #[tool(description = "List all accessible databases on the server.")]
    async fn mssql_list_databases(&self) -> Result<Json<ListDatabasesOutput>, McpError> {
        let handler = SchemaToolHandler::new(self.engine.clone());
        handler.list_databases().await.map(Json).map_err(Into::into)
    }

    #[tool(description = "List all tables in a specific database and schema.")]
    async fn mssql_list_tables(
        &self,
        Parameters(input): Parameters<ListTablesInput>,
    ) -> Result<Json<ListTablesOutput>, McpError> {
        let handler = SchemaToolHandler::new(self.engine.clone());
        handler.list_tables(input).await.map(Json).map_err(Into::into)
    }

    #[tool(description = "Get detailed schema information for a specific table.")]
    async fn mssql_describe_table(
        &self,
        Parameters(input): Parameters<DescribeTableInput>,
    ) -> Result<Json<TableDescription>, McpError> {
        let handler = SchemaToolHandler::new(self.engine.clone());
        handler.describe_table(input).await.map(Json).map_err(Into::into)
    }

    #[tool(description = "Get connection pool statistics for monitoring performance.")]
    async fn mssql_pool_stats(&self) -> Json<PoolStats> {
        Json(self.engine.pool_stats())
    }

    #[tool(
        description = "Execute a stored procedure with parameters (requires MSSQL_ALLOW_WRITE_OPERATIONS=true)."
    )]
    async fn mssql_execute_procedure(
        &self,
        Parameters(input): Parameters<ExecuteProcedureInput>,
    ) -> Json<ProcedureOutcome> {
        let handler = ProcedureToolHandler::new(self.engine.clone());
        Json(handler.execute_procedure(input).await)
    }

    #[tool(
        description = "Execute INSERT, UPDATE, DELETE statements (requires MSSQL_ALLOW_WRITE_OPERATIONS=true)."
    )]
    async fn mssql_execute_write(
        &self,
        Parameters(input): Parameters<ExecuteWriteInput>,
    ) -> Json<WriteOutcome> {
        let handler = WriteToolHandler::new(self.engine.clone());
        Json(handler.execute_write(input).await)
    }
}

#[tool_handler]
impl ServerHandler for MssqlService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "mssql-mcp-server".to_owned(),
                title: Some("MSSQL MCP Server".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Tools for querying and inspecting a Microsoft SQL Server database.\n\
                \n\
                ## Workflow\n\
                1. Use `mssql_list_databases` and `mssql_list_tables` to explore the server\n\
                2. Use `mssql_describe_table` to see column definitions before writing queries\n\
                3. Use `mssql_query` for SELECT statements; results are capped at max_rows\n\
                \n\
                ## Modes\n\
                - **Read-only** (default): only SELECT/CTE statements are admitted\n\
                - **Write-enabled** (MSSQL_ALLOW_WRITE_OPERATIONS=true): additionally allows\n\
                  `mssql_execute_write` (INSERT/UPDATE/DELETE) and `mssql_execute_procedure`\n\
                \n\
                ## Notes\n\
                - Multi-statement batches are always rejected; run one statement per call\n\
                - Execution tools report failures in the payload (`success: false`) rather\n\
                  than as protocol errors\n\
                - `mssql_execute_write` supports `dry_run: true` to validate without executing"
                    .to_string(),
            ),
        }
    }
}
