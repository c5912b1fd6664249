//! Schema introspection tools.
//!
//! This module implements the `mssql_list_databases`, `mssql_list_tables`,
//! and `mssql_describe_table` MCP tools. Catalog queries bind user-supplied
//! names as parameters; the optional cross-database prefix is the only
//! interpolated piece and is identifier-checked first.

use crate::db::{QueryEngine, validator};
use crate::error::{DbError, DbResult};
use crate::models::{Row, SqlParam};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

fn default_schema() -> String {
    "dbo".to_string()
}

/// Input for the mssql_list_tables tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListTablesInput {
    /// Target database. Defaults to the connection's database.
    #[serde(default)]
    pub database: Option<String>,
    /// Schema name. Default: "dbo"
    #[serde(default = "default_schema")]
    pub schema: String,
}

/// Input for the mssql_describe_table tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DescribeTableInput {
    /// Table name
    pub table_name: String,
    /// Schema name. Default: "dbo"
    #[serde(default = "default_schema")]
    pub schema: String,
    /// Target database. Defaults to the connection's database.
    #[serde(default)]
    pub database: Option<String>,
}

/// Output for the mssql_list_databases tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ListDatabasesOutput {
    /// One row per online database: name, state, recovery model, compatibility level
    pub databases: Vec<Row>,
    /// Number of databases returned
    pub count: usize,
}

/// Output for the mssql_list_tables tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ListTablesOutput {
    /// One row per table: name, schema, create/modify dates, row count
    pub tables: Vec<Row>,
    /// Number of tables returned
    pub count: usize,
}

/// Output for the mssql_describe_table tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct TableDescription {
    /// Table name as requested
    pub table: String,
    /// Schema the table was looked up in
    pub schema: String,
    /// One row per column: name, type, max_length, nullability, default
    pub columns: Vec<Row>,
    /// Names of the primary key columns, if any
    pub primary_key: Vec<String>,
}

// =============================================================================
// Catalog queries
// =============================================================================
//
// Adapted to the sys.* catalog views. The `prefix` argument is either empty
// or a bracketed, identifier-checked database name ending in a dot, which
// lets one connection introspect a sibling database without switching
// context.

mod catalog {
    pub const LIST_DATABASES: &str = r#"
        SELECT
            name,
            state_desc AS state,
            recovery_model_desc AS recovery_model,
            compatibility_level
        FROM sys.databases
        WHERE state = 0
        ORDER BY name
        "#;

    pub fn list_tables(prefix: &str) -> String {
        format!(
            r#"
        SELECT
            t.name AS table_name,
            s.name AS schema_name,
            t.create_date,
            t.modify_date,
            (SELECT SUM(row_count)
             FROM {p}sys.dm_db_partition_stats
             WHERE object_id = t.object_id AND index_id < 2) AS row_count
        FROM {p}sys.tables t
        JOIN {p}sys.schemas s ON t.schema_id = s.schema_id
        WHERE s.name = @P1
        ORDER BY t.name
        "#,
            p = prefix
        )
    }

    pub fn describe_columns(prefix: &str) -> String {
        format!(
            r#"
        SELECT
            c.name,
            ty.name AS type,
            c.max_length,
            c.is_nullable,
            object_definition(c.default_object_id) AS default_value
        FROM {p}sys.columns c
        JOIN {p}sys.types ty ON c.user_type_id = ty.user_type_id
        JOIN {p}sys.tables t ON c.object_id = t.object_id
        JOIN {p}sys.schemas s ON t.schema_id = s.schema_id
        WHERE t.name = @P1 AND s.name = @P2
        ORDER BY c.column_id
        "#,
            p = prefix
        )
    }

    pub fn primary_key(prefix: &str) -> String {
        format!(
            r#"
        SELECT c.name
        FROM {p}sys.indexes i
        JOIN {p}sys.index_columns ic ON i.object_id = ic.object_id AND i.index_id = ic.index_id
        JOIN {p}sys.columns c ON ic.object_id = c.object_id AND ic.column_id = c.column_id
        JOIN {p}sys.tables t ON i.object_id = t.object_id
        JOIN {p}sys.schemas s ON t.schema_id = s.schema_id
        WHERE i.is_primary_key = 1
          AND t.name = @P1 AND s.name = @P2
        "#,
            p = prefix
        )
    }
}

/// Build the cross-database qualifier for catalog queries, or an empty
/// string when no database was requested.
fn database_prefix(database: Option<&str>) -> DbResult<String> {
    match database {
        None => Ok(String::new()),
        Some(db) => {
            if !validator::is_valid_identifier(db) {
                return Err(DbError::validation(format!(
                    "Invalid database name format: {db}"
                )));
            }
            Ok(format!("[{db}]."))
        }
    }
}

/// Handler for schema introspection.
pub struct SchemaToolHandler {
    engine: Arc<QueryEngine>,
}

impl SchemaToolHandler {
    pub fn new(engine: Arc<QueryEngine>) -> Self {
        Self { engine }
    }

    /// List every online database on the server.
    pub async fn list_databases(&self) -> DbResult<ListDatabasesOutput> {
        let databases = self.engine.fetch_catalog(catalog::LIST_DATABASES, &[]).await?;
        let count = databases.len();
        info!(count, "Listed databases");
        Ok(ListDatabasesOutput { databases, count })
    }

    /// List tables in one schema, with creation dates and row counts.
    pub async fn list_tables(&self, input: ListTablesInput) -> DbResult<ListTablesOutput> {
        let prefix = database_prefix(input.database.as_deref())?;
        let statement = catalog::list_tables(&prefix);
        let tables = self
            .engine
            .fetch_catalog(&statement, &[SqlParam::String(input.schema.clone())])
            .await?;
        let count = tables.len();
        info!(schema = %input.schema, count, "Listed tables");
        Ok(ListTablesOutput { tables, count })
    }

    /// Describe one table: column definitions plus primary key columns.
    pub async fn describe_table(&self, input: DescribeTableInput) -> DbResult<TableDescription> {
        let prefix = database_prefix(input.database.as_deref())?;
        let params = [
            SqlParam::String(input.table_name.clone()),
            SqlParam::String(input.schema.clone()),
        ];

        let columns = self
            .engine
            .fetch_catalog(&catalog::describe_columns(&prefix), &params)
            .await?;
        let key_rows = self
            .engine
            .fetch_catalog(&catalog::primary_key(&prefix), &params)
            .await?;
        let primary_key: Vec<String> = key_rows
            .iter()
            .filter_map(|row| row.get("name").and_then(|v| v.as_str()))
            .map(str::to_string)
            .collect();

        info!(
            table = %input.table_name,
            schema = %input.schema,
            column_count = columns.len(),
            "Described table"
        );

        Ok(TableDescription {
            table: input.table_name,
            schema: input.schema,
            columns,
            primary_key,
        })
    }
}
