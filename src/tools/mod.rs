//! MCP tool implementations.
//!
//! This module contains the database tool handlers:
//! - `query`: Execute SQL queries with admission control and a row cap
//! - `schema`: List databases and tables, describe table structure
//! - `procedure`: Execute stored procedures (write-enabled deployments only)
//! - `write`: Execute INSERT/UPDATE/DELETE statements (write-enabled only)

pub mod procedure;
pub mod query;
pub mod schema;
pub mod write;

pub use procedure::{ExecuteProcedureInput, ProcedureToolHandler};
pub use query::{QueryInput, QueryToolHandler};
pub use schema::{
    DescribeTableInput, ListDatabasesOutput, ListTablesInput, ListTablesOutput,
    SchemaToolHandler, TableDescription,
};
pub use write::{ExecuteWriteInput, WriteToolHandler};
