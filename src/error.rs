//! Error types for the MSSQL MCP Server.
//!
//! One `thiserror` enum covers the whole crate. Variants distinguish
//! admission rejections from driver and server failures so callers can
//! report them differently, and most carry a recovery hint surfaced to the
//! client through the MCP error `data` field.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    /// Statement failed admission checks before touching the database.
    #[error("{message}")]
    Validation { message: String },

    /// Operation requires the write-enable flag, which is off.
    #[error("{message}")]
    Disabled { message: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    /// Error reported by SQL Server while running a statement.
    #[error("Database error: {message}")]
    Database {
        message: String,
        /// Server-side error number, e.g. 208 for "Invalid object name".
        code: Option<u32>,
        suggestion: String,
    },

    #[error("Database not found: {database}")]
    DatabaseNotFound { database: String },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a validation error carrying an admission-rejection reason.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a feature-disabled error.
    pub fn disabled(message: impl Into<String>) -> Self {
        Self::Disabled {
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Server-reported statement failure; `code` is the SQL Server error number.
    pub fn database(
        message: impl Into<String>,
        code: Option<u32>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            code,
            suggestion: suggestion.into(),
        }
    }

    pub fn database_not_found(database: impl Into<String>) -> Self {
        Self::DatabaseNotFound {
            database: database.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error is an admission rejection (statement never ran).
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::Disabled { .. })
    }

    /// Recovery hint attached to this error, when one exists.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }
}

/// Convert tiberius errors to DbError.
impl From<tiberius::error::Error> for DbError {
    fn from(err: tiberius::error::Error) -> Self {
        use tiberius::error::Error;
        match err {
            Error::Server(token) => DbError::database(
                token.message().to_string(),
                Some(token.code()),
                "Check the statement syntax and the referenced object names",
            ),
            Error::Io { message, .. } => DbError::connection(
                format!("I/O error: {}", message),
                "Check network connectivity and SQL Server availability",
            ),
            Error::Tls(message) => DbError::connection(
                format!("TLS error: {}", message),
                "Verify the encryption and trust-certificate settings",
            ),
            Error::Routing { host, port } => DbError::connection(
                format!("Server requested rerouting to {}:{}", host, port),
                "Connect directly to the routed address",
            ),
            Error::Protocol(message) => DbError::connection(
                format!("Protocol error: {}", message),
                "Check SQL Server version compatibility",
            ),
            Error::Conversion(message) => {
                DbError::internal(format!("Type conversion error: {}", message))
            }
            other => DbError::internal(format!("Driver error: {}", other)),
        }
    }
}

pub type DbResult<T> = Result<T, DbError>;

/// Recovery hint packaged for the MCP error `data` object.
fn suggestion_data(suggestion: Option<&str>) -> Option<serde_json::Value> {
    suggestion.map(|s| serde_json::json!({ "suggestion": s }))
}

/// Maps each variant onto the closest JSON-RPC error category so MCP
/// clients can tell a rejected request from a broken server.
impl From<DbError> for rmcp::ErrorData {
    fn from(err: DbError) -> Self {
        match &err {
            // Admission and feature-gate rejections -> invalid_params
            DbError::Validation { .. } => {
                rmcp::ErrorData::invalid_params(err.to_string(), suggestion_data(err.suggestion()))
            }
            DbError::Disabled { .. } => rmcp::ErrorData::invalid_params(
                err.to_string(),
                suggestion_data(Some(
                    "Set MSSQL_ALLOW_WRITE_OPERATIONS=true to enable write operations",
                )),
            ),

            DbError::DatabaseNotFound { .. } => rmcp::ErrorData::resource_not_found(
                err.to_string(),
                suggestion_data(Some("List available databases with mssql_list_databases")),
            ),

            // Server-side statement errors -> invalid_params with the error number
            DbError::Database {
                message,
                code,
                suggestion,
            } => {
                let msg = match code {
                    Some(number) => format!("{} (error {})", message, number),
                    None => message.clone(),
                };
                rmcp::ErrorData::invalid_params(msg, suggestion_data(Some(suggestion)))
            }

            // Connection, Timeout, Internal -> internal_error
            DbError::Connection { suggestion, .. } => {
                rmcp::ErrorData::internal_error(err.to_string(), suggestion_data(Some(suggestion)))
            }
            DbError::Timeout { .. } => rmcp::ErrorData::internal_error(
                err.to_string(),
                suggestion_data(Some("Raise the timeout or make the operation cheaper")),
            ),
            DbError::Internal { .. } => {
                rmcp::ErrorData::internal_error(err.to_string(), suggestion_data(err.suggestion()))
            }
        }
    }
}
