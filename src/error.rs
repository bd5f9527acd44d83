//! Error types for sqlbind.

use thiserror::Error;

use crate::types::ColumnType;

/// Result type for sqlbind operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Client error code: server has gone away.
pub const CR_SERVER_GONE_ERROR: u16 = 2006;
/// Client error code: lost connection to server during query.
pub const CR_SERVER_LOST: u16 = 2013;

/// Error reported by the server (or the driver on its behalf) for a statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerError {
    /// Numeric error code
    pub code: u16,
    /// SQLSTATE (5 characters), if the driver reported one
    pub sql_state: Option<String>,
    /// Human readable message
    pub message: String,
}

impl ServerError {
    /// Create a server error without an SQLSTATE.
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            sql_state: None,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ERROR {}", self.code)?;
        if let Some(state) = &self.sql_state {
            write!(f, " ({})", state)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Error type for sqlbind.
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to establish the connection, or the link was lost
    #[error("Connection error: {0}")]
    Connection(String),

    /// The server rejected or failed a statement
    #[error("Query error: {0}")]
    Query(ServerError),

    /// Column-count mismatch, NULL into a non-nullable slot, or conversion failure
    #[error("Decode error: {0}")]
    Decode(String),

    /// Wrong parameter arity or an untranslatable parameter value
    #[error("Parameter binding error: {0}")]
    ParameterBinding(String),

    /// Transaction started while active, or finished twice
    #[error("Transaction error: {0}")]
    TransactionState(String),

    /// Invalid usage (e.g., running a statement on a foreign connection)
    #[error("Invalid usage: {0}")]
    InvalidUsage(String),
}

impl Error {
    /// Returns true if the error indicates the connection is broken and cannot be reused.
    pub fn is_connection_broken(&self) -> bool {
        match self {
            Error::Connection(_) => true,
            Error::Query(err) => matches!(err.code, CR_SERVER_GONE_ERROR | CR_SERVER_LOST),
            _ => false,
        }
    }

    /// Get the server error code if this is a query error.
    pub fn server_code(&self) -> Option<u16> {
        match self {
            Error::Query(err) => Some(err.code),
            _ => None,
        }
    }

    pub(crate) fn type_mismatch(value_type: ColumnType, target: ColumnType) -> Self {
        Error::ParameterBinding(format!(
            "cannot bind {:?} value to a {:?} parameter",
            value_type, target
        ))
    }

    pub(crate) fn overflow(from: &str, target: ColumnType) -> Self {
        Error::ParameterBinding(format!("{} value out of range for {:?}", from, target))
    }
}

impl From<ServerError> for Error {
    fn from(err: ServerError) -> Self {
        Error::Query(err)
    }
}

impl From<core::convert::Infallible> for Error {
    fn from(err: core::convert::Infallible) -> Self {
        match err {}
    }
}
