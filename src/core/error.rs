use thiserror::Error;

/// The single error type shared by drivers and the legacy adapters.
///
/// Drivers construct these; the adapters only ever relay them, so a caller
/// always sees the variant the underlying layer produced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DbError {
    #[error("Invalid connection string: {0}")]
    InvalidUri(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Invalid option: {0}")]
    InvalidOption(String),

    #[error("Client is closed")]
    ClientClosed,

    #[error("Collection '{0}' not found")]
    CollectionNotFound(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid update: {0}")]
    InvalidUpdate(String),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Write error: {0}")]
    WriteError(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

impl<T> From<std::sync::PoisonError<T>> for DbError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<url::ParseError> for DbError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUri(err.to_string())
    }
}

impl From<bson::ser::Error> for DbError {
    fn from(err: bson::ser::Error) -> Self {
        Self::WriteError(err.to_string())
    }
}

impl From<regex::Error> for DbError {
    fn from(err: regex::Error) -> Self {
        Self::InvalidQuery(err.to_string())
    }
}
