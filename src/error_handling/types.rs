use std::fmt;

use sea_orm::DbErr;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    BadBindAddress(String),
    BadPortsRange(String),
    BadRetention(String),
    BadBatchSize(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::BadBindAddress(e) => write!(f, "Bind address error: {}", e),
            ConfigError::BadPortsRange(e) => write!(f, "Port range error: {}", e),
            ConfigError::BadRetention(e) => write!(f, "Retention error: {}", e),
            ConfigError::BadBatchSize(e) => write!(f, "Batch size error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

#[derive(Debug)]
pub enum StorageError {
    ConnectionFailed,
    WriteFailed,
    ReadFailed,
    Database(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::ConnectionFailed => write!(f, "Storage connection failed"),
            StorageError::WriteFailed => write!(f, "Storage write failed"),
            StorageError::ReadFailed => write!(f, "Storage read failed"),
            StorageError::Database(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<DbErr> for StorageError {
    fn from(err: DbErr) -> Self {
        StorageError::Database(err.to_string())
    }
}

/// Failure modes of the guarded accreditation operations.
///
/// `NotFound`, `Conflict` and `Validation` carry the HTTP-facing semantics
/// (404 / 409 / 400); everything unexpected collapses into `Storage` and is
/// surfaced as a generic 500 at the web boundary.
#[derive(Debug)]
pub enum OperationError {
    NotFound,
    Conflict(String),
    Validation(String),
    Storage(StorageError),
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationError::NotFound => write!(f, "Accreditation not found"),
            OperationError::Conflict(e) => write!(f, "Conflict: {}", e),
            OperationError::Validation(e) => write!(f, "Validation error: {}", e),
            OperationError::Storage(e) => write!(f, "Storage error: {}", e),
        }
    }
}

impl std::error::Error for OperationError {}

impl From<StorageError> for OperationError {
    fn from(err: StorageError) -> Self {
        OperationError::Storage(err)
    }
}

impl From<DbErr> for OperationError {
    fn from(err: DbErr) -> Self {
        OperationError::Storage(StorageError::from(err))
    }
}

#[derive(Debug)]
pub enum WebError {
    BindFailed(String),
    StorageError(StorageError),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::BindFailed(e) => write!(f, "Web server bind failed: {}", e),
            WebError::StorageError(e) => write!(f, "Storage error: {}", e),
        }
    }
}

impl std::error::Error for WebError {}
