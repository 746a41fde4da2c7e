use crate::named::{DaemonError, GenerationFailures};
use crate::store::StoreError;
use crate::zone::ZoneError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),

    #[error("Missing configuration value: {0}")]
    MissingValue(&'static str),

    #[error("Invalid TTL: {0}")]
    InvalidTtl(String),

    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),
}

/// How a caller should classify a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input, the operation was not attempted
    Validation,
    NotFound,
    /// Conflicts with existing state
    Conflict,
    Server,
}

/// Unified error type for zone management operations
#[derive(Error, Debug)]
pub enum ManagerError {
    #[error(transparent)]
    Zone(#[from] ZoneError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Generation(#[from] GenerationFailures),

    #[error(transparent)]
    Daemon(#[from] DaemonError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Zone already exists: {0}")]
    ZoneExists(String),

    #[error("Zone not found: {0}")]
    ZoneNotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl ManagerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ManagerError::Zone(ZoneError::DuplicateRecord { .. }) => ErrorKind::Conflict,
            ManagerError::Zone(ZoneError::RecordNotFound(_)) => ErrorKind::NotFound,
            ManagerError::Zone(_) => ErrorKind::Validation,
            ManagerError::Store(StoreError::ZoneNotFound(_)) => ErrorKind::NotFound,
            ManagerError::ZoneNotFound(_) => ErrorKind::NotFound,
            ManagerError::ZoneExists(_) => ErrorKind::Conflict,
            ManagerError::Validation(_) => ErrorKind::Validation,
            ManagerError::Store(_)
            | ManagerError::Generation(_)
            | ManagerError::Daemon(_)
            | ManagerError::Config(_) => ErrorKind::Server,
        }
    }
}

pub type Result<T> = std::result::Result<T, ManagerError>;
