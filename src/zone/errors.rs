use thiserror::Error;

/// Zone-related errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ZoneError {
    /// SOA record fails its validity rules
    #[error("Invalid SOA record")]
    InvalidSoa,
    /// Resource record fails its validity rules
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
    /// Zone has no domain or no file path
    #[error("Invalid zone: {0}")]
    InvalidZone(String),
    /// Record type mnemonic is not one we manage
    #[error("Unsupported record type: {0}")]
    UnknownRecordType(String),
    /// Record with the same id or the same name/type/value already exists
    #[error("Duplicate record: {name} {rtype} {value}")]
    DuplicateRecord {
        name: String,
        rtype: String,
        value: String,
    },
    /// No record with the given id exists in the zone
    #[error("Record not found: {0}")]
    RecordNotFound(String),
}

pub type Result<T> = std::result::Result<T, ZoneError>;
