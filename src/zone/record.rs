use super::{Result, ZoneError};
use std::fmt;
use std::str::FromStr;

/// Resource record types that can be managed in a zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(clippy::upper_case_acronyms)]
pub enum RecordType {
    A,
    AAAA,
    NS,
    CNAME,
    MX,
    TXT,
    SRV,
    DNSKEY,
    KEY,
    IPSECKEY,
    PTR,
    SPF,
    TLSA,
    CAA,
}

impl RecordType {
    pub const ALL: [RecordType; 14] = [
        RecordType::A,
        RecordType::AAAA,
        RecordType::NS,
        RecordType::CNAME,
        RecordType::MX,
        RecordType::TXT,
        RecordType::SRV,
        RecordType::DNSKEY,
        RecordType::KEY,
        RecordType::IPSECKEY,
        RecordType::PTR,
        RecordType::SPF,
        RecordType::TLSA,
        RecordType::CAA,
    ];

    /// Zone file mnemonic for this type
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::AAAA => "AAAA",
            RecordType::NS => "NS",
            RecordType::CNAME => "CNAME",
            RecordType::MX => "MX",
            RecordType::TXT => "TXT",
            RecordType::SRV => "SRV",
            RecordType::DNSKEY => "DNSKEY",
            RecordType::KEY => "KEY",
            RecordType::IPSECKEY => "IPSECKEY",
            RecordType::PTR => "PTR",
            RecordType::SPF => "SPF",
            RecordType::TLSA => "TLSA",
            RecordType::CAA => "CAA",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = ZoneError;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == upper)
            .ok_or_else(|| ZoneError::UnknownRecordType(s.to_string()))
    }
}

/// A single resource record owned by a zone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Storage identity, assigned on first persist
    pub id: Option<String>,
    /// Owner name, relative to the zone or "@"
    pub name: String,
    pub rtype: RecordType,
    /// Record data in zone file text form
    pub value: String,
}

impl Record {
    pub fn new(name: impl Into<String>, rtype: RecordType, value: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            rtype,
            value: value.into(),
        }
    }

    /// Name server record
    pub fn ns(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, RecordType::NS, value)
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Check the record invariants, returning a descriptive error.
    ///
    /// Each record is written as a single zone file line, so the name may not
    /// contain whitespace and neither field may contain a line break.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(ZoneError::InvalidRecord("name must be set".to_string()));
        }
        if self.value.is_empty() {
            return Err(ZoneError::InvalidRecord("value must be set".to_string()));
        }
        if self.name.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(ZoneError::InvalidRecord(format!(
                "name {:?} contains whitespace",
                self.name
            )));
        }
        if self.value.chars().any(|c| c.is_control() && c != '\t') {
            return Err(ZoneError::InvalidRecord(format!(
                "value {:?} contains a control character",
                self.value
            )));
        }
        Ok(())
    }

    /// Both records carry an id and it is the same one
    pub fn same_identity(&self, other: &Record) -> bool {
        matches!((&self.id, &other.id), (Some(a), Some(b)) if a == b)
    }

    /// Same name, type and value
    pub fn same_content(&self, other: &Record) -> bool {
        self.name == other.name && self.rtype == other.rtype && self.value == other.value
    }
}
