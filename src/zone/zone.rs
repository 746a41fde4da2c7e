use super::{Record, RecordType, Result, SoaRecord, ZoneError};
use std::path::{Path, PathBuf};

/// Prefix of every per-zone record file under the configuration root
pub const ZONE_FILE_PREFIX: &str = "db-";

/// Record file location for a domain under the configuration root
pub fn zone_file_path(root: &Path, domain: &str) -> PathBuf {
    root.join(format!("{}{}", ZONE_FILE_PREFIX, domain))
}

/// Check that a domain can be used both as a `named.conf` zone name and as
/// part of a file name under the configuration root
pub fn validate_domain(domain: &str) -> Result<()> {
    if domain.is_empty() {
        return Err(ZoneError::InvalidZone("domain must be set".to_string()));
    }
    if let Some(c) = domain.chars().find(|&c| {
        matches!(c, '"' | '/' | '\\' | ';' | '{' | '}') || c.is_whitespace() || c.is_control()
    }) {
        return Err(ZoneError::InvalidZone(format!(
            "domain {:?} contains {:?}",
            domain, c
        )));
    }
    if domain.contains("..") || domain == "." {
        return Err(ZoneError::InvalidZone(format!(
            "domain {:?} has an empty label",
            domain
        )));
    }
    Ok(())
}

/// A managed DNS zone: its SOA and resource records
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Zone {
    /// Storage identity, assigned on first persist
    pub id: Option<String>,
    pub domain: String,
    /// Derived from the domain, see [`Zone::derive_file_path`]
    file_path: PathBuf,
    pub soa: Option<SoaRecord>,
    pub records: Vec<Record>,
}

impl Zone {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            ..Default::default()
        }
    }

    /// Location of the zone's record file; empty until derived
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Recompute the record file location from the current domain
    pub fn derive_file_path(&mut self, root: &Path) {
        self.file_path = if self.domain.is_empty() {
            PathBuf::new()
        } else {
            zone_file_path(root, &self.domain)
        };
    }

    pub fn is_valid(&self) -> bool {
        validate_domain(&self.domain).is_ok() && !self.file_path.as_os_str().is_empty()
    }

    /// Replace the zone's SOA after checking it
    pub fn register_soa(&mut self, soa: SoaRecord) -> Result<()> {
        if !soa.is_valid() {
            return Err(ZoneError::InvalidSoa);
        }
        self.soa = Some(soa);
        Ok(())
    }

    pub fn find_record_by_id(&self, id: &str) -> Option<&Record> {
        if id.is_empty() {
            return None;
        }
        self.records
            .iter()
            .find(|r| r.id.as_deref() == Some(id))
    }

    pub fn find_record_by_id_mut(&mut self, id: &str) -> Option<&mut Record> {
        if id.is_empty() {
            return None;
        }
        self.records
            .iter_mut()
            .find(|r| r.id.as_deref() == Some(id))
    }

    /// Records matching every given criterion; `None` matches anything.
    /// Returns nothing when no criterion is given.
    pub fn find_records(
        &self,
        name: Option<&str>,
        rtype: Option<RecordType>,
        value: Option<&str>,
    ) -> Vec<&Record> {
        if name.is_none() && rtype.is_none() && value.is_none() {
            return Vec::new();
        }
        self.records
            .iter()
            .filter(|r| name.is_none_or(|n| r.name == n))
            .filter(|r| rtype.is_none_or(|t| r.rtype == t))
            .filter(|r| value.is_none_or(|v| r.value == v))
            .collect()
    }

    /// Append a record unless it duplicates an existing one by id or content
    pub fn add_record(&mut self, record: Record) -> Result<()> {
        if self
            .records
            .iter()
            .any(|r| r.same_identity(&record) || r.same_content(&record))
        {
            return Err(ZoneError::DuplicateRecord {
                name: record.name,
                rtype: record.rtype.to_string(),
                value: record.value,
            });
        }
        self.records.push(record);
        Ok(())
    }

    /// Remove the record with the given id. Remaining order is not preserved.
    pub fn delete_record(&mut self, id: &str) -> Result<Record> {
        let idx = self
            .records
            .iter()
            .position(|r| !id.is_empty() && r.id.as_deref() == Some(id))
            .ok_or_else(|| ZoneError::RecordNotFound(id.to_string()))?;
        Ok(self.records.swap_remove(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with_id(id: &str, name: &str, value: &str) -> Record {
        Record {
            id: Some(id.to_string()),
            ..Record::new(name, RecordType::A, value)
        }
    }

    #[test]
    fn test_file_path_is_derived() {
        let mut zone = Zone::new("example.com");
        assert!(!zone.is_valid());

        zone.derive_file_path(Path::new("/etc/bind"));
        assert_eq!(zone.file_path(), Path::new("/etc/bind/db-example.com"));
        assert!(zone.is_valid());

        zone.domain = "example.org".to_string();
        zone.derive_file_path(Path::new("/etc/bind"));
        assert_eq!(zone.file_path(), Path::new("/etc/bind/db-example.org"));
    }

    #[test]
    fn test_empty_domain_is_invalid() {
        let mut zone = Zone::new("");
        zone.derive_file_path(Path::new("/etc/bind"));
        assert!(!zone.is_valid());
        assert!(zone.file_path().as_os_str().is_empty());
    }

    #[test]
    fn test_domain_validation() {
        assert!(validate_domain("example.com").is_ok());
        assert!(validate_domain("example.com.").is_ok());
        assert!(validate_domain("xn--bcher-kva.example").is_ok());

        for domain in [
            "",
            ".",
            "..",
            "../../escaped",
            "a/b",
            "a..b",
            "x\"; }; include \"/etc/shadow",
            "two words",
            "line\nbreak",
            "semi;colon",
            "back\\slash",
        ] {
            assert!(
                matches!(validate_domain(domain), Err(ZoneError::InvalidZone(_))),
                "{:?} should be rejected",
                domain
            );
        }
    }

    #[test]
    fn test_zone_with_unsafe_domain_is_invalid() {
        let mut zone = Zone::new("../../escaped");
        zone.derive_file_path(Path::new("/etc/bind"));
        assert!(!zone.is_valid());
    }

    #[test]
    fn test_register_soa_rejects_invalid() {
        let mut zone = Zone::new("example.com");
        let mut soa = SoaRecord::new_default("ns1.example.com.", "root.example.com.");
        soa.retry = 0;
        assert_eq!(zone.register_soa(soa), Err(ZoneError::InvalidSoa));
        assert!(zone.soa.is_none());

        let soa = SoaRecord::new_default("ns1.example.com.", "root.example.com.");
        zone.register_soa(soa.clone()).unwrap();
        assert_eq!(zone.soa, Some(soa));
    }

    #[test]
    fn test_add_duplicate_by_content() {
        let mut zone = Zone::new("example.com");
        zone.add_record(Record::new("@", RecordType::A, "127.0.0.1"))
            .unwrap();

        let err = zone
            .add_record(Record::new("@", RecordType::A, "127.0.0.1"))
            .unwrap_err();
        assert!(matches!(err, ZoneError::DuplicateRecord { .. }));
        assert_eq!(zone.records.len(), 1);

        // Same name and value but different type is fine
        zone.add_record(Record::new("@", RecordType::TXT, "127.0.0.1"))
            .unwrap();
        assert_eq!(zone.records.len(), 2);
    }

    #[test]
    fn test_add_duplicate_by_id() {
        let mut zone = Zone::new("example.com");
        zone.add_record(record_with_id("r1", "www", "192.0.2.1"))
            .unwrap();
        let err = zone
            .add_record(record_with_id("r1", "mail", "192.0.2.2"))
            .unwrap_err();
        assert!(matches!(err, ZoneError::DuplicateRecord { .. }));
    }

    #[test]
    fn test_unpersisted_records_are_not_duplicates() {
        let mut zone = Zone::new("example.com");
        zone.add_record(Record::new("www", RecordType::A, "192.0.2.1"))
            .unwrap();
        zone.add_record(Record::new("mail", RecordType::A, "192.0.2.2"))
            .unwrap();
        assert_eq!(zone.records.len(), 2);
    }

    #[test]
    fn test_delete_record() {
        let mut zone = Zone::new("example.com");
        zone.add_record(record_with_id("r1", "www", "192.0.2.1"))
            .unwrap();
        zone.add_record(record_with_id("r2", "mail", "192.0.2.2"))
            .unwrap();
        zone.add_record(record_with_id("r3", "ftp", "192.0.2.3"))
            .unwrap();

        assert_eq!(
            zone.delete_record("missing"),
            Err(ZoneError::RecordNotFound("missing".to_string()))
        );
        assert_eq!(zone.records.len(), 3);

        let removed = zone.delete_record("r1").unwrap();
        assert_eq!(removed.name, "www");
        assert_eq!(zone.records.len(), 2);
        assert!(zone.find_record_by_id("r2").is_some());
        assert!(zone.find_record_by_id("r3").is_some());
        assert!(zone.find_record_by_id("r1").is_none());
    }

    #[test]
    fn test_find_records() {
        let mut zone = Zone::new("example.com");
        zone.add_record(Record::new("@", RecordType::NS, "ns1.example.com."))
            .unwrap();
        zone.add_record(Record::new("@", RecordType::NS, "ns2.example.com."))
            .unwrap();
        zone.add_record(Record::new("www", RecordType::A, "192.0.2.1"))
            .unwrap();

        assert!(zone.find_records(None, None, None).is_empty());
        assert_eq!(zone.find_records(Some("@"), None, None).len(), 2);
        assert_eq!(zone.find_records(None, Some(RecordType::A), None).len(), 1);
        assert_eq!(
            zone.find_records(Some("@"), Some(RecordType::NS), Some("ns2.example.com."))
                .len(),
            1
        );
        assert!(zone.find_records(Some("mail"), None, None).is_empty());
    }
}
