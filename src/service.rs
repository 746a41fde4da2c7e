//! Zone and record management operations.
//!
//! Every mutation is persisted first and then pushed to the DNS server with
//! [`DnsServer::update_and_reload`], so the running daemon always reflects
//! the store once an operation returns successfully.

use crate::error::{ManagerError, Result};
use crate::named::DnsServer;
use crate::store::ZoneStore;
use crate::zone::{Record, RecordType, SoaRecord, Zone, ZoneError, validate_domain};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Changes to apply to a zone; `None` and empty values are left untouched
#[derive(Debug, Clone, Default)]
pub struct ZonePatch {
    pub domain: Option<String>,
    pub primary_ns: Option<String>,
    pub mail_addr: Option<String>,
}

/// Changes to apply to a record; `None` and empty values are left untouched
#[derive(Debug, Clone, Default)]
pub struct RecordPatch {
    pub name: Option<String>,
    pub rtype: Option<RecordType>,
    pub value: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Record file of a stored zone, if its domain was safe to derive one from
fn served_file(zone: &Zone) -> Option<PathBuf> {
    zone.is_valid().then(|| zone.file_path().to_path_buf())
}

/// Remove the record file of a zone that is no longer served under that name.
/// Failures are logged; the zone change itself already succeeded.
async fn remove_zone_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed zone file {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove zone file {}: {}", path.display(), e),
    }
}

pub struct ZoneService {
    store: Arc<dyn ZoneStore>,
    server: Arc<dyn DnsServer>,
}

impl ZoneService {
    pub fn new(store: Arc<dyn ZoneStore>, server: Arc<dyn DnsServer>) -> Self {
        Self { store, server }
    }

    pub async fn list_zones(&self) -> Result<Vec<Zone>> {
        let mut zones = self.store.get_all_zones().await?;
        zones.sort_by(|a, b| a.domain.cmp(&b.domain));
        Ok(zones)
    }

    pub async fn get_zone_by_id(&self, id: &str) -> Result<Option<Zone>> {
        Ok(self.store.get_zone_by_id(id).await?)
    }

    pub async fn get_zone_by_domain(&self, domain: &str) -> Result<Option<Zone>> {
        Ok(self.store.get_zone_by_domain(domain).await?)
    }

    /// Create a zone with a default SOA and an `@ NS <primary_ns>` record
    pub async fn create_zone(
        &self,
        domain: &str,
        primary_ns: &str,
        mail_addr: &str,
    ) -> Result<Zone> {
        if domain.is_empty() || primary_ns.is_empty() || mail_addr.is_empty() {
            return Err(ManagerError::Validation(
                "domain, primary_ns and mail_addr must be set".to_string(),
            ));
        }
        validate_domain(domain)?;
        if self.store.get_zone_by_domain(domain).await?.is_some() {
            return Err(ManagerError::ZoneExists(domain.to_string()));
        }

        let mut zone = Zone::new(domain);
        zone.register_soa(SoaRecord::new_default(primary_ns, mail_addr))?;
        zone.add_record(Record::ns("@", primary_ns))?;

        self.commit(&mut zone).await?;
        info!("Created zone {}", zone.domain);
        Ok(zone)
    }

    pub async fn update_zone(&self, domain: &str, patch: ZonePatch) -> Result<Zone> {
        let mut zone = self.require_zone(domain).await?;
        let old_file = served_file(&zone);

        if let Some(new_domain) = non_empty(patch.domain) {
            validate_domain(&new_domain)?;
            if new_domain != zone.domain
                && self.store.get_zone_by_domain(&new_domain).await?.is_some()
            {
                return Err(ManagerError::ZoneExists(new_domain));
            }
            zone.domain = new_domain;
        }

        let primary_ns = non_empty(patch.primary_ns);
        let mail_addr = non_empty(patch.mail_addr);
        if primary_ns.is_some() || mail_addr.is_some() {
            let soa = zone.soa.as_mut().ok_or_else(|| {
                ManagerError::Validation(format!("zone {} has no SOA", domain))
            })?;
            if let Some(ns) = primary_ns {
                soa.primary_name_server = ns;
            }
            if let Some(mail) = mail_addr {
                soa.mail_address = mail;
            }
            if !soa.is_valid() {
                return Err(ZoneError::InvalidSoa.into());
            }
        }

        self.commit(&mut zone).await?;
        if let Some(old_file) = old_file.filter(|f| f != zone.file_path()) {
            remove_zone_file(&old_file).await;
        }
        info!("Updated zone {}", zone.domain);
        Ok(zone)
    }

    pub async fn delete_zone(&self, domain: &str) -> Result<()> {
        let zone = self.require_zone(domain).await?;
        let old_file = served_file(&zone);
        let id = zone
            .id
            .ok_or_else(|| ManagerError::ZoneNotFound(domain.to_string()))?;
        self.store.delete(&id).await?;
        self.server.update_and_reload().await?;
        if let Some(old_file) = old_file {
            remove_zone_file(&old_file).await;
        }
        info!("Deleted zone {}", domain);
        Ok(())
    }

    pub async fn list_records(&self, domain: &str) -> Result<Vec<Record>> {
        Ok(self.require_zone(domain).await?.records)
    }

    pub async fn get_record(&self, domain: &str, record_id: &str) -> Result<Option<Record>> {
        let zone = self.require_zone(domain).await?;
        Ok(zone.find_record_by_id(record_id).cloned())
    }

    pub async fn create_record(
        &self,
        domain: &str,
        name: &str,
        rtype: RecordType,
        value: &str,
    ) -> Result<Record> {
        let record = Record::new(name, rtype, value);
        record.validate()?;

        let mut zone = self.require_zone(domain).await?;
        zone.add_record(record)?;
        self.commit(&mut zone).await?;

        // persist assigned the id of the record appended last
        let record = zone
            .records
            .last()
            .cloned()
            .ok_or_else(|| ManagerError::Validation("record was not added".to_string()))?;
        debug!("Created record {:?} in {}", record.id, domain);
        Ok(record)
    }

    pub async fn update_record(
        &self,
        domain: &str,
        record_id: &str,
        patch: RecordPatch,
    ) -> Result<Record> {
        let mut zone = self.require_zone(domain).await?;
        let current = zone
            .find_record_by_id(record_id)
            .cloned()
            .ok_or_else(|| ZoneError::RecordNotFound(record_id.to_string()))?;

        let mut updated = current.clone();
        if let Some(name) = non_empty(patch.name) {
            updated.name = name;
        }
        if let Some(rtype) = patch.rtype {
            updated.rtype = rtype;
        }
        if let Some(value) = non_empty(patch.value) {
            updated.value = value;
        }
        updated.validate()?;

        if zone
            .records
            .iter()
            .any(|r| !r.same_identity(&current) && r.same_content(&updated))
        {
            return Err(ZoneError::DuplicateRecord {
                name: updated.name,
                rtype: updated.rtype.to_string(),
                value: updated.value,
            }
            .into());
        }

        if let Some(record) = zone.find_record_by_id_mut(record_id) {
            *record = updated.clone();
        }
        self.commit(&mut zone).await?;
        debug!("Updated record {} in {}", record_id, domain);
        Ok(updated)
    }

    pub async fn delete_record(&self, domain: &str, record_id: &str) -> Result<Record> {
        let mut zone = self.require_zone(domain).await?;
        let removed = zone.delete_record(record_id)?;
        self.commit(&mut zone).await?;
        debug!("Deleted record {} from {}", record_id, domain);
        Ok(removed)
    }

    /// Regenerate the daemon configuration and restart it
    pub async fn update_and_reload(&self) -> Result<()> {
        self.server.update_and_reload().await?;
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.server.shutdown().await
    }

    async fn require_zone(&self, domain: &str) -> Result<Zone> {
        self.store
            .get_zone_by_domain(domain)
            .await?
            .ok_or_else(|| ManagerError::ZoneNotFound(domain.to_string()))
    }

    async fn commit(&self, zone: &mut Zone) -> Result<()> {
        validate_domain(&zone.domain)?;
        self.store.persist(zone).await?;
        self.server.update_and_reload().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::named::GenerationReport;
    use crate::store::MemoryZoneStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingServer {
        reloads: AtomicUsize,
        shutdowns: AtomicUsize,
    }

    #[async_trait]
    impl DnsServer for RecordingServer {
        async fn update_configs(&self) -> Result<GenerationReport> {
            Ok(GenerationReport {
                zones: Vec::new(),
                named_conf: Ok(PathBuf::from("/etc/bind/named.conf")),
            })
        }

        async fn reload(&self) -> Result<()> {
            self.reloads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn shutdown(&self) -> Result<()> {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn service() -> (ZoneService, Arc<MemoryZoneStore>, Arc<RecordingServer>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryZoneStore::new(dir.path()));
        let server = Arc::new(RecordingServer::default());
        (
            ZoneService::new(store.clone(), server.clone()),
            store,
            server,
            dir,
        )
    }

    #[tokio::test]
    async fn test_create_zone_defaults() {
        let (service, _, server, dir) = service();
        let zone = service
            .create_zone("example.com", "ns1.example.com.", "root.example.com.")
            .await
            .unwrap();

        let soa = zone.soa.as_ref().unwrap();
        assert_eq!(soa.refresh, 7200);
        assert_eq!(soa.retry, 3600);
        assert_eq!(soa.expire, 1_209_600);
        assert_eq!(soa.cache_ttl, 180);
        assert_eq!(zone.records.len(), 1);
        assert_eq!(zone.records[0].name, "@");
        assert_eq!(zone.records[0].rtype, RecordType::NS);
        assert_eq!(zone.records[0].value, "ns1.example.com.");
        assert_eq!(zone.file_path(), dir.path().join("db-example.com"));
        assert_eq!(server.reloads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_create_existing_zone_conflicts() {
        let (service, store, server, _dir) = service();
        service
            .create_zone("example.com", "ns1.example.com.", "root.example.com.")
            .await
            .unwrap();
        let err = service
            .create_zone("example.com", "ns2.example.com.", "root.example.com.")
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(store.zone_count(), 1);
        assert_eq!(server.reloads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_create_zone_requires_fields() {
        let (service, store, _, _dir) = service();
        let err = service
            .create_zone("example.com", "", "root.example.com.")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(store.zone_count(), 0);
    }

    #[tokio::test]
    async fn test_update_zone_renames() {
        let (service, _, _, dir) = service();
        service
            .create_zone("example.com", "ns1.example.com.", "root.example.com.")
            .await
            .unwrap();

        let zone = service
            .update_zone(
                "example.com",
                ZonePatch {
                    domain: Some("example.org".to_string()),
                    primary_ns: Some(String::new()),
                    mail_addr: Some("admin.example.org.".to_string()),
                },
            )
            .await
            .unwrap();

        assert_eq!(zone.domain, "example.org");
        assert_eq!(zone.file_path(), dir.path().join("db-example.org"));
        let soa = zone.soa.as_ref().unwrap();
        assert_eq!(soa.primary_name_server, "ns1.example.com.");
        assert_eq!(soa.mail_address, "admin.example.org.");
        assert!(service.get_zone_by_domain("example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_record_lifecycle() {
        let (service, _, server, _dir) = service();
        service
            .create_zone("example.com", "ns1.example.com.", "root.example.com.")
            .await
            .unwrap();

        let record = service
            .create_record("example.com", "www", RecordType::A, "192.0.2.1")
            .await
            .unwrap();
        let id = record.id.clone().unwrap();
        assert_eq!(service.list_records("example.com").await.unwrap().len(), 2);

        let updated = service
            .update_record(
                "example.com",
                &id,
                RecordPatch {
                    value: Some("192.0.2.2".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.value, "192.0.2.2");
        assert_eq!(updated.name, "www");

        let fetched = service.get_record("example.com", &id).await.unwrap();
        assert_eq!(fetched, Some(updated));

        service.delete_record("example.com", &id).await.unwrap();
        assert_eq!(service.list_records("example.com").await.unwrap().len(), 1);
        assert!(service.get_record("example.com", &id).await.unwrap().is_none());
        assert_eq!(server.reloads.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_duplicate_record_rejected() {
        let (service, _, _, _dir) = service();
        service
            .create_zone("example.com", "ns1.example.com.", "root.example.com.")
            .await
            .unwrap();

        let err = service
            .create_record("example.com", "@", RecordType::NS, "ns1.example.com.")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_missing_zone_and_record() {
        let (service, _, server, _dir) = service();
        let err = service.delete_zone("missing.com").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        service
            .create_zone("example.com", "ns1.example.com.", "root.example.com.")
            .await
            .unwrap();
        let err = service
            .delete_record("example.com", "missing")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(server.reloads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_delete_zone() {
        let (service, store, server, _dir) = service();
        service
            .create_zone("example.com", "ns1.example.com.", "root.example.com.")
            .await
            .unwrap();
        service.delete_zone("example.com").await.unwrap();

        assert_eq!(store.zone_count(), 0);
        assert_eq!(server.reloads.load(Ordering::SeqCst), 2);

        service.shutdown().await.unwrap();
        assert_eq!(server.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsafe_names_rejected() {
        let (service, store, server, _dir) = service();

        for domain in ["x\"; }; include \"/etc/shadow", "../../escaped", "a b.com"] {
            let err = service
                .create_zone(domain, "ns1.example.com.", "root.example.com.")
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "{:?}", domain);
        }
        assert_eq!(store.zone_count(), 0);

        service
            .create_zone("example.com", "ns1.example.com.", "root.example.com.")
            .await
            .unwrap();
        let err = service
            .update_zone(
                "example.com",
                ZonePatch {
                    domain: Some("../etc".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = service
            .update_zone(
                "example.com",
                ZonePatch {
                    mail_addr: Some("root.example.com. (\n".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = service
            .create_record("example.com", "www", RecordType::A, "192.0.2.1\n@\tIN\tNS\tevil.")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let zone = service.get_zone_by_domain("example.com").await.unwrap().unwrap();
        assert_eq!(zone.records.len(), 1);
        assert_eq!(zone.soa.unwrap().mail_address, "root.example.com.");
        assert_eq!(server.reloads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stale_zone_files_removed() {
        let (service, _, _, dir) = service();
        service
            .create_zone("example.com", "ns1.example.com.", "root.example.com.")
            .await
            .unwrap();
        // RecordingServer does not render files, so stand one in
        let old_file = dir.path().join("db-example.com");
        std::fs::write(&old_file, "$TTL    14400\n").unwrap();

        service
            .update_zone(
                "example.com",
                ZonePatch {
                    domain: Some("example.org".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!old_file.exists());

        // A missing file is not an error
        service.delete_zone("example.org").await.unwrap();

        service
            .create_zone("example.net", "ns1.example.net.", "root.example.net.")
            .await
            .unwrap();
        let file = dir.path().join("db-example.net");
        std::fs::write(&file, "$TTL    14400\n").unwrap();
        service.delete_zone("example.net").await.unwrap();
        assert!(!file.exists());
    }
}
