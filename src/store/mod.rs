//! Zone persistence
//!
//! A zone is stored together with its SOA and records; every write of a zone
//! replaces its owned rows as one unit so the stored record set always matches
//! the last persisted zone exactly.

mod memory;
mod sqlite;

pub use memory::MemoryZoneStore;
pub use sqlite::SqliteZoneStore;

use crate::zone::Zone;
use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

/// Errors from storage operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Zone not found: {0}")]
    ZoneNotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{source} (rollback also failed: {rollback})")]
    Rollback {
        source: Box<StoreError>,
        rollback: sqlx::Error,
    },

    #[error("Invalid stored data: {0}")]
    InvalidData(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Backend-agnostic zone storage.
///
/// Dropping a returned future before it completes abandons the operation;
/// backends must leave no partial writes behind when that happens.
#[async_trait]
pub trait ZoneStore: Send + Sync {
    /// Every zone with SOA and records populated, in no particular order
    async fn get_all_zones(&self) -> Result<Vec<Zone>>;

    async fn get_zone_by_id(&self, id: &str) -> Result<Option<Zone>>;

    async fn get_zone_by_domain(&self, domain: &str) -> Result<Option<Zone>>;

    /// Insert or replace a zone with its SOA and records.
    ///
    /// Missing ids are assigned in place and the file path is re-derived
    /// from the domain. Records that were stored for this zone but are no
    /// longer part of it are removed.
    async fn persist(&self, zone: &mut Zone) -> Result<()>;

    /// Remove a zone and everything it owns
    async fn delete(&self, zone_id: &str) -> Result<()>;

    /// Ensure the backing schema exists; safe to call repeatedly
    async fn migrate(&self) -> Result<()>;
}

pub(crate) fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Assign missing identities and derive the file path before a write
pub(crate) fn prepare_zone(zone: &mut Zone, zone_root: &Path) {
    if zone.id.is_none() {
        zone.id = Some(new_id());
    }
    zone.derive_file_path(zone_root);
    if let Some(soa) = zone.soa.as_mut() {
        if soa.id.is_none() {
            soa.id = Some(new_id());
        }
    }
    for record in zone.records.iter_mut().filter(|r| r.id.is_none()) {
        record.id = Some(new_id());
    }
}
