use super::{Result, StoreError, ZoneStore, prepare_zone};
use crate::zone::Zone;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;

/// Zone store held entirely in memory
pub struct MemoryZoneStore {
    /// Zones indexed by id
    zones: RwLock<HashMap<String, Zone>>,
    zone_root: PathBuf,
}

impl MemoryZoneStore {
    pub fn new(zone_root: impl Into<PathBuf>) -> Self {
        Self {
            zones: RwLock::new(HashMap::new()),
            zone_root: zone_root.into(),
        }
    }

    pub fn zone_count(&self) -> usize {
        self.zones.read().len()
    }
}

#[async_trait]
impl ZoneStore for MemoryZoneStore {
    async fn get_all_zones(&self) -> Result<Vec<Zone>> {
        Ok(self.zones.read().values().cloned().collect())
    }

    async fn get_zone_by_id(&self, id: &str) -> Result<Option<Zone>> {
        Ok(self.zones.read().get(id).cloned())
    }

    async fn get_zone_by_domain(&self, domain: &str) -> Result<Option<Zone>> {
        Ok(self
            .zones
            .read()
            .values()
            .find(|z| z.domain == domain)
            .cloned())
    }

    async fn persist(&self, zone: &mut Zone) -> Result<()> {
        prepare_zone(zone, &self.zone_root);
        let id = zone
            .id
            .clone()
            .ok_or_else(|| StoreError::InvalidData("zone has no id".to_string()))?;
        self.zones.write().insert(id, zone.clone());
        Ok(())
    }

    async fn delete(&self, zone_id: &str) -> Result<()> {
        self.zones
            .write()
            .remove(zone_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::ZoneNotFound(zone_id.to_string()))
    }

    async fn migrate(&self) -> Result<()> {
        Ok(())
    }
}
