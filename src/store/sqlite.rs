//! SQLite storage backend
//!
//! One row per zone, SOA and record, with the owned rows keyed by `zone_id`.
//! Writes for a zone run in a single transaction.

use super::{Result, StoreError, ZoneStore, prepare_zone};
use crate::zone::{Record, RecordType, SoaRecord, Zone};
use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

const SCHEMA: [&str; 6] = [
    r#"
    CREATE TABLE IF NOT EXISTS zones (
        id TEXT PRIMARY KEY,
        domain TEXT NOT NULL,
        file_path TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS records (
        id TEXT PRIMARY KEY,
        zone_id TEXT NOT NULL,
        name TEXT NOT NULL,
        type TEXT NOT NULL,
        value TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS soas (
        id TEXT PRIMARY KEY,
        zone_id TEXT NOT NULL,
        name TEXT NOT NULL,
        primary_ns TEXT NOT NULL,
        mail_addr TEXT NOT NULL,
        serial TEXT NOT NULL,
        serial_counter INTEGER,
        refresh INTEGER NOT NULL,
        retry INTEGER NOT NULL,
        expire INTEGER NOT NULL,
        cache_ttl INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS zones_domain ON zones(domain)",
    "CREATE INDEX IF NOT EXISTS records_zone_id ON records(zone_id)",
    "CREATE INDEX IF NOT EXISTS soas_zone_id ON soas(zone_id)",
];

/// SQLite-backed zone store
pub struct SqliteZoneStore {
    pool: SqlitePool,
    /// Configuration root that zone file paths are derived from
    zone_root: PathBuf,
    /// Held for the whole of every write transaction. A deferred transaction
    /// that reads before writing cannot upgrade its lock while another writer
    /// is active, and SQLite reports that as busy without waiting.
    write_lock: Mutex<()>,
}

impl SqliteZoneStore {
    /// Open or create a database file and migrate it
    pub async fn open<P: AsRef<Path>>(path: P, zone_root: impl Into<PathBuf>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        let store = Self::with_pool(pool, zone_root);
        store.migrate().await?;
        info!("SQLite zone store opened at {}", path.as_ref().display());
        Ok(store)
    }

    /// Private in-memory database, mostly useful in tests
    pub async fn in_memory(zone_root: impl Into<PathBuf>) -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;

        // Every connection to :memory: is a separate database, so pin to one
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self::with_pool(pool, zone_root);
        store.migrate().await?;
        Ok(store)
    }

    pub fn with_pool(pool: SqlitePool, zone_root: impl Into<PathBuf>) -> Self {
        Self {
            pool,
            zone_root: zone_root.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Commit on success; otherwise roll back and surface the original error
    async fn finish_transaction(tx: Transaction<'_, Sqlite>, result: Result<()>) -> Result<()> {
        match result {
            Ok(()) => {
                tx.commit().await?;
                Ok(())
            }
            Err(err) => match tx.rollback().await {
                Ok(()) => Err(err),
                Err(rollback) => Err(StoreError::Rollback {
                    source: Box::new(err),
                    rollback,
                }),
            },
        }
    }

    async fn fetch_zone(
        &self,
        conn: &mut SqliteConnection,
        column: &str,
        key: &str,
    ) -> Result<Option<Zone>> {
        // `column` is one of our own constants, never caller input
        let sql = format!("SELECT id, domain, file_path FROM zones WHERE {} = ? LIMIT 1", column);
        let row = sqlx::query(&sql)
            .bind(key)
            .fetch_optional(&mut *conn)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut zone = self.zone_from_row(&row)?;
        let zone_id: String = row.try_get("id")?;

        zone.soa = sqlx::query("SELECT * FROM soas WHERE zone_id = ? LIMIT 1")
            .bind(&zone_id)
            .fetch_optional(&mut *conn)
            .await?
            .map(|row| soa_from_row(&row))
            .transpose()?;

        zone.records = sqlx::query("SELECT * FROM records WHERE zone_id = ?")
            .bind(&zone_id)
            .fetch_all(&mut *conn)
            .await?
            .iter()
            .map(record_from_row)
            .collect::<Result<_>>()?;

        Ok(Some(zone))
    }

    fn zone_from_row(&self, row: &SqliteRow) -> Result<Zone> {
        let mut zone = Zone::new(row.try_get::<String, _>("domain")?);
        zone.id = Some(row.try_get("id")?);
        zone.derive_file_path(&self.zone_root);
        Ok(zone)
    }

    async fn write_zone(conn: &mut SqliteConnection, zone: &Zone) -> Result<()> {
        let zone_id = zone
            .id
            .as_deref()
            .ok_or_else(|| StoreError::InvalidData("zone has no id".to_string()))?;

        let previous: Vec<String> = sqlx::query_scalar("SELECT id FROM records WHERE zone_id = ?")
            .bind(zone_id)
            .fetch_all(&mut *conn)
            .await?;
        let current: HashSet<&str> = zone.records.iter().filter_map(|r| r.id.as_deref()).collect();

        for stale in previous.iter().filter(|id| !current.contains(id.as_str())) {
            debug!("Removing record {} from zone {}", stale, zone.domain);
            sqlx::query("DELETE FROM records WHERE id = ?")
                .bind(stale)
                .execute(&mut *conn)
                .await?;
        }

        sqlx::query("REPLACE INTO zones (id, domain, file_path) VALUES (?, ?, ?)")
            .bind(zone_id)
            .bind(&zone.domain)
            .bind(zone.file_path().to_string_lossy().into_owned())
            .execute(&mut *conn)
            .await?;

        match &zone.soa {
            Some(soa) => {
                let soa_id = soa
                    .id
                    .as_deref()
                    .ok_or_else(|| StoreError::InvalidData("SOA has no id".to_string()))?;

                sqlx::query("DELETE FROM soas WHERE zone_id = ? AND id <> ?")
                    .bind(zone_id)
                    .bind(soa_id)
                    .execute(&mut *conn)
                    .await?;

                sqlx::query(
                    "REPLACE INTO soas (id, zone_id, name, primary_ns, mail_addr, serial, \
                     serial_counter, refresh, retry, expire, cache_ttl) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(soa_id)
                .bind(zone_id)
                .bind(&soa.name)
                .bind(&soa.primary_name_server)
                .bind(&soa.mail_address)
                .bind(&soa.serial)
                .bind(i64::from(soa.serial_counter))
                .bind(i64::from(soa.refresh))
                .bind(i64::from(soa.retry))
                .bind(i64::from(soa.expire))
                .bind(i64::from(soa.cache_ttl))
                .execute(&mut *conn)
                .await?;
            }
            None => {
                sqlx::query("DELETE FROM soas WHERE zone_id = ?")
                    .bind(zone_id)
                    .execute(&mut *conn)
                    .await?;
            }
        }

        for record in &zone.records {
            let record_id = record
                .id
                .as_deref()
                .ok_or_else(|| StoreError::InvalidData("record has no id".to_string()))?;

            sqlx::query("REPLACE INTO records (id, zone_id, name, type, value) VALUES (?, ?, ?, ?, ?)")
                .bind(record_id)
                .bind(zone_id)
                .bind(&record.name)
                .bind(record.rtype.as_str())
                .bind(&record.value)
                .execute(&mut *conn)
                .await?;
        }

        Ok(())
    }

    async fn delete_zone_rows(conn: &mut SqliteConnection, zone_id: &str) -> Result<()> {
        let deleted = sqlx::query("DELETE FROM zones WHERE id = ?")
            .bind(zone_id)
            .execute(&mut *conn)
            .await?
            .rows_affected();
        if deleted == 0 {
            return Err(StoreError::ZoneNotFound(zone_id.to_string()));
        }

        sqlx::query("DELETE FROM soas WHERE zone_id = ?")
            .bind(zone_id)
            .execute(&mut *conn)
            .await?;
        sqlx::query("DELETE FROM records WHERE zone_id = ?")
            .bind(zone_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}

fn int_column<T: TryFrom<i64>>(row: &SqliteRow, column: &str) -> Result<T> {
    let value: i64 = row.try_get(column)?;
    T::try_from(value)
        .map_err(|_| StoreError::InvalidData(format!("{} out of range: {}", column, value)))
}

fn soa_from_row(row: &SqliteRow) -> Result<SoaRecord> {
    let serial_counter: Option<i64> = row.try_get("serial_counter")?;
    let serial_counter = u8::try_from(serial_counter.unwrap_or(0))
        .map_err(|_| StoreError::InvalidData("serial_counter out of range".to_string()))?;

    Ok(SoaRecord {
        id: Some(row.try_get("id")?),
        name: row.try_get("name")?,
        primary_name_server: row.try_get("primary_ns")?,
        mail_address: row.try_get("mail_addr")?,
        serial: row.try_get("serial")?,
        serial_counter,
        refresh: int_column(row, "refresh")?,
        retry: int_column(row, "retry")?,
        expire: int_column(row, "expire")?,
        cache_ttl: int_column(row, "cache_ttl")?,
    })
}

fn record_from_row(row: &SqliteRow) -> Result<Record> {
    let rtype: String = row.try_get("type")?;
    Ok(Record {
        id: Some(row.try_get("id")?),
        name: row.try_get("name")?,
        rtype: rtype
            .parse::<RecordType>()
            .map_err(|e| StoreError::InvalidData(e.to_string()))?,
        value: row.try_get("value")?,
    })
}

#[async_trait]
impl ZoneStore for SqliteZoneStore {
    async fn get_all_zones(&self) -> Result<Vec<Zone>> {
        let mut conn = self.pool.acquire().await?;

        let mut zones: HashMap<String, Zone> = HashMap::new();
        for row in sqlx::query("SELECT id, domain, file_path FROM zones")
            .fetch_all(&mut *conn)
            .await?
        {
            let zone_id: String = row.try_get("id")?;
            zones.insert(zone_id, self.zone_from_row(&row)?);
        }

        for row in sqlx::query("SELECT * FROM soas")
            .fetch_all(&mut *conn)
            .await?
        {
            let zone_id: String = row.try_get("zone_id")?;
            if let Some(zone) = zones.get_mut(&zone_id) {
                zone.soa = Some(soa_from_row(&row)?);
            }
        }

        for row in sqlx::query("SELECT * FROM records")
            .fetch_all(&mut *conn)
            .await?
        {
            let zone_id: String = row.try_get("zone_id")?;
            if let Some(zone) = zones.get_mut(&zone_id) {
                zone.records.push(record_from_row(&row)?);
            }
        }

        Ok(zones.into_values().collect())
    }

    async fn get_zone_by_id(&self, id: &str) -> Result<Option<Zone>> {
        let mut conn = self.pool.acquire().await?;
        self.fetch_zone(&mut conn, "id", id).await
    }

    async fn get_zone_by_domain(&self, domain: &str) -> Result<Option<Zone>> {
        let mut conn = self.pool.acquire().await?;
        self.fetch_zone(&mut conn, "domain", domain).await
    }

    async fn persist(&self, zone: &mut Zone) -> Result<()> {
        prepare_zone(zone, &self.zone_root);

        let _writer = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        let result = Self::write_zone(&mut tx, zone).await;
        Self::finish_transaction(tx, result).await?;

        debug!(
            "Persisted zone {} ({} records)",
            zone.domain,
            zone.records.len()
        );
        Ok(())
    }

    async fn delete(&self, zone_id: &str) -> Result<()> {
        let _writer = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        let result = Self::delete_zone_rows(&mut tx, zone_id).await;
        Self::finish_transaction(tx, result).await?;

        info!("Deleted zone {}", zone_id);
        Ok(())
    }

    async fn migrate(&self) -> Result<()> {
        let _writer = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        let mut result: Result<()> = Ok(());
        for statement in SCHEMA {
            if let Err(e) = sqlx::query(statement).execute(&mut *tx).await {
                result = Err(e.into());
                break;
            }
        }
        Self::finish_transaction(tx, result).await
    }
}
