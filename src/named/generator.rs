//! Renders zones into `named.conf` and per-zone record files.
//!
//! Zones are processed independently: a zone that cannot be rendered is
//! skipped, a zone whose serial cannot be persisted or whose file cannot be
//! written is reported as failed, and the rest of the batch carries on.

use crate::config::ManagerConfig;
use crate::store::{StoreError, ZoneStore};
use crate::zone::{Record, SoaRecord, Zone};
use std::fmt;
use std::fmt::Write as _;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Why a zone was left out of the generated configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Missing domain or file path
    InvalidZone,
    MissingSoa,
    /// SOA still invalid after advancing its serial
    InvalidSoa,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::InvalidZone => write!(f, "zone has no domain or file path"),
            SkipReason::MissingSoa => write!(f, "zone has no SOA record"),
            SkipReason::InvalidSoa => write!(f, "zone SOA record is invalid"),
        }
    }
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("failed to persist serial: {0}")]
    Persist(#[source] StoreError),

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// What happened to one zone during generation
#[derive(Debug)]
pub enum ZoneOutcome {
    /// Record file written with the given serial
    Written { serial: String },
    Skipped(SkipReason),
    Failed(GenerationError),
}

#[derive(Debug)]
pub struct ZoneReport {
    pub zone_id: Option<String>,
    pub domain: String,
    pub outcome: ZoneOutcome,
}

impl ZoneReport {
    /// Zone is listed in `named.conf`
    pub fn is_served(&self) -> bool {
        !matches!(self.outcome, ZoneOutcome::Skipped(_))
    }
}

/// Per-zone results of one generation run
#[derive(Debug)]
pub struct GenerationReport {
    pub zones: Vec<ZoneReport>,
    /// Outcome of writing the main configuration file
    pub named_conf: Result<PathBuf, GenerationError>,
}

impl GenerationReport {
    pub fn written(&self) -> impl Iterator<Item = &ZoneReport> {
        self.zones
            .iter()
            .filter(|z| matches!(z.outcome, ZoneOutcome::Written { .. }))
    }

    pub fn skipped(&self) -> impl Iterator<Item = &ZoneReport> {
        self.zones
            .iter()
            .filter(|z| matches!(z.outcome, ZoneOutcome::Skipped(_)))
    }

    pub fn failed(&self) -> impl Iterator<Item = &ZoneReport> {
        self.zones
            .iter()
            .filter(|z| matches!(z.outcome, ZoneOutcome::Failed(_)))
    }

    pub fn is_success(&self) -> bool {
        self.named_conf.is_ok() && self.failed().next().is_none()
    }

    /// Fail when any zone or the main configuration could not be written
    pub fn into_result(self) -> Result<Self, GenerationFailures> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(GenerationFailures { report: self })
        }
    }
}

/// A generation run with at least one failure; the full report is kept
#[derive(Debug)]
pub struct GenerationFailures {
    pub report: GenerationReport,
}

impl fmt::Display for GenerationFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "configuration generation failed")?;
        let mut sep = ": ";
        if let Err(e) = &self.report.named_conf {
            write!(f, "{}named.conf: {}", sep, e)?;
            sep = "; ";
        }
        for zone in self.report.failed() {
            if let ZoneOutcome::Failed(e) = &zone.outcome {
                write!(f, "{}{}: {}", sep, zone.domain, e)?;
                sep = "; ";
            }
        }
        Ok(())
    }
}

impl std::error::Error for GenerationFailures {}

/// Writes the daemon configuration for a set of zones
#[derive(Debug, Clone)]
pub struct ConfigGenerator {
    named_conf_path: PathBuf,
    include_paths: Vec<PathBuf>,
    default_ttl: u32,
}

impl ConfigGenerator {
    pub fn new(config: &ManagerConfig) -> Self {
        Self {
            named_conf_path: config.named_conf_path(),
            include_paths: config.include_paths(),
            default_ttl: config.default_ttl,
        }
    }

    pub fn named_conf_path(&self) -> &Path {
        &self.named_conf_path
    }

    /// Main configuration: fixed includes followed by one stanza per zone
    pub fn render_named_conf<'a>(&self, zones: impl IntoIterator<Item = &'a Zone>) -> String {
        let mut out = String::new();
        for include in &self.include_paths {
            let _ = writeln!(out, "include \"{}\";", include.display());
        }
        for zone in zones.into_iter().filter(|z| z.is_valid()) {
            let _ = writeln!(
                out,
                "zone \"{}\" {{ type primary; file \"{}\"; }};",
                zone.domain,
                zone.file_path().display()
            );
        }
        out
    }

    /// Zone record file: `$TTL`, SOA block and one line per valid record
    pub fn render_zone_file(&self, soa: &SoaRecord, records: &[Record]) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "$TTL    {}", self.default_ttl);
        let _ = writeln!(
            out,
            "{}\tIN\tSOA\t{} {} (",
            soa.name, soa.primary_name_server, soa.mail_address
        );
        let _ = writeln!(out, "\t\t\t{}\t; Serial", soa.serial);
        let _ = writeln!(out, "\t\t\t{}\t; Refresh", soa.refresh);
        let _ = writeln!(out, "\t\t\t{}\t; Retry", soa.retry);
        let _ = writeln!(out, "\t\t\t{}\t; Expire", soa.expire);
        let _ = writeln!(out, "\t\t\t{} )\t; Negative Cache TTL", soa.cache_ttl);
        for record in records.iter().filter(|r| r.is_valid()) {
            let _ = writeln!(out, "{}\tIN\t{}\t{}", record.name, record.rtype, record.value);
        }
        out
    }

    /// Regenerate every zone file and the main configuration.
    ///
    /// Each rendered zone gets its serial advanced and persisted before its
    /// file is written.
    pub async fn generate(&self, store: &dyn ZoneStore, zones: Vec<Zone>) -> GenerationReport {
        let mut reports = Vec::with_capacity(zones.len());
        let mut served = Vec::with_capacity(zones.len());

        for mut zone in zones {
            let outcome = self.generate_zone(store, &mut zone).await;
            match &outcome {
                ZoneOutcome::Written { serial } => {
                    debug!("Wrote zone {} with serial {}", zone.domain, serial)
                }
                ZoneOutcome::Skipped(reason) => warn!("Skipping zone {}: {}", zone.domain, reason),
                ZoneOutcome::Failed(e) => warn!("Failed to generate zone {}: {}", zone.domain, e),
            }
            let report = ZoneReport {
                zone_id: zone.id.clone(),
                domain: zone.domain.clone(),
                outcome,
            };
            if report.is_served() {
                served.push(zone);
            }
            reports.push(report);
        }

        let contents = self.render_named_conf(&served);
        let named_conf = write_file(&self.named_conf_path, &contents)
            .await
            .map(|()| self.named_conf_path.clone());

        info!(
            "Generated configuration for {} of {} zones",
            served.len(),
            reports.len()
        );

        GenerationReport {
            zones: reports,
            named_conf,
        }
    }

    async fn generate_zone(&self, store: &dyn ZoneStore, zone: &mut Zone) -> ZoneOutcome {
        if !zone.is_valid() {
            return ZoneOutcome::Skipped(SkipReason::InvalidZone);
        }
        let Some(soa) = zone.soa.as_mut() else {
            return ZoneOutcome::Skipped(SkipReason::MissingSoa);
        };
        soa.update_serial();
        if !soa.is_valid() {
            return ZoneOutcome::Skipped(SkipReason::InvalidSoa);
        }
        let serial = soa.serial.clone();
        let contents = self.render_zone_file(soa, &zone.records);

        if let Err(e) = store.persist(zone).await {
            return ZoneOutcome::Failed(GenerationError::Persist(e));
        }
        if let Err(e) = write_file(zone.file_path(), &contents).await {
            return ZoneOutcome::Failed(e);
        }
        ZoneOutcome::Written { serial }
    }
}

/// Write via a sibling temp file so readers never see a partial file
async fn write_file(path: &Path, contents: &str) -> Result<(), GenerationError> {
    let wrap = |source| GenerationError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(wrap)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, contents).await.map_err(wrap)?;
    tokio::fs::rename(&tmp, path).await.map_err(wrap)
}
