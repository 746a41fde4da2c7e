//! Shared helpers for the integration tests

#![allow(dead_code)] // Not every test file uses every helper

use std::path::Path;
use zonewarden::config::ManagerConfig;
use zonewarden::named::DaemonCommand;
use zonewarden::store::SqliteZoneStore;
use zonewarden::zone::{Record, RecordType, SoaRecord, Zone};

/// Configuration rooted in a temporary directory
pub fn test_config(root: &Path) -> ManagerConfig {
    ManagerConfig {
        bind_folder: root.join("bind"),
        data_folder: root.join("data"),
        ..Default::default()
    }
}

/// Zone with a default SOA, an NS record and one A record
pub fn sample_zone(domain: &str) -> Zone {
    let ns = format!("ns1.{}.", domain);
    let mut zone = Zone::new(domain);
    zone.register_soa(SoaRecord::new_default(ns.clone(), format!("root.{}.", domain)))
        .unwrap();
    zone.add_record(Record::ns("@", ns)).unwrap();
    zone.add_record(Record::new("www", RecordType::A, "192.0.2.10"))
        .unwrap();
    zone
}

/// Stand-in for `named`: logs one line and stays up until killed
pub fn fake_named() -> DaemonCommand {
    DaemonCommand::new("/bin/sh")
        .arg("-c")
        .arg("echo started >&2; exec sleep 30")
}

/// Stand-in for a daemon that exits straight away with the given code
pub fn exiting_named(code: i32) -> DaemonCommand {
    DaemonCommand::new("/bin/sh")
        .arg("-c")
        .arg(format!("echo failing >&2; exit {}", code))
}

pub async fn count_rows(store: &SqliteZoneStore, table: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(store.pool())
        .await
        .unwrap()
}
