//! Management of the external BIND `named` daemon: configuration generation
//! and process lifecycle.

pub mod daemon;
pub mod generator;

pub use daemon::{DaemonCommand, DaemonController, DaemonError, DaemonState, DaemonStatus};
pub use generator::{
    ConfigGenerator, GenerationError, GenerationFailures, GenerationReport, SkipReason,
    ZoneOutcome, ZoneReport,
};

use crate::config::ManagerConfig;
use crate::error::Result;
use crate::store::ZoneStore;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Keeps the DNS daemon's configuration and process in line with the store
#[async_trait]
pub trait DnsServer: Send + Sync {
    /// Regenerate the daemon configuration and every zone file from the store
    async fn update_configs(&self) -> Result<GenerationReport>;

    /// Restart the daemon against the configuration currently on disk
    async fn reload(&self) -> Result<()>;

    /// Stop the daemon without starting a replacement
    async fn shutdown(&self) -> Result<()>;

    /// Write the configuration, then restart the daemon that reads it
    async fn update_and_reload(&self) -> Result<GenerationReport> {
        let report = self.update_configs().await?;
        self.reload().await?;
        Ok(report)
    }
}

/// BIND 9 backed [`DnsServer`]
pub struct Bind9Server {
    store: Arc<dyn ZoneStore>,
    generator: ConfigGenerator,
    daemon: DaemonController,
}

impl Bind9Server {
    pub fn new(config: &ManagerConfig, store: Arc<dyn ZoneStore>) -> Self {
        Self::with_command(config, store, DaemonCommand::named(config))
    }

    /// Use a custom command line to start the daemon
    pub fn with_command(
        config: &ManagerConfig,
        store: Arc<dyn ZoneStore>,
        command: DaemonCommand,
    ) -> Self {
        Self {
            store,
            generator: ConfigGenerator::new(config),
            daemon: DaemonController::spawn(command),
        }
    }

    pub fn daemon(&self) -> &DaemonController {
        &self.daemon
    }
}

#[async_trait]
impl DnsServer for Bind9Server {
    async fn update_configs(&self) -> Result<GenerationReport> {
        let zones = self.store.get_all_zones().await?;
        let report = self.generator.generate(self.store.as_ref(), zones).await;
        Ok(report.into_result()?)
    }

    async fn reload(&self) -> Result<()> {
        self.daemon.reload().await?;
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.daemon.shutdown().await?;
        info!("named shut down");
        Ok(())
    }
}
