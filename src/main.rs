use clap::{Arg, Command};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use zonewarden::config::ManagerConfig;
use zonewarden::graceful_shutdown::{ComponentOutcome, GracefulShutdown, ShutdownResult};
use zonewarden::named::{Bind9Server, DnsServer};
use zonewarden::store::SqliteZoneStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = Command::new("zonewarden")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Manage DNS zones and the BIND daemon that serves them")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("bind-folder")
                .long("bind-folder")
                .value_name("DIR")
                .help("Directory holding named.conf and the zone files"),
        )
        .arg(
            Arg::new("data-folder")
                .long("data-folder")
                .value_name("DIR")
                .help("Directory holding the zone database"),
        )
        .arg(
            Arg::new("named-bin")
                .long("named-bin")
                .value_name("PATH")
                .help("Path to the named executable"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .help("Log filter, overrides RUST_LOG"),
        )
        .get_matches();

    let filter = match matches.get_one::<String>("log-level") {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_file = matches.get_one::<String>("config").map(PathBuf::from);
    let mut config = ManagerConfig::load(config_file.as_deref())?;
    if let Some(dir) = matches.get_one::<String>("bind-folder") {
        config.bind_folder = PathBuf::from(dir);
    }
    if let Some(dir) = matches.get_one::<String>("data-folder") {
        config.data_folder = PathBuf::from(dir);
    }
    if let Some(path) = matches.get_one::<String>("named-bin") {
        config.named_bin = PathBuf::from(path);
    }
    config.validate()?;

    info!(
        "Starting zonewarden (bind folder {}, database {})",
        config.bind_folder.display(),
        config.db_path().display()
    );

    tokio::fs::create_dir_all(&config.data_folder).await?;
    let store = Arc::new(SqliteZoneStore::open(config.db_path(), &config.bind_folder).await?);
    let server = Arc::new(Bind9Server::new(&config, store.clone()));

    let report = server.update_and_reload().await?;
    info!(
        "Serving {} zones ({} skipped)",
        report.written().count(),
        report.skipped().count()
    );

    wait_for_signal().await?;

    let shutdown = GracefulShutdown::new(config.shutdown_timeout);
    {
        let server = server.clone();
        shutdown
            .register_component("named", move || {
                let server = server.clone();
                async move {
                    let result: ShutdownResult = server.shutdown().await.map_err(Into::into);
                    result
                }
            })
            .await;
    }
    {
        let store = store.clone();
        shutdown
            .register_component("store", move || {
                let store = store.clone();
                async move {
                    store.close().await;
                    Ok(())
                }
            })
            .await;
    }
    let outcomes = shutdown.shutdown().await;
    if let Some((name, outcome)) = outcomes
        .iter()
        .find(|(_, outcome)| *outcome != ComponentOutcome::Completed)
    {
        error!("Shutdown of '{}' did not complete: {:?}", name, outcome);
    }

    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Received SIGINT");
        }
        _ = terminate.recv() => info!("Received SIGTERM"),
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("Received ctrl-c");
    Ok(())
}
