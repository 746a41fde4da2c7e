use crate::error::ConfigError;
use crate::zone;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const NAMED_CONF: &str = "named.conf";

/// Files included at the top of the generated `named.conf`, relative to the bind folder
pub const NAMED_CONF_INCLUDES: [&str; 3] = [
    "named.conf.options",
    "named.conf.local",
    "named.conf.default-zones",
];

#[derive(Debug, Clone, PartialEq)]
pub struct ManagerConfig {
    /// Configuration root holding `named.conf` and the per-zone record files
    pub bind_folder: PathBuf,

    /// Folder holding the zone database
    pub data_folder: PathBuf,

    /// Database file name inside `data_folder`
    pub db_name: String,

    /// Path to the `named` binary
    pub named_bin: PathBuf,

    /// User the daemon drops privileges to
    pub run_as_user: String,

    /// `$TTL` written at the top of every zone file
    pub default_ttl: u32,

    /// How long each component may take to stop on process exit
    pub shutdown_timeout: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            bind_folder: PathBuf::from("/etc/bind"),
            data_folder: PathBuf::from("/data"),
            db_name: "service.sqlite.db".to_string(),
            named_bin: PathBuf::from("/usr/sbin/named"),
            run_as_user: "bind".to_string(),
            default_ttl: 14400,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

/// Partial configuration as read from a TOML file
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    bind_folder: Option<PathBuf>,
    data_folder: Option<PathBuf>,
    db_name: Option<String>,
    named_bin: Option<PathBuf>,
    run_as_user: Option<String>,
    default_ttl: Option<u32>,
    shutdown_timeout_secs: Option<u64>,
}

impl ManagerConfig {
    /// Main daemon configuration file
    pub fn named_conf_path(&self) -> PathBuf {
        self.bind_folder.join(NAMED_CONF)
    }

    /// Absolute paths of the fixed include files
    pub fn include_paths(&self) -> Vec<PathBuf> {
        NAMED_CONF_INCLUDES
            .iter()
            .map(|name| self.bind_folder.join(name))
            .collect()
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_folder.join(&self.db_name)
    }

    /// Record file location for a domain
    pub fn zone_file_path(&self, domain: &str) -> PathBuf {
        zone::zone_file_path(&self.bind_folder, domain)
    }

    /// Load defaults, then the optional TOML file, then environment overrides
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(path) = config_file {
            let content = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
            config.apply_toml(&content)?;
        }
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Create a config from defaults and environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Apply the fields present in a TOML document
    pub fn apply_toml(&mut self, content: &str) -> Result<(), ConfigError> {
        let file: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if let Some(v) = file.bind_folder {
            self.bind_folder = v;
        }
        if let Some(v) = file.data_folder {
            self.data_folder = v;
        }
        if let Some(v) = file.db_name {
            self.db_name = v;
        }
        if let Some(v) = file.named_bin {
            self.named_bin = v;
        }
        if let Some(v) = file.run_as_user {
            self.run_as_user = v;
        }
        if let Some(v) = file.default_ttl {
            self.default_ttl = v;
        }
        if let Some(v) = file.shutdown_timeout_secs {
            self.shutdown_timeout = Duration::from_secs(v);
        }
        Ok(())
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(v) = std::env::var("ZONEWARDEN_BIND_FOLDER") {
            self.bind_folder = PathBuf::from(v);
        }

        if let Ok(v) = std::env::var("ZONEWARDEN_DATA_FOLDER") {
            self.data_folder = PathBuf::from(v);
        }

        if let Ok(v) = std::env::var("ZONEWARDEN_DB_NAME") {
            self.db_name = v;
        }

        if let Ok(v) = std::env::var("ZONEWARDEN_NAMED_BIN") {
            self.named_bin = PathBuf::from(v);
        }

        if let Ok(v) = std::env::var("ZONEWARDEN_RUN_AS_USER") {
            self.run_as_user = v;
        }

        if let Ok(v) = std::env::var("ZONEWARDEN_DEFAULT_TTL") {
            self.default_ttl = v
                .parse::<u32>()
                .map_err(|_| ConfigError::InvalidTtl(v.clone()))?;
        }

        if let Ok(v) = std::env::var("ZONEWARDEN_SHUTDOWN_TIMEOUT") {
            let secs = v
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidTimeout(v.clone()))?;
            self.shutdown_timeout = Duration::from_secs(secs);
        }

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_folder.as_os_str().is_empty() {
            return Err(ConfigError::MissingValue("bind_folder"));
        }
        if self.data_folder.as_os_str().is_empty() {
            return Err(ConfigError::MissingValue("data_folder"));
        }
        if self.db_name.is_empty() {
            return Err(ConfigError::MissingValue("db_name"));
        }
        if self.named_bin.as_os_str().is_empty() {
            return Err(ConfigError::MissingValue("named_bin"));
        }
        if self.run_as_user.is_empty() {
            return Err(ConfigError::MissingValue("run_as_user"));
        }
        if self.default_ttl == 0 {
            return Err(ConfigError::InvalidTtl(
                "Default TTL must be greater than 0".to_string(),
            ));
        }
        if self.shutdown_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "Shutdown timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
