//! Configuration management for the diskbridge daemon.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/diskbridge/config.toml`.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::{SessionOptions, DEFAULT_MAX_CONSECUTIVE_ERRORS};
use crate::storage::{Capacity, DEFAULT_MAX_FILES, DEFAULT_MAX_PARTITIONS, DEFAULT_MOUNT_PREFIX};

/// Default address the daemon listens on.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:7420";

/// Upper bound for `max_partitions`.
pub const MAX_PARTITIONS_LIMIT: usize = 4096;

/// Upper bound for `max_files`.
pub const MAX_FILES_LIMIT: usize = 65536;

/// Upper bound for `io_timeout_secs`.
pub const MAX_IO_TIMEOUT_SECS: u64 = 3600;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),

    #[error("listen_addr must be a socket address such as 127.0.0.1:7420, got {0}")]
    InvalidListenAddr(String),

    #[error("max_partitions must be between 1 and 4096, got {0}")]
    InvalidMaxPartitions(usize),

    #[error("max_files must be between 1 and 65536, got {0}")]
    InvalidMaxFiles(usize),

    #[error("io_timeout_secs must be between 0 and 3600 seconds, got {0}")]
    InvalidIoTimeout(u64),

    #[error("mount_prefix must be an absolute path, got {0:?}")]
    RelativeMountPrefix(PathBuf),

    #[error("lsblk_program must not be empty")]
    EmptyLsblkProgram,
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for the diskbridge daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General daemon configuration.
    pub daemon: DaemonConfig,

    /// Listener and channel timeouts.
    pub transport: TransportConfig,

    /// Storage enumeration.
    pub storage: StorageConfig,

    /// File streaming.
    pub transfer: TransferConfig,
}

/// General daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Directory for daily rolling log files. Logs go to stderr only when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

/// Listener and channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransportConfig {
    /// Address to accept peer connections on.
    pub listen_addr: String,

    /// Seconds to wait for the next command before dropping the peer (0 = forever).
    pub idle_timeout_secs: u64,

    /// Seconds allowed for a SELECT payload or a write (0 = no timeout).
    pub io_timeout_secs: u64,
}

/// Storage enumeration configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Program used to list block devices, resolved through `PATH`.
    pub lsblk_program: String,

    /// Directory partitions are mounted under, one subdirectory per partition.
    pub mount_prefix: PathBuf,

    /// Maximum partitions kept per disk.
    pub max_partitions: usize,

    /// Maximum files kept per partition.
    pub max_files: usize,
}

/// File streaming configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransferConfig {
    /// Directory for staging copies of files being streamed.
    pub staging_dir: PathBuf,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: None,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            idle_timeout_secs: 0,
            io_timeout_secs: 30,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            lsblk_program: "lsblk".to_string(),
            mount_prefix: PathBuf::from(DEFAULT_MOUNT_PREFIX),
            max_partitions: DEFAULT_MAX_PARTITIONS,
            max_files: DEFAULT_MAX_FILES,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            staging_dir: default_staging_dir(),
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("diskbridge")
        .join("config.toml")
}

/// Returns the default staging directory.
fn default_staging_dir() -> PathBuf {
    std::env::temp_dir().join("diskbridge-staging")
}

fn secs(value: u64) -> Option<Duration> {
    (value > 0).then(|| Duration::from_secs(value))
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - DISKBRIDGE_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    /// - DISKBRIDGE_LISTEN_ADDR: Override listen address
    /// - DISKBRIDGE_MOUNT_PREFIX: Override partition mount prefix
    ///
    /// Returns the overridden keys with their new values so the caller can
    /// log them once the subscriber is installed.
    pub fn apply_env_overrides(&mut self) -> Vec<(&'static str, String)> {
        let mut applied = Vec::new();

        if let Some(level) = env_override("DISKBRIDGE_LOG_LEVEL") {
            self.daemon.log_level = level.clone();
            applied.push(("log_level", level));
        }

        if let Some(addr) = env_override("DISKBRIDGE_LISTEN_ADDR") {
            self.transport.listen_addr = addr.clone();
            applied.push(("listen_addr", addr));
        }

        if let Some(prefix) = env_override("DISKBRIDGE_MOUNT_PREFIX") {
            self.storage.mount_prefix = PathBuf::from(&prefix);
            applied.push(("mount_prefix", prefix));
        }

        applied
    }

    /// Validate the configuration values.
    ///
    /// Returns an error if any configuration value is outside the valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let level = self.daemon.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.daemon.log_level.clone()));
        }

        self.listen_addr()?;

        if self.transport.io_timeout_secs > MAX_IO_TIMEOUT_SECS {
            return Err(ConfigError::InvalidIoTimeout(self.transport.io_timeout_secs));
        }

        if !(1..=MAX_PARTITIONS_LIMIT).contains(&self.storage.max_partitions) {
            return Err(ConfigError::InvalidMaxPartitions(self.storage.max_partitions));
        }

        if !(1..=MAX_FILES_LIMIT).contains(&self.storage.max_files) {
            return Err(ConfigError::InvalidMaxFiles(self.storage.max_files));
        }

        if !self.storage.mount_prefix.is_absolute() {
            return Err(ConfigError::RelativeMountPrefix(
                self.storage.mount_prefix.clone(),
            ));
        }

        if self.storage.lsblk_program.trim().is_empty() {
            return Err(ConfigError::EmptyLsblkProgram);
        }

        Ok(())
    }

    /// The parsed listen address.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.transport
            .listen_addr
            .parse()
            .map_err(|_| ConfigError::InvalidListenAddr(self.transport.listen_addr.clone()))
    }

    /// Capacity bounds for the hierarchy.
    pub fn capacity(&self) -> Capacity {
        Capacity {
            max_partitions: self.storage.max_partitions,
            max_files: self.storage.max_files,
        }
    }

    /// Timeouts and limits for each session.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            idle_timeout: secs(self.transport.idle_timeout_secs),
            io_timeout: secs(self.transport.io_timeout_secs),
            max_consecutive_errors: DEFAULT_MAX_CONSECUTIVE_ERRORS,
        }
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| {
                anyhow::anyhow!(
                    "Invalid TOML configuration: {}",
                    format_toml_error(&e, toml_str)
                )
            })
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Non-empty value of an environment variable.
fn env_override(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error, source: &str) -> String {
    let mut msg = error.message().trim_end().to_string();

    if let Some(before) = error.span().and_then(|span| source.get(..span.start)) {
        let line = before.matches('\n').count() + 1;
        let column = before
            .rsplit('\n')
            .next()
            .map_or(0, |tail| tail.chars().count())
            + 1;
        msg.push_str(&format!(" (line {line}, column {column})"));
    }

    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.daemon.log_level, "info");
        assert!(config.daemon.log_dir.is_none());
        assert_eq!(config.transport.listen_addr, "127.0.0.1:7420");
        assert_eq!(config.transport.idle_timeout_secs, 0);
        assert_eq!(config.transport.io_timeout_secs, 30);
        assert_eq!(config.storage.lsblk_program, "lsblk");
        assert_eq!(config.storage.mount_prefix, PathBuf::from("/mnt/disks"));
        assert_eq!(config.storage.max_partitions, 16);
        assert_eq!(config.storage.max_files, 256);
        assert!(config
            .transfer
            .staging_dir
            .to_string_lossy()
            .contains("diskbridge-staging"));
    }

    #[test]
    fn test_from_toml_empty() {
        // Empty TOML should use all defaults
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_from_toml_partial() {
        let toml = r#"
[daemon]
log_level = "debug"

[storage]
max_files = 32
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.daemon.log_level, "debug");
        assert_eq!(config.storage.max_files, 32);
        // Other values should be defaults
        assert_eq!(config.storage.max_partitions, 16);
        assert_eq!(config.transport.listen_addr, DEFAULT_LISTEN_ADDR);
    }

    #[test]
    fn test_from_toml_full() {
        let toml = r#"
[daemon]
log_level = "trace"
log_dir = "/var/log/diskbridge"

[transport]
listen_addr = "0.0.0.0:9000"
idle_timeout_secs = 600
io_timeout_secs = 5

[storage]
lsblk_program = "/usr/bin/lsblk"
mount_prefix = "/media/usb"
max_partitions = 8
max_files = 1024

[transfer]
staging_dir = "/var/tmp/stage"
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.daemon.log_level, "trace");
        assert_eq!(
            config.daemon.log_dir,
            Some(PathBuf::from("/var/log/diskbridge"))
        );
        assert_eq!(config.transport.listen_addr, "0.0.0.0:9000");
        assert_eq!(config.transport.idle_timeout_secs, 600);
        assert_eq!(config.transport.io_timeout_secs, 5);
        assert_eq!(config.storage.lsblk_program, "/usr/bin/lsblk");
        assert_eq!(config.storage.mount_prefix, PathBuf::from("/media/usb"));
        assert_eq!(config.storage.max_partitions, 8);
        assert_eq!(config.storage.max_files, 1024);
        assert_eq!(config.transfer.staging_dir, PathBuf::from("/var/tmp/stage"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_invalid_syntax() {
        let toml = r#"
[daemon
log_level = "debug"
"#;
        let result = Config::from_toml(toml);
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Invalid TOML"));
    }

    #[test]
    fn test_from_toml_wrong_type() {
        let toml = r#"
[storage]
max_files = "lots"
"#;
        let result = Config::from_toml(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_from_toml_error_reports_line_and_column() {
        let toml = "[storage]\nmount_prefix = \"/mnt/disks\"\nmax_files = \"lots\"\n";

        let err = Config::from_toml(toml).unwrap_err().to_string();

        assert!(err.contains("(line 3, column 13)"), "{err}");
    }

    #[test]
    fn test_format_toml_error_counts_chars() {
        let source = "# é\n[storage]\nmax_partitions = []\n";
        let err = toml::from_str::<Config>(source).unwrap_err();

        let msg = format_toml_error(&err, source);

        assert!(msg.contains("(line 3, column 18)"), "{msg}");
    }

    #[test]
    fn test_to_toml() {
        let config = Config::default();
        let toml = config.to_toml().unwrap();

        assert!(toml.contains("[daemon]"));
        assert!(toml.contains("[transport]"));
        assert!(toml.contains("[storage]"));
        assert!(toml.contains("[transfer]"));
        assert!(!toml.contains("log_dir"));
    }

    #[test]
    fn test_roundtrip_custom() {
        let mut original = Config::default();
        original.daemon.log_level = "warn".to_string();
        original.daemon.log_dir = Some(PathBuf::from("/tmp/logs"));
        original.transport.idle_timeout_secs = 120;
        original.storage.max_partitions = 4;

        let toml = original.to_toml().unwrap();
        let loaded = Config::from_toml(&toml).unwrap();

        assert_eq!(original, loaded);
    }

    #[test]
    fn test_load_missing_file() {
        let config = Config::load("/nonexistent/path/config.toml").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let mut original = Config::default();
        original.storage.mount_prefix = PathBuf::from("/media");
        original.transport.io_timeout_secs = 10;

        original.save(&config_path).unwrap();
        let loaded = Config::load(&config_path).unwrap();

        assert_eq!(original, loaded);
    }

    #[test]
    fn test_load_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        fs::write(&config_path, "invalid [ toml").unwrap();

        let result = Config::load(&config_path);
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Failed to parse config file"));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.to_string_lossy().contains("diskbridge"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_capacity_and_session_options() {
        let mut config = Config::default();
        config.storage.max_partitions = 3;
        config.transport.idle_timeout_secs = 0;
        config.transport.io_timeout_secs = 7;

        assert_eq!(
            config.capacity(),
            Capacity {
                max_partitions: 3,
                max_files: 256
            }
        );
        let options = config.session_options();
        assert_eq!(options.idle_timeout, None);
        assert_eq!(options.io_timeout, Some(Duration::from_secs(7)));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var("DISKBRIDGE_LOG_LEVEL", "debug");
        std::env::set_var("DISKBRIDGE_LISTEN_ADDR", "0.0.0.0:7000");
        std::env::set_var("DISKBRIDGE_MOUNT_PREFIX", "/media/disks");

        let mut config = Config::default();
        let applied = config.apply_env_overrides();

        std::env::remove_var("DISKBRIDGE_LOG_LEVEL");
        std::env::remove_var("DISKBRIDGE_LISTEN_ADDR");
        std::env::remove_var("DISKBRIDGE_MOUNT_PREFIX");

        assert_eq!(
            applied,
            vec![
                ("log_level", "debug".to_string()),
                ("listen_addr", "0.0.0.0:7000".to_string()),
                ("mount_prefix", "/media/disks".to_string()),
            ]
        );
        assert_eq!(config.daemon.log_level, "debug");
        assert_eq!(config.transport.listen_addr, "0.0.0.0:7000");
        assert_eq!(config.storage.mount_prefix, PathBuf::from("/media/disks"));
    }

    #[test]
    #[serial]
    fn test_env_override_empty_does_not_override() {
        std::env::set_var("DISKBRIDGE_LISTEN_ADDR", "");

        let mut config = Config::default();
        let applied = config.apply_env_overrides();

        std::env::remove_var("DISKBRIDGE_LISTEN_ADDR");

        assert!(applied.iter().all(|(key, _)| *key != "listen_addr"));

        assert_eq!(config.transport.listen_addr, DEFAULT_LISTEN_ADDR);
    }

    #[test]
    #[serial]
    fn test_env_override_unset_does_not_override() {
        std::env::remove_var("DISKBRIDGE_LOG_LEVEL");
        std::env::remove_var("DISKBRIDGE_MOUNT_PREFIX");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config.daemon.log_level, "info");
        assert_eq!(config.storage.mount_prefix, PathBuf::from("/mnt/disks"));
    }

    #[test]
    fn test_validate_default_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = Config::default();
        config.daemon.log_level = "DEBUG".to_string();
        assert!(config.validate().is_ok());

        config.daemon.log_level = "verbose".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel("verbose".to_string()))
        );
    }

    #[test]
    fn test_validate_listen_addr() {
        let mut config = Config::default();
        config.transport.listen_addr = "[::1]:7420".to_string();
        assert!(config.validate().is_ok());

        config.transport.listen_addr = "localhost".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidListenAddr("localhost".to_string()))
        );
    }

    #[test]
    fn test_validate_capacity_bounds() {
        let mut config = Config::default();

        config.storage.max_partitions = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidMaxPartitions(0)));

        config.storage.max_partitions = MAX_PARTITIONS_LIMIT;
        assert!(config.validate().is_ok());

        config.storage.max_partitions = MAX_PARTITIONS_LIMIT + 1;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidMaxPartitions(MAX_PARTITIONS_LIMIT + 1))
        );

        config.storage.max_partitions = 16;
        config.storage.max_files = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidMaxFiles(0)));

        config.storage.max_files = MAX_FILES_LIMIT;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_io_timeout() {
        let mut config = Config::default();

        config.transport.io_timeout_secs = 0;
        assert!(config.validate().is_ok());

        config.transport.io_timeout_secs = MAX_IO_TIMEOUT_SECS;
        assert!(config.validate().is_ok());

        config.transport.io_timeout_secs = MAX_IO_TIMEOUT_SECS + 1;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidIoTimeout(MAX_IO_TIMEOUT_SECS + 1))
        );
    }

    #[test]
    fn test_validate_mount_prefix() {
        let mut config = Config::default();
        config.storage.mount_prefix = PathBuf::from("mnt/disks");
        assert_eq!(
            config.validate(),
            Err(ConfigError::RelativeMountPrefix(PathBuf::from("mnt/disks")))
        );
    }

    #[test]
    fn test_validate_lsblk_program() {
        let mut config = Config::default();
        config.storage.lsblk_program = "  ".to_string();
        assert_eq!(config.validate(), Err(ConfigError::EmptyLsblkProgram));
    }
}
