//! Declarative configuration loading from YAML, TOML, and environment variables.
//!
//! The mirror structs here deserialize with serde and are converted into the
//! programmatic [`ServiceConfig`](crate::config::ServiceConfig) through its
//! builder, so file-based and programmatic configuration are validated alike.
//!
//! # Supported Formats
//!
//! - **YAML** (requires `config-file` feature): `ServiceConfig::from_yaml("hazelmap.yaml")`
//! - **TOML** (requires `config-file` feature): `ServiceConfig::from_toml("hazelmap.toml")`
//! - **Environment Variables** (always available): `ServiceConfig::from_env()`
//!
//! # Example YAML
//!
//! ```yaml
//! member-id: 3f0c2b8e-58b1-4a51-9d55-2a4f3e1d9c10
//! partition-count: 271
//! default-map:
//!   operation-timeout-ms: 120000
//!   expiry-scan-interval-ms: 5000
//! maps:
//!   - name: sessions
//!     default-ttl-ms: 1800000
//!   - name: audit
//!     expiry-sweep: false
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{ConfigError, MapConfig, MapConfigBuilder, ServiceConfig, ServiceConfigBuilder};

/// Top-level file-based configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
pub struct FileConfig {
    /// Member id as a UUID string. Generated when absent.
    pub member_id: Option<String>,
    /// Number of partitions of the keyspace.
    pub partition_count: Option<u32>,
    /// Settings applied to maps without their own entry.
    pub default_map: Option<FileMapConfig>,
    /// Per-map settings.
    pub maps: Option<Vec<FileMapConfig>>,
}

/// File-based map configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
pub struct FileMapConfig {
    /// Map name; ignored for the default map.
    pub name: Option<String>,
    /// TTL in milliseconds applied to writes without their own.
    pub default_ttl_ms: Option<u64>,
    /// Interval of the background expiry sweep in milliseconds.
    pub expiry_scan_interval_ms: Option<u64>,
    /// Set to `false` to purge expired entries on access only.
    pub expiry_sweep: Option<bool>,
    /// Time a mutation waits on a key locked by another owner, in milliseconds.
    pub operation_timeout_ms: Option<u64>,
}

impl FileMapConfig {
    fn into_map_config(self, fallback_name: &str) -> Result<MapConfig, ConfigError> {
        let name = self.name.unwrap_or_else(|| fallback_name.to_string());
        let mut builder = MapConfigBuilder::new(name);

        if let Some(ms) = self.default_ttl_ms {
            builder = builder.default_ttl(Duration::from_millis(ms));
        }
        if let Some(ms) = self.expiry_scan_interval_ms {
            builder = builder.expiry_scan_interval(Duration::from_millis(ms));
        }
        if self.expiry_sweep == Some(false) {
            builder = builder.disable_expiry_sweep();
        }
        if let Some(ms) = self.operation_timeout_ms {
            builder = builder.operation_timeout(Duration::from_millis(ms));
        }

        builder.build()
    }
}

impl TryFrom<FileConfig> for ServiceConfig {
    type Error = ConfigError;

    fn try_from(file: FileConfig) -> Result<Self, Self::Error> {
        let mut builder = ServiceConfigBuilder::new();

        if let Some(id) = file.member_id {
            let id = Uuid::parse_str(id.trim())
                .map_err(|e| ConfigError::new(format!("invalid member-id '{id}': {e}")))?;
            builder = builder.member_id(id);
        }

        if let Some(count) = file.partition_count {
            builder = builder.partition_count(count);
        }

        if let Some(default_map) = file.default_map {
            builder = builder.default_map(default_map.into_map_config("default")?);
        }

        for map in file.maps.unwrap_or_default() {
            if map.name.is_none() {
                return Err(ConfigError::new("every entry under maps needs a name"));
            }
            builder = builder.add_map(map.into_map_config("")?);
        }

        builder.build()
    }
}

impl ServiceConfig {
    /// Loads configuration from a YAML file.
    ///
    /// Requires the `config-file` feature.
    #[cfg(feature = "config-file")]
    pub fn from_yaml<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::new(format!("failed to read YAML config file: {e}"))
        })?;
        let file_config: FileConfig = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::new(format!("failed to parse YAML config: {e}")))?;
        file_config.try_into()
    }

    /// Loads configuration from a TOML file.
    ///
    /// Requires the `config-file` feature.
    #[cfg(feature = "config-file")]
    pub fn from_toml<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::new(format!("failed to read TOML config file: {e}"))
        })?;
        let file_config: FileConfig = toml_crate::from_str(&content)
            .map_err(|e| ConfigError::new(format!("failed to parse TOML config: {e}")))?;
        file_config.try_into()
    }

    /// Loads configuration from environment variables.
    ///
    /// This method is always available (no feature flag required).
    ///
    /// | Variable | Maps to |
    /// |----------|---------|
    /// | `HAZELMAP_MEMBER_ID` | `member_id` |
    /// | `HAZELMAP_PARTITION_COUNT` | `partition_count` |
    /// | `HAZELMAP_DEFAULT_TTL_MS` | default map TTL |
    /// | `HAZELMAP_EXPIRY_SCAN_INTERVAL_MS` | default map sweep interval |
    /// | `HAZELMAP_OPERATION_TIMEOUT_MS` | default map operation timeout |
    ///
    /// Numeric variables that do not parse are ignored.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with(|name| std::env::var(name).ok())
    }

    fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let parse_u64 = |name: &str| lookup(name).and_then(|v| v.trim().parse::<u64>().ok());

        let mut file_config = FileConfig {
            member_id: lookup("HAZELMAP_MEMBER_ID"),
            partition_count: lookup("HAZELMAP_PARTITION_COUNT")
                .and_then(|v| v.trim().parse::<u32>().ok()),
            ..Default::default()
        };

        let default_map = FileMapConfig {
            default_ttl_ms: parse_u64("HAZELMAP_DEFAULT_TTL_MS"),
            expiry_scan_interval_ms: parse_u64("HAZELMAP_EXPIRY_SCAN_INTERVAL_MS"),
            operation_timeout_ms: parse_u64("HAZELMAP_OPERATION_TIMEOUT_MS"),
            ..Default::default()
        };
        if default_map.default_ttl_ms.is_some()
            || default_map.expiry_scan_interval_ms.is_some()
            || default_map.operation_timeout_ms.is_some()
        {
            file_config.default_map = Some(default_map);
        }

        file_config.try_into()
    }
}

/// Loads a configuration file, detecting the format by extension.
///
/// Supports `.yaml`, `.yml`, and `.toml` extensions.
/// Requires the `config-file` feature.
#[cfg(feature = "config-file")]
pub fn load_config<P: AsRef<std::path::Path>>(path: P) -> Result<ServiceConfig, ConfigError> {
    let path = path.as_ref();
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml" | "yml") => ServiceConfig::from_yaml(path),
        Some("toml") => ServiceConfig::from_toml(path),
        Some(ext) => Err(ConfigError::new(format!(
            "unsupported config file extension: .{ext} (expected .yaml, .yml, or .toml)"
        ))),
        None => Err(ConfigError::new(
            "config file has no extension; expected .yaml, .yml, or .toml",
        )),
    }
}
