//! Map and service configuration types and builders.

use std::collections::HashMap;
use std::time::Duration;

use uuid::Uuid;

/// Default number of partitions of the keyspace.
pub const DEFAULT_PARTITION_COUNT: u32 = 271;
/// Default interval of the background expiry sweep.
const DEFAULT_EXPIRY_SCAN_INTERVAL: Duration = Duration::from_secs(5);
/// Default time a mutation waits for a key locked by another owner.
const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Configuration error returned when validation fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("configuration error: {message}")]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<ConfigError> for hazelmap_core::HazelmapError {
    fn from(err: ConfigError) -> Self {
        hazelmap_core::HazelmapError::Configuration(err.message)
    }
}

/// Configuration of a single named map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapConfig {
    name: String,
    default_ttl: Option<Duration>,
    expiry_scan_interval: Option<Duration>,
    operation_timeout: Duration,
}

impl MapConfig {
    /// Creates a new map configuration builder.
    pub fn builder(name: impl Into<String>) -> MapConfigBuilder {
        MapConfigBuilder::new(name)
    }

    /// Returns the map name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the TTL applied to writes that do not carry their own.
    ///
    /// `None` means such entries never expire.
    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }

    /// Returns the interval of the background expiry sweep, if enabled.
    pub fn expiry_scan_interval(&self) -> Option<Duration> {
        self.expiry_scan_interval
    }

    /// Returns how long a mutation waits on a key locked by another owner.
    pub fn operation_timeout(&self) -> Duration {
        self.operation_timeout
    }

    pub(crate) fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            default_ttl: None,
            expiry_scan_interval: Some(DEFAULT_EXPIRY_SCAN_INTERVAL),
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }
}

/// Builder for `MapConfig`.
#[derive(Debug, Clone)]
pub struct MapConfigBuilder {
    name: String,
    default_ttl: Option<Duration>,
    expiry_scan_interval: Option<Option<Duration>>,
    operation_timeout: Option<Duration>,
}

impl MapConfigBuilder {
    /// Creates a builder for the map with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_ttl: None,
            expiry_scan_interval: None,
            operation_timeout: None,
        }
    }

    /// Sets the TTL applied to writes that do not carry their own.
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Sets the interval of the background expiry sweep.
    pub fn expiry_scan_interval(mut self, interval: Duration) -> Self {
        self.expiry_scan_interval = Some(Some(interval));
        self
    }

    /// Disables the background expiry sweep; expired entries are then purged on access only.
    pub fn disable_expiry_sweep(mut self) -> Self {
        self.expiry_scan_interval = Some(None);
        self
    }

    /// Sets how long a mutation waits on a key locked by another owner.
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    /// Builds the map configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - the name is empty
    /// - `default_ttl`, `expiry_scan_interval` or `operation_timeout` is zero
    pub fn build(self) -> Result<MapConfig, ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::new("map name must not be empty"));
        }
        if self.default_ttl == Some(Duration::ZERO) {
            return Err(ConfigError::new("default_ttl must be greater than zero"));
        }

        let expiry_scan_interval = self
            .expiry_scan_interval
            .unwrap_or(Some(DEFAULT_EXPIRY_SCAN_INTERVAL));
        if expiry_scan_interval == Some(Duration::ZERO) {
            return Err(ConfigError::new(
                "expiry_scan_interval must be greater than zero",
            ));
        }

        let operation_timeout = self.operation_timeout.unwrap_or(DEFAULT_OPERATION_TIMEOUT);
        if operation_timeout.is_zero() {
            return Err(ConfigError::new(
                "operation_timeout must be greater than zero",
            ));
        }

        Ok(MapConfig {
            name: self.name,
            default_ttl: self.default_ttl,
            expiry_scan_interval,
            operation_timeout,
        })
    }
}

/// Configuration of the member-side map service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    member_id: Uuid,
    partition_count: u32,
    default_map: MapConfig,
    maps: HashMap<String, MapConfig>,
}

impl ServiceConfig {
    /// Creates a new service configuration builder.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder::new()
    }

    /// Returns the id of this member, stamped on every event it publishes.
    pub fn member_id(&self) -> Uuid {
        self.member_id
    }

    /// Returns the number of partitions of the keyspace.
    pub fn partition_count(&self) -> u32 {
        self.partition_count
    }

    /// Returns the configuration applied to maps without an explicit entry.
    pub fn default_map(&self) -> &MapConfig {
        &self.default_map
    }

    /// Returns the configuration for the named map.
    ///
    /// Falls back to the default map configuration under the requested name.
    pub fn map_config(&self, name: &str) -> MapConfig {
        self.maps
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.default_map.renamed(name))
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            member_id: Uuid::new_v4(),
            partition_count: DEFAULT_PARTITION_COUNT,
            default_map: MapConfig::default(),
            maps: HashMap::new(),
        }
    }
}

/// Builder for `ServiceConfig`.
#[derive(Debug, Clone, Default)]
pub struct ServiceConfigBuilder {
    member_id: Option<Uuid>,
    partition_count: Option<u32>,
    default_map: Option<MapConfig>,
    maps: Vec<MapConfig>,
}

impl ServiceConfigBuilder {
    /// Creates a new service configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the member id. A random id is generated when unset.
    pub fn member_id(mut self, id: Uuid) -> Self {
        self.member_id = Some(id);
        self
    }

    /// Sets the number of partitions of the keyspace.
    pub fn partition_count(mut self, count: u32) -> Self {
        self.partition_count = Some(count);
        self
    }

    /// Sets the configuration applied to maps without an explicit entry.
    pub fn default_map(mut self, config: MapConfig) -> Self {
        self.default_map = Some(config);
        self
    }

    /// Adds the configuration of a named map.
    pub fn add_map(mut self, config: MapConfig) -> Self {
        self.maps.push(config);
        self
    }

    /// Builds the service configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the partition count is zero or a map name is
    /// configured twice.
    pub fn build(self) -> Result<ServiceConfig, ConfigError> {
        let partition_count = self.partition_count.unwrap_or(DEFAULT_PARTITION_COUNT);
        if partition_count == 0 {
            return Err(ConfigError::new("partition_count must be greater than zero"));
        }

        let mut maps = HashMap::with_capacity(self.maps.len());
        for config in self.maps {
            let name = config.name().to_string();
            if maps.insert(name.clone(), config).is_some() {
                return Err(ConfigError::new(format!(
                    "map '{name}' is configured more than once"
                )));
            }
        }

        Ok(ServiceConfig {
            member_id: self.member_id.unwrap_or_else(Uuid::new_v4),
            partition_count,
            default_map: self.default_map.unwrap_or_default(),
            maps,
        })
    }
}
