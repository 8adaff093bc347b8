//! Server configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use powerman_core::{DEFAULT_MODBUS_PORT, MeterTarget, ModbusSource, Phase};

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server settings.
    pub server: ServerConfig,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Poll loop settings.
    pub collector: CollectorConfig,
    /// Modbus transport settings.
    pub modbus: ModbusConfig,
    /// Meters to poll, one per phase.
    pub phases: Vec<PhaseConfig>,
    /// MQTT publishing.
    pub mqtt: MqttConfig,
    /// Retention windows.
    pub retention: RetentionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            collector: CollectorConfig::default(),
            modbus: ModbusConfig::default(),
            phases: default_phases(),
            mqtt: MqttConfig::default(),
            retention: RetentionConfig::default(),
        }
    }
}

fn default_phases() -> Vec<PhaseConfig> {
    Phase::ALL
        .into_iter()
        .zip(1u8..)
        .map(|(phase, unit_id)| PhaseConfig {
            phase,
            host: "10.0.6.84".to_string(),
            unit_id,
        })
        .collect()
}

impl Config {
    /// Load configuration from `path`, falling back to the built-in defaults.
    ///
    /// A missing file is expected on first run. A file that cannot be read or
    /// parsed is reported with a warning before the defaults are used.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("{}; using built-in defaults", e);
                Self::default()
            }
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return every problem found.
    ///
    /// # Example
    ///
    /// ```
    /// use powerman_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.server.validate());
        errors.extend(self.storage.validate());
        errors.extend(self.collector.validate());
        errors.extend(self.modbus.validate());
        errors.extend(self.mqtt.validate());
        errors.extend(self.retention.validate());

        if self.phases.is_empty() {
            errors.push(ValidationError {
                field: "phases".to_string(),
                message: "at least one phase meter must be configured".to_string(),
            });
        }

        let mut seen = std::collections::HashSet::new();
        for (i, phase) in self.phases.iter().enumerate() {
            let prefix = format!("phases[{}]", i);
            errors.extend(phase.validate(&prefix));

            if !seen.insert(phase.phase) {
                errors.push(ValidationError {
                    field: format!("{}.phase", prefix),
                    message: format!("duplicate phase '{}'", phase.phase),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Meter addresses in polling order.
    pub fn targets(&self) -> Vec<MeterTarget> {
        self.phases
            .iter()
            .map(|p| MeterTarget::new(p.phase, p.host.clone(), p.unit_id))
            .collect()
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:5000").
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".to_string(),
        }
    }
}

impl ServerConfig {
    /// Validate server configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.bind.is_empty() {
            errors.push(ValidationError {
                field: "server.bind".to_string(),
                message: "bind address cannot be empty".to_string(),
            });
        } else {
            let parts: Vec<&str> = self.bind.rsplitn(2, ':').collect();
            if parts.len() != 2 {
                errors.push(ValidationError {
                    field: "server.bind".to_string(),
                    message: format!(
                        "invalid bind address '{}': expected format 'host:port'",
                        self.bind
                    ),
                });
            } else {
                let port_str = parts[0];
                match port_str.parse::<u16>() {
                    Ok(0) => {
                        errors.push(ValidationError {
                            field: "server.bind".to_string(),
                            message: "port cannot be 0".to_string(),
                        });
                    }
                    Err(_) => {
                        errors.push(ValidationError {
                            field: "server.bind".to_string(),
                            message: format!(
                                "invalid port '{}': must be a number 1-65535",
                                port_str
                            ),
                        });
                    }
                    Ok(_) => {}
                }
            }
        }

        errors
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: powerman_store::default_db_path(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "storage.path".to_string(),
                message: "database path cannot be empty".to_string(),
            });
        }

        errors
    }
}

/// Minimum poll interval in seconds.
pub const MIN_POLL_INTERVAL: u64 = 1;
/// Maximum poll interval in seconds (1 hour).
pub const MAX_POLL_INTERVAL: u64 = 3600;

/// Poll loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Seconds to sleep between poll cycles.
    pub poll_interval: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self { poll_interval: 10 }
    }
}

impl CollectorConfig {
    /// Validate collector configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.poll_interval < MIN_POLL_INTERVAL {
            errors.push(ValidationError {
                field: "collector.poll_interval".to_string(),
                message: format!(
                    "poll interval {} is too short (minimum {} second)",
                    self.poll_interval, MIN_POLL_INTERVAL
                ),
            });
        } else if self.poll_interval > MAX_POLL_INTERVAL {
            errors.push(ValidationError {
                field: "collector.poll_interval".to_string(),
                message: format!(
                    "poll interval {} is too long (maximum {} seconds / 1 hour)",
                    self.poll_interval, MAX_POLL_INTERVAL
                ),
            });
        }

        errors
    }

    /// Poll interval as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }
}

/// Modbus TCP transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModbusConfig {
    /// Gateway TCP port.
    pub port: u16,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Register read timeout in milliseconds.
    pub read_timeout_ms: u64,
}

impl Default for ModbusConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_MODBUS_PORT,
            connect_timeout_ms: 3000,
            read_timeout_ms: 3000,
        }
    }
}

impl ModbusConfig {
    /// Validate Modbus configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.port == 0 {
            errors.push(ValidationError {
                field: "modbus.port".to_string(),
                message: "port cannot be 0".to_string(),
            });
        }
        if self.connect_timeout_ms == 0 {
            errors.push(ValidationError {
                field: "modbus.connect_timeout_ms".to_string(),
                message: "timeout must be greater than 0".to_string(),
            });
        }
        if self.read_timeout_ms == 0 {
            errors.push(ValidationError {
                field: "modbus.read_timeout_ms".to_string(),
                message: "timeout must be greater than 0".to_string(),
            });
        }

        errors
    }

    /// Build the register source described by this section.
    pub fn source(&self) -> ModbusSource {
        ModbusSource::new()
            .port(self.port)
            .connect_timeout(Duration::from_millis(self.connect_timeout_ms))
            .read_timeout(Duration::from_millis(self.read_timeout_ms))
    }
}

/// One phase meter on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseConfig {
    /// Phase measured by this meter.
    pub phase: Phase,
    /// Gateway host name or IP address.
    pub host: String,
    /// Modbus unit identifier.
    pub unit_id: u8,
}

impl PhaseConfig {
    /// Validate a phase meter entry.
    pub fn validate(&self, prefix: &str) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.host.trim().is_empty() {
            errors.push(ValidationError {
                field: format!("{}.host", prefix),
                message: "meter host cannot be empty".to_string(),
            });
        }

        // 0 is the broadcast address and 248..=255 are reserved.
        if !(1..=247).contains(&self.unit_id) {
            errors.push(ValidationError {
                field: format!("{}.unit_id", prefix),
                message: format!("unit id {} is outside 1-247", self.unit_id),
            });
        }

        errors
    }
}

/// MQTT publishing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Whether metrics are published at all.
    pub enabled: bool,
    /// Broker URL, `mqtt://host[:port]` or `mqtts://host[:port]`.
    pub broker: String,
    /// Client identifier presented to the broker.
    pub client_id: String,
    /// Optional username.
    pub username: Option<String>,
    /// Optional password.
    pub password: Option<String>,
    /// Prefix for every topic.
    pub topic_prefix: String,
    /// Quality of service level (0, 1 or 2).
    pub qos: u8,
    /// Whether published messages are retained by the broker.
    pub retain: bool,
    /// Keep-alive interval in seconds.
    pub keep_alive: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            broker: "mqtt://localhost:1883".to_string(),
            client_id: "powerman".to_string(),
            username: None,
            password: None,
            topic_prefix: "home/PM".to_string(),
            qos: 0,
            retain: false,
            keep_alive: 30,
        }
    }
}

impl MqttConfig {
    /// Validate MQTT configuration.
    ///
    /// Broker settings are only checked when publishing is enabled.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.topic_prefix.is_empty() {
            errors.push(ValidationError {
                field: "mqtt.topic_prefix".to_string(),
                message: "topic prefix cannot be empty".to_string(),
            });
        } else if self.topic_prefix.contains(['#', '+']) {
            errors.push(ValidationError {
                field: "mqtt.topic_prefix".to_string(),
                message: format!(
                    "topic prefix '{}' cannot contain wildcards",
                    self.topic_prefix
                ),
            });
        }

        if self.qos > 2 {
            errors.push(ValidationError {
                field: "mqtt.qos".to_string(),
                message: format!("qos {} is invalid (must be 0, 1 or 2)", self.qos),
            });
        }

        if !self.enabled {
            return errors;
        }

        if let Err(e) = crate::mqtt::parse_broker_url(&self.broker) {
            errors.push(ValidationError {
                field: "mqtt.broker".to_string(),
                message: e.to_string(),
            });
        }
        if self.client_id.is_empty() {
            errors.push(ValidationError {
                field: "mqtt.client_id".to_string(),
                message: "client id cannot be empty".to_string(),
            });
        }
        if self.username.is_some() != self.password.is_some() {
            errors.push(ValidationError {
                field: "mqtt.username".to_string(),
                message: "username and password must be set together".to_string(),
            });
        }
        if self.keep_alive < 5 {
            errors.push(ValidationError {
                field: "mqtt.keep_alive".to_string(),
                message: format!("keep alive {} is too short (minimum 5 seconds)", self.keep_alive),
            });
        }

        errors
    }
}

/// Retention windows for history snapshots and diagnostic logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Hours of history kept.
    pub history_hours: u32,
    /// Hours of logs kept.
    pub log_hours: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            history_hours: 72,
            log_hours: 24,
        }
    }
}

impl RetentionConfig {
    /// Validate retention configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.history_hours == 0 {
            errors.push(ValidationError {
                field: "retention.history_hours".to_string(),
                message: "history retention must be at least 1 hour".to_string(),
            });
        }
        if self.log_hours == 0 {
            errors.push(ValidationError {
                field: "retention.log_hours".to_string(),
                message: "log retention must be at least 1 hour".to_string(),
            });
        }

        errors
    }

    /// History retention window.
    pub fn history_window(&self) -> time::Duration {
        time::Duration::hours(i64::from(self.history_hours))
    }

    /// Log retention window.
    pub fn log_window(&self) -> time::Duration {
        time::Duration::hours(i64::from(self.log_hours))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `server.bind` or `phases[0].host`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("powerman")
        .join("server.toml")
}
