//! # Configuration Management
//!
//! Centralized configuration for the central, login and world processes.
//!
//! Every process reads the same file: the central address, the world/channel
//! topology, interoperability timeouts and transport limits are shared, while
//! the `login` and `world` sections only matter to the process playing that
//! role.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment-specific overrides via `from_env()` / `apply_env()`

use crate::error::{ProtocolError, Result};
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Max allowed frame body size (64 KB)
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Port the central process accepts interoperability connections on
pub const DEFAULT_CENTRAL_PORT: u16 = 8383;

/// Port login front-ends accept clients on
pub const DEFAULT_LOGIN_PORT: u16 = 8484;

/// First channel port; channel `n` listens on `DEFAULT_CHANNEL_PORT + n`
pub const DEFAULT_CHANNEL_PORT: u16 = 8585;

/// First channel interoperability port
pub const DEFAULT_CHANNEL_INTEROP_PORT: u16 = 8685;

/// Whether the secondary password prompt is enabled by default
pub const ENABLE_SECONDARY_PASSWORD: bool = true;

/// Whether ranking data is sent with the character roster by default
pub const ENABLE_RANKING: bool = false;

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct NetworkConfig {
    /// Where the central process listens
    #[serde(default)]
    pub central: CentralConfig,

    /// Login front-end settings
    #[serde(default)]
    pub login: LoginConfig,

    /// Identity of a world/channel process
    #[serde(default)]
    pub world: WorldConfig,

    /// Known worlds and their channels
    #[serde(default)]
    pub topology: TopologyConfig,

    /// Interoperability call settings
    #[serde(default)]
    pub rpc: RpcConfig,

    /// Transport configuration
    #[serde(default)]
    pub transport: TransportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NetworkConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load defaults, then apply environment overrides
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        Ok(config)
    }

    /// Override values from `WORLD_LINK_*` environment variables
    pub fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("WORLD_LINK_CENTRAL_HOST") {
            self.central.host = host;
        }

        if let Ok(port) = std::env::var("WORLD_LINK_CENTRAL_PORT") {
            if let Ok(val) = port.parse::<u16>() {
                self.central.port = val;
            }
        }

        if let Ok(timeout) = std::env::var("WORLD_LINK_RPC_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                self.rpc.call_timeout = Duration::from_millis(val);
            }
        }

        if let Ok(flag) = std::env::var("WORLD_LINK_SECONDARY_PASSWORD") {
            if let Ok(val) = flag.parse::<bool>() {
                self.login.secondary_password_enabled = val;
            }
        }

        if let Ok(id) = std::env::var("WORLD_LINK_WORLD_ID") {
            if let Ok(val) = id.parse::<u8>() {
                self.world.world_id = val;
            }
        }

        if let Ok(id) = std::env::var("WORLD_LINK_CHANNEL_ID") {
            if let Ok(val) = id.parse::<u8>() {
                self.world.channel_id = val;
            }
        }
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        errors.extend(self.central.validate());
        errors.extend(self.login.validate());
        errors.extend(self.topology.validate());
        errors.extend(self.rpc.validate());
        errors.extend(self.transport.validate());
        errors.extend(self.logging.validate());

        // The world section must name a channel that exists
        if !self.topology.worlds.is_empty()
            && self
                .topology
                .channel(self.world.world_id, self.world.channel_id)
                .is_none()
        {
            errors.push(format!(
                "World process identity {}/{} is not part of the topology",
                self.world.world_id, self.world.channel_id
            ));
        }

        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Location of the central process
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CentralConfig {
    /// Host the central process is reachable on
    pub host: String,

    /// Interoperability port
    pub port: u16,

    /// How long a migrating client stays in the login directory
    #[serde(default = "default_migration_window", with = "duration_serde")]
    pub migration_window: Duration,
}

fn default_migration_window() -> Duration {
    timeout::MIGRATION_WINDOW
}

impl Default for CentralConfig {
    fn default() -> Self {
        Self {
            host: String::from("127.0.0.1"),
            port: DEFAULT_CENTRAL_PORT,
            migration_window: timeout::MIGRATION_WINDOW,
        }
    }
}

impl CentralConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.host.is_empty() {
            errors.push("Central host cannot be empty".to_string());
        }

        if self.port == 0 {
            errors.push("Central port must be greater than 0".to_string());
        }

        if self.migration_window.is_zero() {
            errors.push("Migration window must be greater than 0".to_string());
        }

        errors
    }
}

/// Login front-end configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoginConfig {
    /// Client listen address (e.g., "0.0.0.0:8484")
    pub address: String,

    /// Whether characters are guarded by a secondary password
    pub secondary_password_enabled: bool,

    /// Whether ranking data is sent with the character roster
    pub ranking_enabled: bool,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            address: format!("0.0.0.0:{DEFAULT_LOGIN_PORT}"),
            secondary_password_enabled: ENABLE_SECONDARY_PASSWORD,
            ranking_enabled: ENABLE_RANKING,
        }
    }
}

impl LoginConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Login address cannot be empty".to_string());
        } else if self.address.parse::<SocketAddr>().is_err() {
            errors.push(format!(
                "Invalid login address format: '{}' (expected format: '0.0.0.0:8484')",
                self.address
            ));
        }

        errors
    }
}

/// Which channel a world process serves
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WorldConfig {
    pub world_id: u8,
    pub channel_id: u8,
}

/// Static description of every world and channel
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TopologyConfig {
    pub worlds: Vec<WorldEntryConfig>,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            worlds: vec![WorldEntryConfig {
                id: 0,
                name: String::from("Scania"),
                channels: (0..2)
                    .map(|id| ChannelEntryConfig {
                        id,
                        host: Ipv4Addr::LOCALHOST,
                        port: DEFAULT_CHANNEL_PORT + u16::from(id),
                        interop_host: None,
                        interop_port: DEFAULT_CHANNEL_INTEROP_PORT + u16::from(id),
                        user_limit: 1000,
                    })
                    .collect(),
            }],
        }
    }
}

impl TopologyConfig {
    pub fn channel(&self, world_id: u8, channel_id: u8) -> Option<&ChannelEntryConfig> {
        self.worlds
            .iter()
            .find(|w| w.id == world_id)
            .and_then(|w| w.channels.iter().find(|c| c.id == channel_id))
    }

    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.worlds.is_empty() {
            errors.push("Topology must contain at least one world".to_string());
        }

        for (i, world) in self.worlds.iter().enumerate() {
            if self.worlds[..i].iter().any(|w| w.id == world.id) {
                errors.push(format!("Duplicate world id {}", world.id));
            }

            if world.channels.is_empty() {
                errors.push(format!("World {} has no channels", world.id));
            }

            for (j, channel) in world.channels.iter().enumerate() {
                if world.channels[..j].iter().any(|c| c.id == channel.id) {
                    errors.push(format!(
                        "Duplicate channel id {} in world {}",
                        channel.id, world.id
                    ));
                }

                if channel.port == 0 || channel.interop_port == 0 {
                    errors.push(format!(
                        "Channel {}/{} must have non-zero ports",
                        world.id, channel.id
                    ));
                }

                if channel.user_limit == 0 {
                    errors.push(format!(
                        "Channel {}/{} user limit must be greater than 0",
                        world.id, channel.id
                    ));
                }
            }
        }

        errors
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorldEntryConfig {
    pub id: u8,
    pub name: String,
    pub channels: Vec<ChannelEntryConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChannelEntryConfig {
    pub id: u8,

    /// Address handed to migrating clients
    pub host: Ipv4Addr,

    /// Client port
    pub port: u16,

    /// Address central reaches the interoperability port on; defaults to `host`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interop_host: Option<Ipv4Addr>,

    /// Port the channel answers central interoperability calls on
    pub interop_port: u16,

    /// Users allowed before selection is refused
    pub user_limit: u32,
}

impl ChannelEntryConfig {
    pub fn client_address(&self) -> SocketAddr {
        SocketAddr::from((self.host, self.port))
    }

    pub fn interop_address(&self) -> SocketAddr {
        SocketAddr::from((self.interop_host.unwrap_or(self.host), self.interop_port))
    }
}

/// Interoperability channel settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RpcConfig {
    /// How long a call may wait for its reply
    #[serde(with = "duration_serde")]
    pub call_timeout: Duration,

    /// How long establishing the socket may take
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,

    /// How long central waits on a world when relaying a call
    #[serde(default = "default_relay_timeout", with = "duration_serde")]
    pub relay_timeout: Duration,
}

fn default_relay_timeout() -> Duration {
    timeout::RPC_RELAY_TIMEOUT
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            call_timeout: timeout::RPC_CALL_TIMEOUT,
            connect_timeout: timeout::DEFAULT_TIMEOUT,
            relay_timeout: timeout::RPC_RELAY_TIMEOUT,
        }
    }
}

impl RpcConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.call_timeout.as_millis() < 10 {
            errors.push("RPC call timeout too short (minimum: 10ms)".to_string());
        } else if self.call_timeout.as_secs() > 60 {
            errors.push("RPC call timeout too long (maximum: 60s)".to_string());
        }

        if self.connect_timeout.as_millis() < 10 {
            errors.push("RPC connect timeout too short (minimum: 10ms)".to_string());
        }

        if self.relay_timeout.as_millis() < 10 {
            errors.push("RPC relay timeout too short (minimum: 10ms)".to_string());
        } else if self.relay_timeout >= self.call_timeout {
            errors.push("RPC relay timeout must be shorter than the call timeout".to_string());
        }

        errors
    }
}

/// Transport configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    /// Maximum allowed frame body size in bytes
    pub max_frame_size: usize,

    /// Maximum number of concurrent client connections
    pub max_connections: usize,

    /// Close client connections idle for this long; absent means never
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "option_duration_serde"
    )]
    pub idle_timeout: Option<Duration>,

    /// Timeout for graceful server shutdown
    #[serde(with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
            max_connections: 1000,
            idle_timeout: None,
            shutdown_timeout: timeout::SHUTDOWN_TIMEOUT,
        }
    }
}

impl TransportConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_frame_size < 64 {
            errors.push("Max frame size too small (minimum: 64 bytes)".to_string());
        } else if self.max_frame_size > 16 * 1024 * 1024 {
            errors.push(format!(
                "Max frame size too large: {} bytes (maximum: 16 MB)",
                self.max_frame_size
            ));
        }

        if self.max_connections == 0 {
            errors.push("Max connections must be greater than 0".to_string());
        }

        if let Some(idle) = self.idle_timeout {
            if idle.as_secs() < 1 {
                errors.push("Idle timeout too short (minimum: 1s)".to_string());
            }
        }

        if self.shutdown_timeout.as_secs() > 60 {
            errors.push("Shutdown timeout too long (maximum: 60s)".to_string());
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,

    /// Whether `RUST_LOG` may override `log_level`
    pub env_override: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("world-link"),
            log_level: Level::INFO,
            json_format: false,
            env_override: true,
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Same as `duration_serde`, for optional values
mod option_duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration
            .map(|d| d.as_millis() as u64)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
