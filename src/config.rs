//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every field has a default, so an empty file (or [`Config::default`])
//! targets a drone at its factory address.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, TelloError};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub flight: FlightConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Drone endpoint and local listen port
#[derive(Debug, Deserialize, Clone)]
pub struct NetworkConfig {
    #[serde(default = "default_drone_ip")]
    pub drone_ip: String,

    #[serde(default = "default_command_port")]
    pub command_port: u16,

    #[serde(default = "default_local_port")]
    pub local_port: u16,
}

/// Handshake, receive loop and heartbeat timing
#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "default_connection_timeout_s")]
    pub connection_timeout_s: u64,

    #[serde(default = "default_connect_poll_ms")]
    pub connect_poll_ms: u64,

    #[serde(default = "default_receive_poll_ms")]
    pub receive_poll_ms: u64,

    #[serde(default = "default_disconnect_timeout_ms")]
    pub disconnect_timeout_ms: u64,

    #[serde(default = "default_disconnect_backoff_ms")]
    pub disconnect_backoff_ms: u64,

    #[serde(default = "default_heartbeat_enabled")]
    pub heartbeat_enabled: bool,

    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
}

/// Values sent along with flight commands
#[derive(Debug, Deserialize, Clone)]
pub struct FlightConfig {
    #[serde(default)]
    pub gmt_offset_hours: i16,

    #[serde(default = "default_takeoff_alt_limit_m")]
    pub takeoff_alt_limit_m: u16,
}

/// Log output settings for the binary
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_drone_ip() -> String { "192.168.10.1".to_string() }
fn default_command_port() -> u16 { 8889 }
fn default_local_port() -> u16 { 9000 }

fn default_connection_timeout_s() -> u64 { 10 }
fn default_connect_poll_ms() -> u64 { 50 }
fn default_receive_poll_ms() -> u64 { 5 }
fn default_disconnect_timeout_ms() -> u64 { 1000 }
fn default_disconnect_backoff_ms() -> u64 { 1000 }
fn default_heartbeat_enabled() -> bool { true }
fn default_heartbeat_interval_ms() -> u64 { 20 }

fn default_takeoff_alt_limit_m() -> u16 { 30 }

fn default_log_level() -> String { "info".to_string() }

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            drone_ip: default_drone_ip(),
            command_port: default_command_port(),
            local_port: default_local_port(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connection_timeout_s: default_connection_timeout_s(),
            connect_poll_ms: default_connect_poll_ms(),
            receive_poll_ms: default_receive_poll_ms(),
            disconnect_timeout_ms: default_disconnect_timeout_ms(),
            disconnect_backoff_ms: default_disconnect_backoff_ms(),
            heartbeat_enabled: default_heartbeat_enabled(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
        }
    }
}

impl Default for FlightConfig {
    fn default() -> Self {
        Self {
            gmt_offset_hours: 0,
            takeoff_alt_limit_m: default_takeoff_alt_limit_m(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl NetworkConfig {
    /// Drone command endpoint
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `drone_ip` is not an IP address
    pub fn drone_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self.drone_ip.parse().map_err(|_| {
            TelloError::Config(toml::de::Error::custom(format!(
                "drone_ip '{}' is not a valid IP address",
                self.drone_ip
            )))
        })?;
        Ok(SocketAddr::new(ip, self.command_port))
    }
}

impl SessionConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_s)
    }

    pub fn connect_poll(&self) -> Duration {
        Duration::from_millis(self.connect_poll_ms)
    }

    pub fn receive_poll(&self) -> Duration {
        Duration::from_millis(self.receive_poll_ms)
    }

    pub fn disconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.disconnect_timeout_ms)
    }

    pub fn disconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.disconnect_backoff_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use tello_link::config::Config;
    ///
    /// let config = Config::load("config/tello.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        self.network.drone_addr()?;

        if self.network.command_port == 0 {
            return Err(invalid("command_port must be greater than 0"));
        }

        if self.network.local_port == 0 {
            return Err(invalid("local_port must be greater than 0"));
        }

        if self.session.connection_timeout_s == 0 || self.session.connection_timeout_s > 300 {
            return Err(invalid("connection_timeout_s must be between 1 and 300"));
        }

        for (name, value) in [
            ("connect_poll_ms", self.session.connect_poll_ms),
            ("receive_poll_ms", self.session.receive_poll_ms),
            ("disconnect_timeout_ms", self.session.disconnect_timeout_ms),
            ("disconnect_backoff_ms", self.session.disconnect_backoff_ms),
            ("heartbeat_interval_ms", self.session.heartbeat_interval_ms),
        ] {
            if value == 0 || value > 60000 {
                return Err(invalid(&format!("{} must be between 1 and 60000", name)));
            }
        }

        if !(-12..=14).contains(&self.flight.gmt_offset_hours) {
            return Err(invalid("gmt_offset_hours must be between -12 and 14"));
        }

        if self.flight.takeoff_alt_limit_m == 0 || self.flight.takeoff_alt_limit_m > 500 {
            return Err(invalid("takeoff_alt_limit_m must be between 1 and 500"));
        }

        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(invalid(
                "logging level must be one of: trace, debug, info, warn, error",
            ));
        }

        Ok(())
    }
}

fn invalid(message: &str) -> TelloError {
    TelloError::Config(toml::de::Error::custom(message))
}
