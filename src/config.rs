//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every key has a default, so an empty file is a valid configuration with
//! a single device. Each `[[devices]]` entry describes one serial link with
//! its own port, message format and output files.

use serde::de::Error;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::codec::{CodecOptions, Schema};
use crate::error::{GroundlinkError, Result};
use crate::geo::GeoCoordinate;
use crate::pipeline::FieldKeys;
use crate::serial::is_standard_baud;
use crate::serial::watchdog::ReconnectPolicy;
use crate::storage::StorageLayout;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_devices")]
    pub devices: Vec<DeviceConfig>,
    #[serde(default)]
    pub home: HomeConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub workers: WorkerConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    /// Human-readable port name or device path
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,

    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,

    #[serde(default = "default_reconnect_settle_ms")]
    pub reconnect_settle_ms: u64,
}

/// One telemetry device: its port and message format
#[derive(Debug, Deserialize, Clone)]
pub struct DeviceConfig {
    /// Distinguishes this device's output files
    #[serde(default)]
    pub id: u32,

    #[serde(default)]
    pub serial: SerialConfig,

    /// Ordered field names of one message
    #[serde(default = "default_schema")]
    pub schema: Vec<String>,

    #[serde(default = "default_delimiter")]
    pub delimiter: String,

    #[serde(default = "default_header")]
    pub header: Option<String>,

    #[serde(default)]
    pub tail: Option<String>,

    #[serde(default = "default_lat_key")]
    pub lat_key: String,

    #[serde(default = "default_lon_key")]
    pub lon_key: String,

    #[serde(default = "default_alt_key")]
    pub alt_key: String,
}

/// Ground station position
#[derive(Debug, Deserialize, Clone)]
pub struct HomeConfig {
    #[serde(default = "default_home_lat")]
    pub lat: f64,

    #[serde(default = "default_home_lon")]
    pub lon: f64,

    #[serde(default)]
    pub alt: f64,
}

/// Output file configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_save_name")]
    pub save_name: String,

    #[serde(default = "default_extension")]
    pub extension: String,

    #[serde(default)]
    pub write_raw: bool,

    #[serde(default = "default_write_track")]
    pub write_track: bool,
}

/// Worker thread timing
#[derive(Debug, Deserialize, Clone)]
pub struct WorkerConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,

    #[serde(default = "default_series_capacity")]
    pub series_capacity: usize,
}

/// Log and status snapshot configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Status snapshot file; no snapshot when unset
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,

    #[serde(default = "default_snapshot_interval_ms")]
    pub snapshot_interval_ms: u64,
}

// Default value functions
fn default_serial_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_baud_rate() -> u32 { 115200 }
fn default_auto_reconnect() -> bool { true }
fn default_reconnect_interval_ms() -> u64 { 2000 }
fn default_reconnect_settle_ms() -> u64 { 100 }

fn default_devices() -> Vec<DeviceConfig> { vec![DeviceConfig::default()] }
fn default_schema() -> Vec<String> {
    ["packet", "lat", "lon", "alt"].iter().map(|s| s.to_string()).collect()
}
fn default_delimiter() -> String { ",".to_string() }
fn default_header() -> Option<String> { Some("DEV0,".to_string()) }
fn default_lat_key() -> String { "lat".to_string() }
fn default_lon_key() -> String { "lon".to_string() }
fn default_alt_key() -> String { "alt".to_string() }

fn default_home_lat() -> f64 { 13.7563 }
fn default_home_lon() -> f64 { 100.5018 }

fn default_data_dir() -> PathBuf { PathBuf::from("./data") }
fn default_save_name() -> String { "log".to_string() }
fn default_extension() -> String { "csv".to_string() }
fn default_write_track() -> bool { true }

fn default_poll_interval_ms() -> u64 { 50 }
fn default_join_timeout_ms() -> u64 { 4000 }
fn default_series_capacity() -> usize { 500 }

fn default_log_dir() -> PathBuf { PathBuf::from("./logs") }
fn default_snapshot_interval_ms() -> u64 { 500 }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            auto_reconnect: default_auto_reconnect(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            reconnect_settle_ms: default_reconnect_settle_ms(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            devices: default_devices(),
            home: HomeConfig::default(),
            storage: StorageConfig::default(),
            workers: WorkerConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            id: 0,
            serial: SerialConfig::default(),
            schema: default_schema(),
            delimiter: default_delimiter(),
            header: default_header(),
            tail: None,
            lat_key: default_lat_key(),
            lon_key: default_lon_key(),
            alt_key: default_alt_key(),
        }
    }
}

impl Default for HomeConfig {
    fn default() -> Self {
        Self {
            lat: default_home_lat(),
            lon: default_home_lon(),
            alt: 0.0,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            save_name: default_save_name(),
            extension: default_extension(),
            write_raw: false,
            write_track: default_write_track(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            join_timeout_ms: default_join_timeout_ms(),
            series_capacity: default_series_capacity(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            snapshot_path: None,
            snapshot_interval_ms: default_snapshot_interval_ms(),
        }
    }
}

fn invalid(msg: impl std::fmt::Display) -> GroundlinkError {
    GroundlinkError::Config(toml::de::Error::custom(msg))
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
    /// use groundlink::config::Config;
    ///
    /// let config = Config::load("config/groundlink.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns `Config` if any value is out of its valid range
    pub fn validate(&self) -> Result<()> {
        // Devices
        if self.devices.is_empty() {
            return Err(invalid("at least one device must be configured"));
        }

        let mut ids = HashSet::new();
        let mut ports = HashSet::new();
        for device in &self.devices {
            device.validate()?;
            if !ids.insert(device.id) {
                return Err(invalid(format!("device id {} is used twice", device.id)));
            }
            if !ports.insert(device.serial.port.trim()) {
                return Err(invalid(format!(
                    "serial port \"{}\" is used by more than one device",
                    device.serial.port
                )));
            }
        }

        // Home
        if !self.home_coordinate().valid() {
            return Err(invalid(format!(
                "home {} is not a valid coordinate",
                self.home_coordinate()
            )));
        }

        // Storage
        if self.storage.save_name.is_empty() {
            return Err(invalid("save_name cannot be empty"));
        }

        if self.storage.extension.trim_matches('.').is_empty() {
            return Err(invalid("extension cannot be empty"));
        }

        // Workers
        if self.workers.poll_interval_ms == 0 || self.workers.poll_interval_ms > 1000 {
            return Err(invalid("poll_interval_ms must be between 1 and 1000"));
        }

        if self.workers.join_timeout_ms == 0 || self.workers.join_timeout_ms > 60000 {
            return Err(invalid("join_timeout_ms must be between 1 and 60000"));
        }

        if self.workers.series_capacity == 0 {
            return Err(invalid("series_capacity must be greater than 0"));
        }

        // Telemetry
        if self.telemetry.snapshot_interval_ms == 0 || self.telemetry.snapshot_interval_ms > 60000 {
            return Err(invalid("snapshot_interval_ms must be between 1 and 60000"));
        }

        Ok(())
    }

    pub fn home_coordinate(&self) -> GeoCoordinate {
        GeoCoordinate::new(self.home.lat, self.home.lon, self.home.alt)
    }

    /// Output file names for `device`
    pub fn storage_layout(&self, device: &DeviceConfig) -> StorageLayout {
        StorageLayout::new(
            &self.storage.data_dir,
            &self.storage.save_name,
            &self.storage.extension,
            device.id,
        )
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.workers.poll_interval_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.workers.join_timeout_ms)
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_millis(self.telemetry.snapshot_interval_ms)
    }
}

impl DeviceConfig {
    /// Validate the port and message format of this device
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| invalid(format!("device {}: {}", self.id, msg));

        // Serial
        if self.serial.port.trim().is_empty() {
            return Err(fail("serial port cannot be empty".to_string()));
        }

        if !is_standard_baud(self.serial.baud_rate) {
            return Err(fail(format!(
                "baud_rate {} is not a standard rate",
                self.serial.baud_rate
            )));
        }

        if self.serial.reconnect_interval_ms == 0 || self.serial.reconnect_interval_ms > 60000 {
            return Err(fail("reconnect_interval_ms must be between 1 and 60000".to_string()));
        }

        if self.serial.reconnect_settle_ms == 0 || self.serial.reconnect_settle_ms > 10000 {
            return Err(fail("reconnect_settle_ms must be between 1 and 10000".to_string()));
        }

        // Message format
        if self.schema.is_empty() {
            return Err(fail("schema cannot be empty".to_string()));
        }

        let mut seen = HashSet::new();
        for field in &self.schema {
            if field.is_empty() {
                return Err(fail("schema field names cannot be empty".to_string()));
            }
            if !seen.insert(field.as_str()) {
                return Err(fail(format!("schema field \"{}\" is duplicated", field)));
            }
        }

        for (name, key) in [
            ("lat_key", &self.lat_key),
            ("lon_key", &self.lon_key),
            ("alt_key", &self.alt_key),
        ] {
            if !seen.contains(key.as_str()) {
                return Err(fail(format!("{} \"{}\" is not in the schema", name, key)));
            }
        }

        if self.delimiter.is_empty() {
            return Err(fail("delimiter cannot be empty".to_string()));
        }

        let has_header = self.header.as_deref().is_some_and(|h| !h.is_empty());
        let has_tail = self.tail.as_deref().is_some_and(|t| !t.is_empty());
        if has_tail && !has_header {
            return Err(fail("tail requires a header".to_string()));
        }

        Ok(())
    }

    pub fn schema(&self) -> Schema {
        Schema::new(self.schema.iter().cloned())
    }

    pub fn codec_options(&self) -> CodecOptions {
        CodecOptions {
            delimiter: self.delimiter.clone(),
            header: self.header.clone(),
            tail: self.tail.clone(),
        }
    }

    pub fn field_keys(&self) -> FieldKeys {
        FieldKeys {
            lat: self.lat_key.clone(),
            lon: self.lon_key.clone(),
            alt: self.alt_key.clone(),
        }
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            retry_interval: Duration::from_millis(self.serial.reconnect_interval_ms),
            settle_interval: Duration::from_millis(self.serial.reconnect_settle_ms),
        }
    }
}
