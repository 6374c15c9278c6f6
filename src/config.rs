//! Configuration management for Ampsim
//!
//! This module handles loading, validation, and management of the simulator
//! configuration from YAML files: the fleet of simulated devices, the tick
//! cadence, persistence location and logging options.

use crate::error::{AmpsimError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_phases() -> u8 {
    3
}

fn default_max_current() -> f64 {
    32.0
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Bind address shared by all device listeners
    pub host: String,

    /// Tick interval in milliseconds (reference cadence is one second)
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Directory for persisted session snapshots
    pub state_dir: String,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Simulated device fleet
    pub devices: Vec<DeviceConfig>,
}

/// Wire protocol family spoken by a simulated device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    /// Compact key/value telemetry (go-e style)
    Goe,

    /// Hierarchical XML telemetry (CirControl style)
    Circontrol,
}

/// Configuration of one simulated charging point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Protocol family
    pub vendor: Vendor,

    /// TCP port this device listens on
    pub port: u16,

    /// Dual-meaning schedule parameter: a non-negative value pins the idle
    /// phase to that minute past the top of the hour; a negative value is a
    /// weight for randomized state durations.
    #[serde(default)]
    pub session_start_parameter: f64,

    /// Number of energized phases (1..=3)
    #[serde(default = "default_phases")]
    pub phases: u8,

    /// Fixed per-device current ceiling in amperes
    #[serde(default = "default_max_current")]
    pub max_current: f64,

    /// Identifier under which session state survives restarts; devices
    /// without one are purely in-memory
    #[serde(default)]
    pub persistence_id: Option<String>,

    /// Fixed RNG seed; derived from OS entropy when unset
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Optional console-specific level override
    #[serde(default)]
    pub console_level: Option<String>,

    /// Optional file-specific level override
    #[serde(default)]
    pub file_level: Option<String>,

    /// Path to log file or log directory
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            console_level: None,
            file_level: None,
            file: "/tmp/ampsim.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl DeviceConfig {
    fn with_vendor(vendor: Vendor, port: u16, session_start_parameter: f64, phases: u8) -> Self {
        Self {
            vendor,
            port,
            session_start_parameter,
            phases,
            max_current: default_max_current(),
            persistence_id: None,
            seed: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        // Default fleet mirrors a small mixed install: staggered schedules so
        // the devices do not all charge in lockstep.
        Self {
            host: "0.0.0.0".to_string(),
            tick_interval_ms: default_tick_interval_ms(),
            state_dir: "/data/ampsim".to_string(),
            logging: LoggingConfig::default(),
            devices: vec![
                DeviceConfig::with_vendor(Vendor::Goe, 8000, 0.0, 3),
                DeviceConfig::with_vendor(Vendor::Goe, 8001, 10.0, 1),
                DeviceConfig::with_vendor(Vendor::Circontrol, 8002, 20.0, 3),
                DeviceConfig::with_vendor(Vendor::Circontrol, 8003, 30.0, 2),
                DeviceConfig::with_vendor(Vendor::Goe, 8004, 40.0, 3),
            ],
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        let default_paths = [
            "ampsim_config.yaml",
            "/data/ampsim_config.yaml",
            "/etc/ampsim/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        // Fall back to default configuration
        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(AmpsimError::validation("host", "Bind address cannot be empty"));
        }

        if self.tick_interval_ms == 0 {
            return Err(AmpsimError::validation(
                "tick_interval_ms",
                "Must be greater than 0",
            ));
        }

        if self.devices.is_empty() {
            return Err(AmpsimError::validation(
                "devices",
                "At least one device must be configured",
            ));
        }

        let mut seen_ports = std::collections::HashSet::new();
        for (idx, device) in self.devices.iter().enumerate() {
            device.validate().map_err(|e| {
                AmpsimError::validation(format!("devices[{}]", idx), e.to_string())
            })?;
            if !seen_ports.insert(device.port) {
                return Err(AmpsimError::validation(
                    format!("devices[{}].port", idx),
                    format!("Port {} is assigned more than once", device.port),
                ));
            }
        }

        Ok(())
    }
}

impl DeviceConfig {
    /// Validate a single device entry
    pub fn validate(&self) -> Result<()> {
        if !(1..=3).contains(&self.phases) {
            return Err(AmpsimError::validation(
                "phases",
                "Phase count must be 1, 2 or 3",
            ));
        }

        if self.port == 0 {
            return Err(AmpsimError::validation("port", "Port must be greater than 0"));
        }

        if !self.max_current.is_finite() || self.max_current <= 0.0 {
            return Err(AmpsimError::validation(
                "max_current",
                "Current ceiling must be positive",
            ));
        }

        if !self.session_start_parameter.is_finite() {
            return Err(AmpsimError::validation(
                "session_start_parameter",
                "Must be a finite number",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.tick_interval_ms, 1000);
        assert_eq!(config.devices.len(), 5);
        assert_eq!(config.devices[0].port, 8000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        // Invalid phase count
        config.devices[0].phases = 4;
        assert!(config.validate().is_err());

        // Reset and test duplicate ports
        config = Config::default();
        config.devices[1].port = config.devices[0].port;
        assert!(config.validate().is_err());

        // Reset and test empty fleet
        config = Config::default();
        config.devices.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let deserialized: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(config.devices.len(), deserialized.devices.len());
        assert_eq!(config.devices[2].vendor, Vendor::Circontrol);
        assert_eq!(deserialized.devices[2].vendor, Vendor::Circontrol);
    }
}
