//! # Kettle Controller Configuration
//!
//! Tuning and safety parameters are captured once when a run starts and
//! never change for the lifetime of that run.
//!
//! Parameters are looked up by the property labels the kettle host exposes
//! (`P`, `I`, `D`, `Max_Pump_Temp`, ...) through a [`ConfigSource`]. A TOML
//! file can stand in for the host:
//!
//! ```toml
//! temp_unit = "F"
//!
//! [properties]
//! P = 117.0795
//! I = 0.2747
//! D = 41.58
//! Max_PID_Temp = 88
//! Max_Pump_Temp = 110
//! ```
//!
//! Temperature thresholds are configured in Celsius. When the host reports
//! Fahrenheit, [`ControllerConfig::in_sensor_unit`] converts `max_pid_temp`
//! and `max_pump_temp` so both loops compare against raw sensor readings.

// src/config.rs - Controller configuration and property lookup
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

/// Shortest interval any loop may be configured with.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Property labels understood by [`ControllerConfig::from_source`].
pub mod keys {
    pub const P: &str = "P";
    pub const I: &str = "I";
    pub const D: &str = "D";
    pub const SAMPLE_TIME: &str = "Sample_Time";
    pub const MAX_OUTPUT: &str = "Max_Output";
    pub const MAX_PUMP_TEMP: &str = "Max_Pump_Temp";
    pub const MAX_BOIL_OUTPUT: &str = "Max_Boil_Output";
    pub const MAX_BOIL_TEMP: &str = "Max_Boil_Temp";
    pub const MAX_PID_TEMP: &str = "Max_PID_Temp";
    pub const INTERNAL_LOOP: &str = "Internal_loop";
    pub const REST_INTERVAL: &str = "Rest_Interval";
    pub const REST_TIME: &str = "Rest_Time";
    pub const PUMP_POLL_INTERVAL: &str = "Pump_Poll_Interval";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum TemperatureUnit {
    #[default]
    #[serde(rename = "C")]
    Celsius,
    #[serde(rename = "F")]
    Fahrenheit,
}

impl TemperatureUnit {
    /// Anything other than `"C"` is treated as Fahrenheit, matching the host's convention.
    pub fn from_label(label: &str) -> Self {
        if label.trim() == "C" {
            TemperatureUnit::Celsius
        } else {
            TemperatureUnit::Fahrenheit
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            TemperatureUnit::Celsius => "°C",
            TemperatureUnit::Fahrenheit => "°F",
        }
    }
}

impl<'de> Deserialize<'de> for TemperatureUnit {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let label = String::deserialize(deserializer)?;
        Ok(Self::from_label(&label))
    }
}

/// `F = C * 9/5 + 32`, rounded to two decimals.
pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    let fahrenheit = celsius * 9.0 / 5.0 + 32.0;
    (fahrenheit * 100.0).round() / 100.0
}

/// Configuration property lookup provided by the kettle host.
pub trait ConfigSource: Send + Sync {
    /// Raw numeric property, `None` when unset.
    fn number(&self, key: &str) -> Option<f64>;

    fn temperature_unit(&self) -> TemperatureUnit;

    fn get_number(&self, key: &str, default: f64) -> f64 {
        self.number(key).unwrap_or(default)
    }
}

/// Immutable snapshot of tuning and safety parameters for one run.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ControllerConfig {
    #[serde(default = "default_kp")]
    pub kp: f64,
    #[serde(default = "default_ki")]
    pub ki: f64,
    #[serde(default = "default_kd")]
    pub kd: f64,
    /// Length of one heater sample window, in seconds.
    #[serde(default = "default_sample_time")]
    pub sample_time: f64,
    #[serde(default = "default_max_output")]
    pub max_output: f64,
    /// Above this temperature the PID is bypassed and the heater runs at `max_output`.
    #[serde(default = "default_max_pid_temp")]
    pub max_pid_temp: f64,
    #[serde(default = "default_max_pump_temp")]
    pub max_pump_temp: f64,
    #[serde(default = "default_max_boil_output")]
    pub max_boil_output: f64,
    #[serde(default = "default_max_boil_temp")]
    pub max_boil_temp: f64,
    #[serde(default = "default_internal_loop_interval")]
    pub internal_loop_interval: f64,
    /// Pump work phase length, in seconds.
    #[serde(default = "default_pump_rest_interval")]
    pub pump_rest_interval: f64,
    /// Pump rest phase length, in seconds.
    #[serde(default = "default_pump_rest_duration")]
    pub pump_rest_duration: f64,
    #[serde(default = "default_pump_poll_interval")]
    pub pump_poll_interval: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            kp: default_kp(),
            ki: default_ki(),
            kd: default_kd(),
            sample_time: default_sample_time(),
            max_output: default_max_output(),
            max_pid_temp: default_max_pid_temp(),
            max_pump_temp: default_max_pump_temp(),
            max_boil_output: default_max_boil_output(),
            max_boil_temp: default_max_boil_temp(),
            internal_loop_interval: default_internal_loop_interval(),
            pump_rest_interval: default_pump_rest_interval(),
            pump_rest_duration: default_pump_rest_duration(),
            pump_poll_interval: default_pump_poll_interval(),
        }
    }
}

impl ControllerConfig {
    /// Resolve every parameter from the host, falling back to the defaults.
    pub fn from_source(source: &dyn ConfigSource) -> Result<Self, ConfigError> {
        let config = Self {
            kp: source.get_number(keys::P, default_kp()),
            ki: source.get_number(keys::I, default_ki()),
            kd: source.get_number(keys::D, default_kd()),
            sample_time: source.get_number(keys::SAMPLE_TIME, default_sample_time()),
            max_output: source.get_number(keys::MAX_OUTPUT, default_max_output()),
            max_pid_temp: source.get_number(keys::MAX_PID_TEMP, default_max_pid_temp()),
            max_pump_temp: source.get_number(keys::MAX_PUMP_TEMP, default_max_pump_temp()),
            max_boil_output: source.get_number(keys::MAX_BOIL_OUTPUT, default_max_boil_output()),
            max_boil_temp: source.get_number(keys::MAX_BOIL_TEMP, default_max_boil_temp()),
            internal_loop_interval: source
                .get_number(keys::INTERNAL_LOOP, default_internal_loop_interval()),
            pump_rest_interval: source
                .get_number(keys::REST_INTERVAL, default_pump_rest_interval()),
            pump_rest_duration: source.get_number(keys::REST_TIME, default_pump_rest_duration()),
            pump_poll_interval: source
                .get_number(keys::PUMP_POLL_INTERVAL, default_pump_poll_interval()),
        };
        config.validate()?;
        Ok(config)
    }

    /// Copy of this config with the PID and pump thresholds expressed in `unit`.
    ///
    /// Only `max_pid_temp` and `max_pump_temp` are converted; the boil
    /// threshold is taken as already being in the sensor's unit.
    pub fn in_sensor_unit(&self, unit: TemperatureUnit) -> Self {
        match unit {
            TemperatureUnit::Celsius => self.clone(),
            TemperatureUnit::Fahrenheit => Self {
                max_pid_temp: celsius_to_fahrenheit(self.max_pid_temp),
                max_pump_temp: celsius_to_fahrenheit(self.max_pump_temp),
                ..self.clone()
            },
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("kp", self.kp),
            ("ki", self.ki),
            ("kd", self.kd),
            ("max_pid_temp", self.max_pid_temp),
            ("max_pump_temp", self.max_pump_temp),
            ("max_boil_temp", self.max_boil_temp),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::Invalid(format!("{} must be a finite number", name)));
            }
        }
        for (name, value) in [
            ("sample_time", self.sample_time),
            ("internal_loop_interval", self.internal_loop_interval),
            ("pump_rest_interval", self.pump_rest_interval),
            ("pump_rest_duration", self.pump_rest_duration),
            ("pump_poll_interval", self.pump_poll_interval),
        ] {
            // sub-millisecond values truncate to zero-length sleeps
            if !(value.is_finite() && secs(value) >= MIN_INTERVAL) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be at least {:?} (got {})",
                    name, MIN_INTERVAL, value
                )));
            }
        }
        for (name, value) in [
            ("max_output", self.max_output),
            ("max_boil_output", self.max_boil_output),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be within 0..=100 (got {})",
                    name, value
                )));
            }
        }
        Ok(())
    }

    pub fn sample_window(&self) -> Duration {
        secs(self.sample_time)
    }

    pub fn pump_work_time(&self) -> Duration {
        secs(self.pump_rest_interval)
    }

    pub fn pump_rest_time(&self) -> Duration {
        secs(self.pump_rest_duration)
    }

    pub fn pump_poll(&self) -> Duration {
        secs(self.pump_poll_interval)
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

fn default_kp() -> f64 { 117.0795 }
fn default_ki() -> f64 { 0.2747 }
fn default_kd() -> f64 { 41.58 }
fn default_sample_time() -> f64 { 5.0 }
fn default_max_output() -> f64 { 100.0 }
fn default_max_pid_temp() -> f64 { 88.0 }
fn default_max_pump_temp() -> f64 { 110.0 }
fn default_max_boil_output() -> f64 { 85.0 }
fn default_max_boil_temp() -> f64 { 98.0 }
fn default_internal_loop_interval() -> f64 { 0.2 }
fn default_pump_rest_interval() -> f64 { 600.0 }
fn default_pump_rest_duration() -> f64 { 60.0 }
fn default_pump_poll_interval() -> f64 { 2.0 }

/// Property table backed by a TOML document, used when no host is present.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PropertyTable {
    #[serde(default)]
    pub temp_unit: TemperatureUnit,
    #[serde(default)]
    pub properties: BTreeMap<String, f64>,
}

impl PropertyTable {
    pub fn new(temp_unit: TemperatureUnit) -> Self {
        Self {
            temp_unit,
            properties: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: f64) -> Self {
        self.properties.insert(key.to_string(), value);
        self
    }
}

impl ConfigSource for PropertyTable {
    fn number(&self, key: &str) -> Option<f64> {
        self.properties.get(key).copied()
    }

    fn temperature_unit(&self) -> TemperatureUnit {
        self.temp_unit
    }
}

/// Load a [`PropertyTable`] from a TOML file.
pub fn load_properties(path: impl AsRef<Path>) -> Result<PropertyTable, ConfigError> {
    let path = path.as_ref();
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(table) => Ok(table),
            Err(e) => {
                tracing::error!("Failed to parse config TOML: {}", e);
                Err(ConfigError::Toml(e))
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path.display(), e);
            Err(ConfigError::Io(e))
        }
    }
}
