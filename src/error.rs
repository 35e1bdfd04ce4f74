// src/error.rs - Error taxonomy for the kettle controller
use thiserror::Error;

/// Raised when a PID controller is built from invalid parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PidError {
    #[error("{name} must be specified")]
    NonFiniteGain { name: &'static str },
    #[error("sample time must be greater than 0 (got {0})")]
    InvalidSampleTime(f64),
    #[error("output min ({min}) must be less than output max ({max})")]
    InvalidOutputRange { min: f64, max: f64 },
}

/// Failures reported by the external collaborators (sensor, actuators, kettle lookup).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HardwareError {
    #[error("Failed to read sensor '{sensor}': {reason}")]
    SensorRead { sensor: String, reason: String },
    #[error("Failed to command actuator '{actuator}': {reason}")]
    ActuatorCommand { actuator: String, reason: String },
    #[error("Unknown kettle '{0}'")]
    UnknownKettle(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("PID error: {0}")]
    Pid(#[from] PidError),
    #[error("Hardware error: {0}")]
    Hardware(#[from] HardwareError),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Control task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for ControllerError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_panic() {
            ControllerError::Task("control loop panicked".to_string())
        } else {
            ControllerError::Task("control loop was cancelled".to_string())
        }
    }
}
