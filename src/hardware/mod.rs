// src/hardware/mod.rs - Collaborator contracts consumed by the control loops
//
// Sensor acquisition, actuator delivery, kettle lookup and notifications all
// live outside this crate. The loops only see these traits.
pub mod simulated;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::ConfigSource;
use crate::error::HardwareError;
use crate::notify::Notifier;

/// Identifiers resolved once at run start from the kettle id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kettle {
    pub id: String,
    pub name: String,
    pub sensor: String,
    pub heater: String,
    pub agitator: String,
}

#[async_trait]
pub trait SensorReader: Send + Sync {
    /// Latest value of `sensor_id` in the sensor's native unit.
    async fn read_sensor(&self, sensor_id: &str) -> Result<f64, HardwareError>;
}

#[async_trait]
pub trait ActuatorDriver: Send + Sync {
    async fn set_actuator(&self, actuator_id: &str, on: bool) -> Result<(), HardwareError>;

    /// Last commanded state of `actuator_id`.
    async fn actuator_state(&self, actuator_id: &str) -> Result<bool, HardwareError>;
}

#[async_trait]
pub trait KettleRegistry: Send + Sync {
    async fn kettle(&self, kettle_id: &str) -> Result<Kettle, HardwareError>;

    async fn target_temperature(&self, kettle_id: &str) -> Result<f64, HardwareError>;
}

/// Everything a run needs from the host, shared by both loops.
#[derive(Clone)]
pub struct Collaborators {
    pub sensors: Arc<dyn SensorReader>,
    pub actuators: Arc<dyn ActuatorDriver>,
    pub kettles: Arc<dyn KettleRegistry>,
    pub config: Arc<dyn ConfigSource>,
    pub notifier: Arc<dyn Notifier>,
}

impl Collaborators {
    /// Use a single host object for the sensor, actuator and kettle contracts.
    pub fn from_host<H>(host: Arc<H>, config: Arc<dyn ConfigSource>, notifier: Arc<dyn Notifier>) -> Self
    where
        H: SensorReader + ActuatorDriver + KettleRegistry + 'static,
    {
        Self {
            sensors: host.clone(),
            actuators: host.clone(),
            kettles: host,
            config,
            notifier,
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
