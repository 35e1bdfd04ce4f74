// src/hardware/simulated.rs - In-memory kettle for the CLI, tests and benches
use async_trait::async_trait;
use rand::Rng;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use super::{ActuatorDriver, Kettle, KettleRegistry, SensorReader};
use crate::error::HardwareError;

/// First-order thermal model of a kettle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThermalModel {
    pub ambient: f64,
    /// Degrees per second gained with the heater fully on.
    pub heat_rate: f64,
    /// Fraction of the difference to ambient lost per second.
    pub loss_rate: f64,
    /// Temperature the liquid cannot exceed.
    pub boil_point: f64,
    /// Peak amplitude of uniform sensor noise.
    pub noise: f64,
}

impl Default for ThermalModel {
    fn default() -> Self {
        Self {
            ambient: 20.0,
            heat_rate: 0.15,
            loss_rate: 0.0005,
            boil_point: 100.0,
            noise: 0.0,
        }
    }
}

/// One recorded actuator command.
#[derive(Debug, Clone, PartialEq)]
pub struct ActuatorCommand {
    pub actuator: String,
    pub on: bool,
    pub at: Instant,
}

#[derive(Debug)]
struct SimState {
    temperature: f64,
    target: f64,
    heater_on: bool,
    agitator_on: bool,
    sensor_failure: Option<String>,
    actuator_failure: Option<String>,
    commands: Vec<ActuatorCommand>,
}

#[derive(Debug)]
pub struct SimulatedKettle {
    kettle: Kettle,
    model: ThermalModel,
    state: Mutex<SimState>,
}

impl SimulatedKettle {
    pub fn new(kettle_id: &str) -> Self {
        Self::with_model(kettle_id, ThermalModel::default())
    }

    pub fn with_model(kettle_id: &str, model: ThermalModel) -> Self {
        Self {
            kettle: Kettle {
                id: kettle_id.to_string(),
                name: format!("Kettle {}", kettle_id),
                sensor: format!("{}-sensor", kettle_id),
                heater: format!("{}-heater", kettle_id),
                agitator: format!("{}-pump", kettle_id),
            },
            model,
            state: Mutex::new(SimState {
                temperature: model.ambient,
                target: model.ambient,
                heater_on: false,
                agitator_on: false,
                sensor_failure: None,
                actuator_failure: None,
                commands: Vec::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn info(&self) -> &Kettle {
        &self.kettle
    }

    pub fn temperature(&self) -> f64 {
        self.state().temperature
    }

    pub fn set_temperature(&self, temperature: f64) {
        self.state().temperature = temperature;
    }

    pub fn set_target(&self, target: f64) {
        self.state().target = target;
    }

    pub fn heater_on(&self) -> bool {
        self.state().heater_on
    }

    pub fn agitator_on(&self) -> bool {
        self.state().agitator_on
    }

    /// Make every subsequent sensor read fail with `reason` (or succeed again with `None`).
    pub fn fail_sensor(&self, reason: Option<&str>) {
        self.state().sensor_failure = reason.map(str::to_string);
    }

    /// Make commands to `actuator` fail (or succeed again with `None`).
    pub fn fail_actuator(&self, actuator: Option<&str>) {
        self.state().actuator_failure = actuator.map(str::to_string);
    }

    pub fn commands(&self) -> Vec<ActuatorCommand> {
        self.state().commands.clone()
    }

    pub fn commands_for(&self, actuator: &str) -> Vec<ActuatorCommand> {
        self.state()
            .commands
            .iter()
            .filter(|c| c.actuator == actuator)
            .cloned()
            .collect()
    }

    /// Advance the thermal model by `dt`.
    pub fn step(&self, dt: Duration) {
        let dt = dt.as_secs_f64();
        let model = self.model;
        let mut state = self.state();
        let heating = if state.heater_on { model.heat_rate } else { 0.0 };
        let losses = model.loss_rate * (state.temperature - model.ambient);
        state.temperature = (state.temperature + (heating - losses) * dt).min(model.boil_point);
    }

    /// Drive the thermal model in the background until `stop` flips to true.
    pub fn spawn_model(
        self: Arc<Self>,
        tick: Duration,
        mut stop: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => self.step(tick),
                }
            }
            tracing::debug!("Thermal model for {} stopped", self.kettle.id);
        })
    }

    fn check_actuator(&self, actuator_id: &str) -> Result<(), HardwareError> {
        if actuator_id != self.kettle.heater && actuator_id != self.kettle.agitator {
            return Err(HardwareError::ActuatorCommand {
                actuator: actuator_id.to_string(),
                reason: "unknown actuator".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SensorReader for SimulatedKettle {
    async fn read_sensor(&self, sensor_id: &str) -> Result<f64, HardwareError> {
        if sensor_id != self.kettle.sensor {
            return Err(HardwareError::SensorRead {
                sensor: sensor_id.to_string(),
                reason: "unknown sensor".to_string(),
            });
        }
        let state = self.state();
        if let Some(reason) = &state.sensor_failure {
            return Err(HardwareError::SensorRead {
                sensor: sensor_id.to_string(),
                reason: reason.clone(),
            });
        }
        let noise = if self.model.noise > 0.0 {
            rand::rng().random_range(-self.model.noise..=self.model.noise)
        } else {
            0.0
        };
        Ok(state.temperature + noise)
    }
}

#[async_trait]
impl ActuatorDriver for SimulatedKettle {
    async fn set_actuator(&self, actuator_id: &str, on: bool) -> Result<(), HardwareError> {
        self.check_actuator(actuator_id)?;
        let mut state = self.state();
        if state.actuator_failure.as_deref() == Some(actuator_id) {
            return Err(HardwareError::ActuatorCommand {
                actuator: actuator_id.to_string(),
                reason: "relay not responding".to_string(),
            });
        }
        if actuator_id == self.kettle.heater {
            state.heater_on = on;
        } else {
            state.agitator_on = on;
        }
        state.commands.push(ActuatorCommand {
            actuator: actuator_id.to_string(),
            on,
            at: Instant::now(),
        });
        tracing::trace!("{} -> {}", actuator_id, if on { "on" } else { "off" });
        Ok(())
    }

    async fn actuator_state(&self, actuator_id: &str) -> Result<bool, HardwareError> {
        self.check_actuator(actuator_id)?;
        let state = self.state();
        Ok(if actuator_id == self.kettle.heater {
            state.heater_on
        } else {
            state.agitator_on
        })
    }
}

#[async_trait]
impl KettleRegistry for SimulatedKettle {
    async fn kettle(&self, kettle_id: &str) -> Result<Kettle, HardwareError> {
        if kettle_id == self.kettle.id {
            Ok(self.kettle.clone())
        } else {
            Err(HardwareError::UnknownKettle(kettle_id.to_string()))
        }
    }

    async fn target_temperature(&self, kettle_id: &str) -> Result<f64, HardwareError> {
        if kettle_id == self.kettle.id {
            Ok(self.state().target)
        } else {
            Err(HardwareError::UnknownKettle(kettle_id.to_string()))
        }
    }
}
