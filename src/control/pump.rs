//! Recirculation pump duty cycle.
//!
//! The pump works for `pump_rest_interval` seconds, then rests for
//! `pump_rest_duration` seconds. While working the kettle temperature is
//! polled every `pump_poll_interval` seconds; once it reaches the pump's
//! maximum temperature the pump is switched off at once and stays off until
//! the kettle cools below that threshold.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use super::{is_running, sleep_or_stop};
use crate::config::ControllerConfig;
use crate::error::HardwareError;
use crate::hardware::{ActuatorDriver, Collaborators, Kettle, SensorReader};
use crate::notify::{Notifier, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpState {
    Idle,
    Working,
    Resting,
    /// Kettle too hot for the pump; waiting for it to cool.
    SafetyOff,
    Stopped,
}

pub struct PumpController {
    kettle: Kettle,
    max_temp: f64,
    work_time: Duration,
    rest_time: Duration,
    poll_interval: Duration,
    sensors: Arc<dyn SensorReader>,
    actuators: Arc<dyn ActuatorDriver>,
    notifier: Arc<dyn Notifier>,
    state: PumpState,
    cycles: u64,
}

impl PumpController {
    /// `config` must already be expressed in the sensor's unit.
    pub fn new(kettle: Kettle, config: &ControllerConfig, collaborators: &Collaborators) -> Self {
        Self {
            kettle,
            max_temp: config.max_pump_temp,
            work_time: config.pump_work_time(),
            rest_time: config.pump_rest_time(),
            poll_interval: config.pump_poll(),
            sensors: collaborators.sensors.clone(),
            actuators: collaborators.actuators.clone(),
            notifier: collaborators.notifier.clone(),
            state: PumpState::Idle,
            cycles: 0,
        }
    }

    pub fn state(&self) -> PumpState {
        self.state
    }

    /// Completed work/rest cycles.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Cycle the pump until the running flag clears or a collaborator fails.
    ///
    /// The pump is forced off on every exit path.
    pub async fn run(&mut self, mut running: watch::Receiver<bool>) -> Result<(), HardwareError> {
        self.notifier
            .notify(&self.kettle.name, "pump loop started", Severity::Info);
        tracing::info!(
            "Pump loop started for {} (work {:?}, rest {:?}, max temp {:.2})",
            self.kettle.name,
            self.work_time,
            self.rest_time,
            self.max_temp
        );

        let result = self.cycle(&mut running).await;
        let stopped = self.actuators.set_actuator(&self.kettle.agitator, false).await;
        self.state = PumpState::Stopped;
        tracing::info!(
            "Pump loop for {} finished after {} cycles",
            self.kettle.name,
            self.cycles
        );

        match (result, stopped) {
            (Err(e), Err(off)) => {
                tracing::error!("Failed to switch pump off after error: {}", off);
                Err(e)
            }
            (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
            (Ok(()), Ok(())) => Ok(()),
        }
    }

    async fn cycle(&mut self, running: &mut watch::Receiver<bool>) -> Result<(), HardwareError> {
        while is_running(running) {
            let temperature = self.sensors.read_sensor(&self.kettle.sensor).await?;
            if temperature < self.max_temp {
                if !self.work_and_rest(running).await? {
                    break;
                }
            } else {
                self.hold_off(temperature).await?;
                if sleep_or_stop(self.poll_interval, running).await {
                    break;
                }
            }
        }
        Ok(())
    }

    /// One work phase followed by a rest. Returns `false` if the run was stopped.
    async fn work_and_rest(&mut self, running: &mut watch::Receiver<bool>) -> Result<bool, HardwareError> {
        tracing::debug!("starting pump");
        self.actuators.set_actuator(&self.kettle.agitator, true).await?;
        self.state = PumpState::Working;

        let off_time = Instant::now() + self.work_time;
        loop {
            let now = Instant::now();
            if now >= off_time {
                break;
            }
            if sleep_or_stop(self.poll_interval.min(off_time - now), running).await {
                return Ok(false);
            }
            let temperature = self.sensors.read_sensor(&self.kettle.sensor).await?;
            if temperature >= self.max_temp {
                self.actuators.set_actuator(&self.kettle.agitator, false).await?;
                self.enter_safety_off(temperature);
                return Ok(true);
            }
        }

        tracing::debug!("resting pump");
        self.actuators.set_actuator(&self.kettle.agitator, false).await?;
        self.state = PumpState::Resting;
        if sleep_or_stop(self.rest_time, running).await {
            return Ok(false);
        }
        self.cycles += 1;
        Ok(true)
    }

    async fn hold_off(&mut self, temperature: f64) -> Result<(), HardwareError> {
        if self.actuators.actuator_state(&self.kettle.agitator).await? {
            self.actuators.set_actuator(&self.kettle.agitator, false).await?;
        }
        if self.state != PumpState::SafetyOff {
            self.enter_safety_off(temperature);
        }
        Ok(())
    }

    fn enter_safety_off(&mut self, temperature: f64) {
        tracing::warn!(
            "{} at {:.2}, above pump limit {:.2}: pump held off",
            self.kettle.name,
            temperature,
            self.max_temp
        );
        self.state = PumpState::SafetyOff;
    }
}
