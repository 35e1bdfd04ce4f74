//! Time-proportioning heater driver.
//!
//! Each iteration covers one sample window. The requested power percentage
//! becomes an on-interval followed by an off-interval inside that window, so
//! a plain on/off relay approximates continuous power.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use super::pid::PidController;
use super::{is_running, sleep_or_stop};
use crate::config::ControllerConfig;
use crate::error::{HardwareError, PidError};
use crate::hardware::{ActuatorDriver, Collaborators, Kettle, KettleRegistry, SensorReader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaterState {
    Idle,
    Heating,
    Cooling,
    Stopped,
}

/// Which rule picked the heat percentage for a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeatSource {
    /// Kettle at or above the boil threshold: output capped at `max_boil_output`.
    BoilLimit,
    /// Kettle at or above `max_pid_temp`: PID bypassed, `max_output`.
    FullPower,
    Pid,
}

/// On/off split of one sample window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DutyCycle {
    pub heat_percent: f64,
    pub heating: Duration,
    pub rest: Duration,
}

impl DutyCycle {
    /// `heating = window * percent / 100`, `rest = window - heating`.
    ///
    /// The percentage is clamped to `0..=100`, so `heating + rest == window`.
    pub fn split(window: Duration, heat_percent: f64) -> Self {
        let heat_percent = if heat_percent.is_nan() {
            0.0
        } else {
            heat_percent.clamp(0.0, 100.0)
        };
        let heating = Duration::try_from_secs_f64(window.as_secs_f64() * heat_percent / 100.0)
            .unwrap_or(Duration::ZERO)
            .min(window);
        Self {
            heat_percent,
            heating,
            rest: window - heating,
        }
    }
}

pub struct HeaterDriver {
    kettle: Kettle,
    config: ControllerConfig,
    pid: PidController,
    sensors: Arc<dyn SensorReader>,
    actuators: Arc<dyn ActuatorDriver>,
    kettles: Arc<dyn KettleRegistry>,
    state: HeaterState,
    windows: u64,
}

impl HeaterDriver {
    /// `config` must already be expressed in the sensor's unit.
    pub fn new(
        kettle: Kettle,
        config: ControllerConfig,
        collaborators: &Collaborators,
    ) -> Result<Self, PidError> {
        let pid = PidController::from_config(&config)?;
        Ok(Self {
            kettle,
            config,
            pid,
            sensors: collaborators.sensors.clone(),
            actuators: collaborators.actuators.clone(),
            kettles: collaborators.kettles.clone(),
            state: HeaterState::Idle,
            windows: 0,
        })
    }

    pub fn state(&self) -> HeaterState {
        self.state
    }

    /// Number of sample windows completed so far.
    pub fn windows(&self) -> u64 {
        self.windows
    }

    pub fn pid(&self) -> &PidController {
        &self.pid
    }

    /// Heat percentage for the current reading, applying the boil and high-temperature overrides.
    pub fn heat_percent(&mut self, current: f64, target: f64) -> (f64, HeatSource) {
        if current >= self.config.max_boil_temp {
            (self.config.max_boil_output, HeatSource::BoilLimit)
        } else if current >= self.config.max_pid_temp {
            (self.config.max_output, HeatSource::FullPower)
        } else {
            (self.pid.calc(current, target), HeatSource::Pid)
        }
    }

    /// Run one sample window. Returns `false` if the run was stopped during it.
    pub async fn run_window(&mut self, running: &mut watch::Receiver<bool>) -> Result<bool, HardwareError> {
        let current = self.sensors.read_sensor(&self.kettle.sensor).await?;
        let target = self.kettles.target_temperature(&self.kettle.id).await?;
        let (percent, source) = self.heat_percent(current, target);
        let cycle = DutyCycle::split(self.config.sample_window(), percent);

        tracing::debug!(
            "{}: {:.2} -> {:.2}, {:?} {:.1}% (on {:?}, off {:?})",
            self.kettle.name,
            current,
            target,
            source,
            cycle.heat_percent,
            cycle.heating,
            cycle.rest
        );

        if !cycle.heating.is_zero() {
            self.actuators.set_actuator(&self.kettle.heater, true).await?;
            self.state = HeaterState::Heating;
            if sleep_or_stop(cycle.heating, running).await {
                return Ok(false);
            }
        }
        if !cycle.rest.is_zero() {
            self.actuators.set_actuator(&self.kettle.heater, false).await?;
            self.state = HeaterState::Cooling;
            if sleep_or_stop(cycle.rest, running).await {
                return Ok(false);
            }
        }

        self.windows += 1;
        Ok(true)
    }

    /// Run windows back to back until the running flag clears or a collaborator fails.
    ///
    /// The heater is left in whatever state the last window commanded; the
    /// caller owns the final forced heater-off.
    pub async fn run(&mut self, mut running: watch::Receiver<bool>) -> Result<(), HardwareError> {
        tracing::info!(
            "Heater loop started for {} (P: {} I: {} D: {}, window {:?})",
            self.kettle.name,
            self.config.kp,
            self.config.ki,
            self.config.kd,
            self.config.sample_window()
        );

        let result = async {
            while is_running(&running) {
                if !self.run_window(&mut running).await? {
                    break;
                }
            }
            Ok::<(), HardwareError>(())
        }
        .await;

        self.state = HeaterState::Stopped;
        tracing::info!(
            "Heater loop for {} finished after {} windows",
            self.kettle.name,
            self.windows
        );
        result
    }
}
