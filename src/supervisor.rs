// src/supervisor.rs - Owns both control loops for one kettle run
//
// The heater loop runs in the foreground, the pump loop alongside it. The
// supervisor is the only writer of the running flag. Whatever ends the
// heater loop (stop request, collaborator failure, panic), the flag is
// cleared and the heater is forced off before the run reports back.
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::ControllerConfig;
use crate::control::{HeaterDriver, PumpController};
use crate::error::ControllerError;
use crate::hardware::{ActuatorDriver, Collaborators, Kettle};
use crate::notify::{Notifier, Severity};

/// Name used in notifications and failure messages.
pub const LOGIC_NAME: &str = "PIDSmartBoilWithPump";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// Ended by a stop request.
    Stopped,
    /// Ended by a collaborator failure or a panic in the loop.
    Failed(String),
}

/// Outcome of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub run_id: Uuid,
    pub heater: ExitReason,
    pub pump: ExitReason,
    pub heater_windows: u64,
    pub pump_cycles: u64,
}

pub struct Supervisor;

impl Supervisor {
    /// Resolve the kettle, read its configuration and launch both loops.
    ///
    /// Invalid configuration or PID parameters fail here, before any
    /// actuator is touched.
    pub async fn start(kettle_id: &str, collaborators: Collaborators) -> Result<RunHandle, ControllerError> {
        let kettle = collaborators.kettles.kettle(kettle_id).await?;
        let unit = collaborators.config.temperature_unit();
        let config = ControllerConfig::from_source(collaborators.config.as_ref())?.in_sensor_unit(unit);
        tracing::info!(
            "Kettle {}: max PID temp {:.2}{}, max pump temp {:.2}{}, internal loop {}s",
            kettle.name,
            config.max_pid_temp,
            unit.symbol(),
            config.max_pump_temp,
            unit.symbol(),
            config.internal_loop_interval
        );
        Self::launch(kettle, config, collaborators)
    }

    /// Launch both loops with a config already expressed in the sensor's unit.
    pub fn launch(
        kettle: Kettle,
        config: ControllerConfig,
        collaborators: Collaborators,
    ) -> Result<RunHandle, ControllerError> {
        config.validate()?;
        let heater = HeaterDriver::new(kettle.clone(), config.clone(), &collaborators)?;
        let pump = PumpController::new(kettle.clone(), &config, &collaborators);

        let run_id = Uuid::new_v4();
        let (running_tx, running_rx) = watch::channel(true);
        let running = Arc::new(running_tx);
        let span = tracing::info_span!("kettle_run", run_id = %run_id, kettle = %kettle.id);

        tracing::info!(parent: &span, "Starting {} on {}", LOGIC_NAME, kettle.name);
        collaborators
            .notifier
            .notify(&kettle.name, &format!("{} started", LOGIC_NAME), Severity::Info);

        let pump_task = tokio::spawn(
            supervise_pump(
                pump,
                running_rx.clone(),
                kettle.clone(),
                collaborators.actuators.clone(),
                collaborators.notifier.clone(),
            )
            .instrument(span.clone()),
        );

        let task = tokio::spawn(
            supervise(
                run_id,
                heater,
                pump_task,
                running.clone(),
                running_rx,
                kettle.clone(),
                collaborators.actuators.clone(),
                collaborators.notifier.clone(),
            )
            .instrument(span),
        );

        Ok(RunHandle {
            run_id,
            kettle_id: kettle.id,
            running,
            task: Some(task),
        })
    }
}

/// Handle to a running controller. Dropping it requests a stop.
pub struct RunHandle {
    run_id: Uuid,
    kettle_id: String,
    running: Arc<watch::Sender<bool>>,
    task: Option<JoinHandle<Result<RunReport, ControllerError>>>,
}

impl RunHandle {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn kettle_id(&self) -> &str {
        &self.kettle_id
    }

    /// `false` once a stop was requested or the heater loop ended.
    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    /// Clear the running flag without waiting for the loops to exit.
    pub fn request_stop(&self) {
        if self.running.send_replace(false) {
            tracing::info!("Stop requested for {}", self.kettle_id);
        }
    }

    /// Request a stop and wait for both loops to leave their actuators off.
    pub async fn stop(self) -> Result<RunReport, ControllerError> {
        self.request_stop();
        self.wait().await
    }

    /// Wait for the run to end on its own (or through another stop request).
    ///
    /// Loop failures are reported in the [`RunReport`]; an `Err` means the
    /// heater could not be forced off or the supervisor itself died.
    pub async fn wait(mut self) -> Result<RunReport, ControllerError> {
        match self.task.take() {
            Some(task) => task.await?,
            None => Err(ControllerError::Task("run already awaited".to_string())),
        }
    }
}

impl Drop for RunHandle {
    fn drop(&mut self) {
        self.request_stop();
    }
}

impl std::fmt::Debug for RunHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunHandle")
            .field("run_id", &self.run_id)
            .field("kettle_id", &self.kettle_id)
            .field("running", &self.is_running())
            .finish()
    }
}

fn report_failure(notifier: &dyn Notifier, kettle: &Kettle, loop_name: &str, err: &dyn Display) -> ExitReason {
    let message = format!("{} Error {}", LOGIC_NAME, err);
    tracing::error!("{} loop failed: {}", loop_name, message);
    notifier.notify(&kettle.name, &message, Severity::Error);
    ExitReason::Failed(err.to_string())
}

#[allow(clippy::too_many_arguments)]
async fn supervise(
    run_id: Uuid,
    mut heater: HeaterDriver,
    pump_task: JoinHandle<(ExitReason, u64)>,
    running: Arc<watch::Sender<bool>>,
    running_rx: watch::Receiver<bool>,
    kettle: Kettle,
    actuators: Arc<dyn ActuatorDriver>,
    notifier: Arc<dyn Notifier>,
) -> Result<RunReport, ControllerError> {
    let heater_task = tokio::spawn(
        async move {
            let result = heater.run(running_rx).await;
            (heater.windows(), result)
        }
        .in_current_span(),
    );

    let (heater_exit, heater_windows) = match heater_task.await {
        Ok((windows, Ok(()))) => (ExitReason::Stopped, windows),
        Ok((windows, Err(e))) => (report_failure(notifier.as_ref(), &kettle, "Heater", &e), windows),
        Err(e) => {
            let err = ControllerError::from(e);
            (report_failure(notifier.as_ref(), &kettle, "Heater", &err), 0)
        }
    };

    running.send_replace(false);
    let heater_off = actuators.set_actuator(&kettle.heater, false).await;

    let (pump_exit, pump_cycles) = match pump_task.await {
        Ok(outcome) => outcome,
        Err(e) => {
            let err = ControllerError::from(e);
            (report_failure(notifier.as_ref(), &kettle, "Pump", &err), 0)
        }
    };

    if let Err(e) = heater_off {
        tracing::error!("Failed to force heater off for {}: {}", kettle.name, e);
        notifier.notify(
            &kettle.name,
            &format!("{} could not switch the heater off: {}", LOGIC_NAME, e),
            Severity::Error,
        );
        return Err(e.into());
    }

    tracing::info!("{} stopped on {}", LOGIC_NAME, kettle.name);
    Ok(RunReport {
        run_id,
        heater: heater_exit,
        pump: pump_exit,
        heater_windows,
        pump_cycles,
    })
}

async fn supervise_pump(
    mut pump: PumpController,
    running_rx: watch::Receiver<bool>,
    kettle: Kettle,
    actuators: Arc<dyn ActuatorDriver>,
    notifier: Arc<dyn Notifier>,
) -> (ExitReason, u64) {
    let pump_task = tokio::spawn(
        async move {
            let result = pump.run(running_rx).await;
            (pump.cycles(), result)
        }
        .in_current_span(),
    );

    match pump_task.await {
        Ok((cycles, Ok(()))) => (ExitReason::Stopped, cycles),
        Ok((cycles, Err(e))) => (report_failure(notifier.as_ref(), &kettle, "Pump", &e), cycles),
        Err(e) => {
            // The loop never reached its own stop hook.
            let err = ControllerError::from(e);
            let exit = report_failure(notifier.as_ref(), &kettle, "Pump", &err);
            if let Err(off) = actuators.set_actuator(&kettle.agitator, false).await {
                tracing::error!("Failed to force pump off for {}: {}", kettle.name, off);
            }
            (exit, 0)
        }
    }
}
