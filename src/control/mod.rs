// src/control/mod.rs - Control loops for the kettle heater and recirculation pump
pub mod heater;
pub mod pid;
pub mod pump;

pub use heater::{DutyCycle, HeatSource, HeaterDriver, HeaterState};
pub use pid::{PidController, PidTerms};
pub use pump::{PumpController, PumpState};

use std::time::Duration;
use tokio::sync::watch;

/// Sleep for `duration` unless the run is stopped first.
///
/// `running` carries the supervisor's running flag. Returns `true` when the
/// run was stopped (or the supervisor went away) before the sleep finished.
pub(crate) async fn sleep_or_stop(duration: Duration, running: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = running.wait_for(|running| !*running) => true,
    }
}

pub(crate) fn is_running(running: &watch::Receiver<bool>) -> bool {
    *running.borrow() && running.has_changed().is_ok()
}
