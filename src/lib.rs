//! # kettle-rs
//!
//! Closed-loop temperature control for a brewing kettle with a recirculation
//! pump. Two loops run side by side for the lifetime of a run:
//!
//! - the heater loop turns a PID power percentage into on/off time inside a
//!   fixed sample window, with a boil-limit cap and a full-power cutover;
//! - the pump loop alternates work and rest phases and switches the pump off
//!   whenever the kettle is too hot for it.
//!
//! Sensors, actuators, configuration and notifications are provided by the
//! host through the traits in [`hardware`], [`config`] and [`notify`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use kettle_rs::config::PropertyTable;
//! use kettle_rs::hardware::{simulated::SimulatedKettle, Collaborators};
//! use kettle_rs::notify::TracingNotifier;
//! use kettle_rs::supervisor::Supervisor;
//!
//! # async fn demo() -> Result<(), kettle_rs::error::ControllerError> {
//! let kettle = Arc::new(SimulatedKettle::new("mash"));
//! kettle.set_target(66.0);
//! let collaborators = Collaborators::from_host(
//!     kettle,
//!     Arc::new(PropertyTable::default()),
//!     Arc::new(TracingNotifier),
//! );
//! let run = Supervisor::start("mash", collaborators).await?;
//! // ...
//! let report = run.stop().await?;
//! println!("{:?}", report);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod control;
pub mod error;
pub mod hardware;
pub mod notify;
pub mod supervisor;

pub use config::{ControllerConfig, TemperatureUnit};
pub use control::{DutyCycle, HeaterDriver, PidController, PumpController};
pub use error::{ConfigError, ControllerError, HardwareError, PidError};
pub use hardware::Collaborators;
pub use supervisor::{ExitReason, RunHandle, RunReport, Supervisor};
