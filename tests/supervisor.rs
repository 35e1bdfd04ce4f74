// Integration tests for a complete kettle run: both loops, shutdown and failure paths
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use kettle_rs::config::{keys, PropertyTable, TemperatureUnit};
use kettle_rs::error::{ControllerError, HardwareError};
use kettle_rs::hardware::simulated::SimulatedKettle;
use kettle_rs::hardware::{Collaborators, SensorReader};
use kettle_rs::notify::{ChannelNotifier, Notification, Severity};
use kettle_rs::supervisor::{ExitReason, Supervisor};

fn setup(properties: PropertyTable) -> (Arc<SimulatedKettle>, Collaborators, mpsc::Receiver<Notification>) {
    let sim = Arc::new(SimulatedKettle::new("k1"));
    let (notifier, rx) = ChannelNotifier::new(32);
    let collaborators = Collaborators::from_host(sim.clone(), Arc::new(properties), Arc::new(notifier));
    (sim, collaborators, rx)
}

fn drain(rx: &mut mpsc::Receiver<Notification>) -> Vec<Notification> {
    let mut out = Vec::new();
    while let Ok(n) = rx.try_recv() {
        out.push(n);
    }
    out
}

#[tokio::test(start_paused = true)]
async fn test_stop_forces_heater_off_exactly_once() {
    let (sim, collaborators, mut notifications) = setup(PropertyTable::default());
    sim.set_temperature(20.0);
    sim.set_target(65.0);

    let run = Supervisor::start("k1", collaborators).await.unwrap();
    assert!(run.is_running());
    tokio::time::sleep(Duration::from_secs(12)).await;
    assert!(sim.heater_on());
    assert!(sim.agitator_on());

    let report = run.stop().await.unwrap();
    assert_eq!(report.heater, ExitReason::Stopped);
    assert_eq!(report.pump, ExitReason::Stopped);
    assert_eq!(report.heater_windows, 2);

    let heater: Vec<bool> = sim.commands_for("k1-heater").iter().map(|c| c.on).collect();
    assert_eq!(heater, vec![true, true, true, false]);
    assert!(!sim.heater_on());
    assert!(!sim.agitator_on());

    let messages: Vec<String> = drain(&mut notifications).into_iter().map(|n| n.message).collect();
    assert!(messages.iter().any(|m| m == "pump loop started"));
    assert!(messages.iter().all(|m| !m.contains("Error")));
}

#[tokio::test(start_paused = true)]
async fn test_boil_limit_window_through_supervisor() {
    let (sim, collaborators, _notifications) = setup(PropertyTable::default());
    sim.set_temperature(98.0);
    sim.set_target(100.0);

    let run = Supervisor::start("k1", collaborators).await.unwrap();
    tokio::time::sleep(Duration::from_secs(6)).await;
    run.stop().await.unwrap();

    let heater = sim.commands_for("k1-heater");
    assert!(heater[0].on);
    assert!(!heater[1].on);
    assert_eq!(heater[1].at - heater[0].at, Duration::from_millis(4250));
    assert_eq!(heater[2].at - heater[0].at, Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn test_sensor_failure_ends_run_and_notifies() {
    let (sim, collaborators, mut notifications) = setup(PropertyTable::default());
    sim.set_temperature(40.0);
    sim.set_target(65.0);

    let run = Supervisor::start("k1", collaborators).await.unwrap();
    tokio::time::sleep(Duration::from_secs(7)).await;
    sim.fail_sensor(Some("probe disconnected"));

    // no stop request: the heater loop ends on its own
    let report = run.wait().await.unwrap();
    assert!(matches!(report.heater, ExitReason::Failed(ref m) if m.contains("probe disconnected")));
    assert!(matches!(report.pump, ExitReason::Failed(_)));
    assert!(!sim.heater_on());
    assert!(!sim.agitator_on());
    // full power windows never switch off, so the only off is the forced one
    let heater: Vec<bool> = sim.commands_for("k1-heater").iter().map(|c| c.on).collect();
    assert_eq!(heater, vec![true, true, false]);

    let errors: Vec<Notification> = drain(&mut notifications)
        .into_iter()
        .filter(|n| n.severity == Severity::Error)
        .collect();
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().all(|n| n.message.starts_with("PIDSmartBoilWithPump Error")));
}

#[tokio::test(start_paused = true)]
async fn test_pump_failure_does_not_stop_heater() {
    let (sim, collaborators, _notifications) = setup(PropertyTable::default());
    sim.set_temperature(40.0);
    sim.set_target(65.0);
    sim.fail_actuator(Some("k1-pump"));

    let run = Supervisor::start("k1", collaborators).await.unwrap();
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert!(run.is_running());

    let report = run.stop().await.unwrap();
    assert!(matches!(report.pump, ExitReason::Failed(_)));
    assert_eq!(report.heater, ExitReason::Stopped);
    assert_eq!(report.heater_windows, 2);
    assert!(!sim.heater_on());
}

#[tokio::test(start_paused = true)]
async fn test_heater_off_failure_is_reported() {
    let (sim, collaborators, _notifications) = setup(PropertyTable::default());
    sim.set_temperature(20.0);
    sim.set_target(65.0);

    let run = Supervisor::start("k1", collaborators).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    sim.fail_actuator(Some("k1-heater"));

    let err = run.stop().await.unwrap_err();
    assert!(matches!(
        err,
        ControllerError::Hardware(HardwareError::ActuatorCommand { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_invalid_parameters_fail_before_actuation() {
    let (sim, collaborators, _notifications) =
        setup(PropertyTable::default().with(keys::MAX_OUTPUT, 0.0));
    let err = Supervisor::start("k1", collaborators).await.unwrap_err();
    assert!(matches!(err, ControllerError::Pid(_)));

    let (_, collaborators, _notifications) =
        setup(PropertyTable::default().with(keys::SAMPLE_TIME, -5.0));
    let err = Supervisor::start("k1", collaborators).await.unwrap_err();
    assert!(matches!(err, ControllerError::Config(_)));

    // rounds down to a zero-length window
    let (_, collaborators, _notifications) =
        setup(PropertyTable::default().with(keys::SAMPLE_TIME, 1e-10));
    let err = Supervisor::start("k1", collaborators).await.unwrap_err();
    assert!(matches!(err, ControllerError::Config(_)));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(sim.commands().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unknown_kettle() {
    let (_sim, collaborators, _notifications) = setup(PropertyTable::default());
    let err = Supervisor::start("k2", collaborators).await.unwrap_err();
    assert!(matches!(
        err,
        ControllerError::Hardware(HardwareError::UnknownKettle(ref id)) if id == "k2"
    ));
}

#[tokio::test(start_paused = true)]
async fn test_fahrenheit_converts_pump_threshold() {
    let properties = PropertyTable::new(TemperatureUnit::Fahrenheit).with(keys::MAX_PUMP_TEMP, 100.0);
    let (sim, collaborators, _notifications) = setup(properties);
    // 150°F is below 100°C (212°F) but above the raw configured value
    sim.set_temperature(150.0);
    sim.set_target(152.0);

    let run = Supervisor::start("k1", collaborators).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(sim.agitator_on());
    run.stop().await.unwrap();

    let properties = PropertyTable::new(TemperatureUnit::Celsius).with(keys::MAX_PUMP_TEMP, 100.0);
    let (sim, collaborators, _notifications) = setup(properties);
    sim.set_temperature(150.0);

    let run = Supervisor::start("k1", collaborators).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!sim.agitator_on());
    run.stop().await.unwrap();
    assert!(sim.commands_for("k1-pump").iter().all(|c| !c.on));
}

#[tokio::test(start_paused = true)]
async fn test_dropping_handle_stops_run() {
    let (sim, collaborators, _notifications) = setup(PropertyTable::default());
    sim.set_temperature(20.0);
    sim.set_target(65.0);

    let run = Supervisor::start("k1", collaborators).await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(sim.heater_on());
    drop(run);

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!sim.heater_on());
    assert!(!sim.agitator_on());
}

/// Sensor that panics once armed.
struct PanickingSensor {
    inner: Arc<SimulatedKettle>,
    armed: AtomicBool,
}

#[async_trait]
impl SensorReader for PanickingSensor {
    async fn read_sensor(&self, sensor_id: &str) -> Result<f64, HardwareError> {
        if self.armed.load(Ordering::SeqCst) {
            panic!("sensor driver crashed");
        }
        self.inner.read_sensor(sensor_id).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_panicking_loops_still_leave_actuators_off() {
    let (sim, mut collaborators, _notifications) = setup(PropertyTable::default());
    sim.set_temperature(20.0);
    sim.set_target(65.0);
    let sensor = Arc::new(PanickingSensor {
        inner: sim.clone(),
        armed: AtomicBool::new(false),
    });
    collaborators.sensors = sensor.clone();

    let run = Supervisor::start("k1", collaborators).await.unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(sim.heater_on());
    assert!(sim.agitator_on());
    sensor.armed.store(true, Ordering::SeqCst);

    let report = run.wait().await.unwrap();
    assert!(matches!(report.heater, ExitReason::Failed(_)));
    assert!(matches!(report.pump, ExitReason::Failed(_)));
    assert!(!sim.heater_on());
    assert!(!sim.agitator_on());

    let heater: Vec<bool> = sim.commands_for("k1-heater").iter().map(|c| c.on).collect();
    assert_eq!(heater, vec![true, false]);
    let pump: Vec<bool> = sim.commands_for("k1-pump").iter().map(|c| c.on).collect();
    assert_eq!(pump, vec![true, false]);
}
