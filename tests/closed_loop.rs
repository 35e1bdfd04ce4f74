// Closed-loop runs against the simulated thermal model
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use kettle_rs::config::PropertyTable;
use kettle_rs::hardware::simulated::{SimulatedKettle, ThermalModel};
use kettle_rs::hardware::Collaborators;
use kettle_rs::notify::TracingNotifier;
use kettle_rs::supervisor::{ExitReason, Supervisor};

#[tokio::test(start_paused = true)]
async fn test_mash_converges_to_target() {
    let sim = Arc::new(SimulatedKettle::with_model("mash", ThermalModel::default()));
    sim.set_temperature(20.0);
    sim.set_target(66.0);

    let (model_stop, model_rx) = watch::channel(false);
    let model = sim.clone().spawn_model(Duration::from_millis(100), model_rx);

    let collaborators = Collaborators::from_host(
        sim.clone(),
        Arc::new(PropertyTable::default()),
        Arc::new(TracingNotifier),
    );
    let run = Supervisor::start("mash", collaborators).await.unwrap();

    // stop between window boundaries
    tokio::time::sleep(Duration::from_secs(3602)).await;
    let temperature = sim.temperature();
    assert!(
        (temperature - 66.0).abs() < 2.0,
        "kettle at {:.2} after an hour",
        temperature
    );

    let report = run.stop().await.unwrap();
    model_stop.send(true).unwrap();
    model.await.unwrap();

    assert_eq!(report.heater, ExitReason::Stopped);
    assert_eq!(report.pump, ExitReason::Stopped);
    assert_eq!(report.heater_windows, 720);
    // 600s work + 60s rest per cycle
    assert_eq!(report.pump_cycles, 5);
    assert!(!sim.heater_on());
    assert!(!sim.agitator_on());
}

#[tokio::test(start_paused = true)]
async fn test_boil_keeps_heater_at_limit() {
    let sim = Arc::new(SimulatedKettle::with_model("boil", ThermalModel::default()));
    sim.set_temperature(99.5);
    sim.set_target(100.0);

    let collaborators = Collaborators::from_host(
        sim.clone(),
        Arc::new(PropertyTable::default()),
        Arc::new(TracingNotifier),
    );
    let run = Supervisor::start("boil", collaborators).await.unwrap();
    tokio::time::sleep(Duration::from_secs(52)).await;
    let report = run.stop().await.unwrap();
    assert_eq!(report.heater_windows, 10);

    let heater = sim.commands_for("boil-heater");
    let on_time: Duration = heater
        .windows(2)
        .filter(|pair| pair[0].on && !pair[1].on)
        .map(|pair| pair[1].at - pair[0].at)
        .sum();
    // 85% of ten 5s windows, plus 2s of the interrupted eleventh
    assert_eq!(on_time, Duration::from_millis(44_500));
}
