// Benchmark for the PID calculation and duty-cycle split
// Run with: cargo bench

use criterion::{criterion_group, criterion_main, Criterion};
use kettle_rs::control::{DutyCycle, PidController};
use std::hint::black_box;
use std::time::Duration;
use tokio::time::Instant;

fn bench_pid_calc(c: &mut Criterion) {
    let start = Instant::now();
    c.bench_function("pid calc 10k sample windows", |b| {
        b.iter(|| {
            let mut pid = PidController::new(5.0, 117.0795, 0.2747, 41.58, 0.0, 100.0).unwrap();
            let mut temperature = 20.0;
            for n in 0..10_000u64 {
                let now = start + Duration::from_secs(5 * n);
                let output = pid.calc_at(black_box(temperature), 66.0, now);
                temperature += output * 0.001 - (temperature - 20.0) * 0.0005;
            }
            assert!(temperature > 20.0);
        });
    });
}

fn bench_duty_cycle(c: &mut Criterion) {
    let window = Duration::from_secs(5);
    c.bench_function("duty cycle split 0..=100%", |b| {
        b.iter(|| {
            for percent in 0..=100 {
                let cycle = DutyCycle::split(window, black_box(percent as f64));
                assert_eq!(cycle.heating + cycle.rest, window);
            }
        });
    });
}

criterion_group!(benches, bench_pid_calc, bench_duty_cycle);
criterion_main!(benches);
