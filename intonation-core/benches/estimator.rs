use criterion::{Criterion, criterion_group, criterion_main};
use intonation_core::pitch::PitchEstimator;
use intonation_core::settings::{SharedPreferences, TrackerSettings};
use intonation_core::tracker::Tracker;
use std::hint::black_box;

const RATE: u32 = 44_100;

fn sine(freq: f32, len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| 0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / RATE as f32).sin())
        .collect()
}

fn benchmark(c: &mut Criterion) {
    let window = sine(440.0, 2048);

    let mut estimator = PitchEstimator::default();
    c.bench_function("estimate 2048", |b| {
        b.iter(|| estimator.estimate(black_box(&window), RATE))
    });

    let mut tracker = Tracker::new(TrackerSettings::default(), SharedPreferences::default(), RATE);
    let mut now = 0;
    c.bench_function("analyze and display", |b| {
        b.iter(|| {
            now += 33;
            tracker.analyze_frame(black_box(&window), now);
            tracker.display_tick(now)
        })
    });
}

criterion_group!(benches, benchmark);
criterion_main!(benches);
