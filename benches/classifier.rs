use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::time::{Duration, Instant};

use anilay::audio::rms;
use anilay::mode::{ModeClassifier, ThresholdTable};

fn bench_rms(c: &mut Criterion) {
    let frame: Vec<i16> = (0..1024).map(|i| ((i * 37) % 4096 - 2048) as i16).collect();
    c.bench_function("rms_1024", |b| b.iter(|| rms(black_box(&frame))));
}

fn bench_observe(c: &mut Criterion) {
    let thresholds = ThresholdTable::new([("talking", 20.0), ("screaming", 2000.0), ("whisper", 5.0)]);
    let mut classifier = ModeClassifier::new(thresholds, Duration::from_millis(500));
    let levels = [3.0f32, 30.0, 2500.0, 30.0, 8.0, 1.0];
    let start = Instant::now();
    let mut tick = 0u64;

    c.bench_function("classifier_observe", |b| {
        b.iter(|| {
            tick += 1;
            let now = start + Duration::from_millis(tick * 23);
            classifier.observe(black_box(levels[tick as usize % levels.len()]), now)
        })
    });
}

criterion_group!(benches, bench_rms, bench_observe);
criterion_main!(benches);
