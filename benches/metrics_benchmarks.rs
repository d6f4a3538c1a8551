//! Benchmarks for localization metrics on a full-size test session

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use freefield_toolbox::analysis::{eg, mad, rmse, summarize, SpeakerPositions, TrialRecord, TrialTable};

#[allow(clippy::cast_precision_loss)]
fn session() -> (TrialTable, SpeakerPositions) {
    let positions: Vec<(f64, f64)> = (0..7).map(|i| (0.0, -37.5 + 12.5 * i as f64)).collect();
    let table = (0..700)
        .map(|trial| {
            let speaker = trial % 7;
            let ele = positions[speaker].1;
            TrialRecord {
                speaker,
                azi_target: 0.0,
                ele_target: ele,
                azi_response: ((trial * 13) % 11) as f64 - 5.0,
                ele_response: ele * 0.8 + ((trial * 7) % 5) as f64,
            }
        })
        .collect();
    (table, SpeakerPositions::from_rows(&positions))
}

fn benchmark_metrics(c: &mut Criterion) {
    let (table, positions) = session();

    c.bench_function("mad_single_speaker", |b| b.iter(|| mad(black_box(&table), 3, None)));
    c.bench_function("rmse_single_speaker", |b| b.iter(|| rmse(black_box(&table), 3, None)));
    c.bench_function("eg_regression", |b| b.iter(|| eg(black_box(&table), Some(&positions))));
    c.bench_function("eg_interquartile", |b| b.iter(|| eg(black_box(&table), None)));
    c.bench_function("summarize", |b| b.iter(|| summarize(black_box(&table), Some(&positions))));
}

criterion_group!(benches, benchmark_metrics);
criterion_main!(benches);
