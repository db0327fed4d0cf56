//! Benchmarks for the offline filtering strategies.
//!
//! Run with: cargo bench --bench filtering

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dspcore::design::{butterworth_lowpass, fir_lowpass};
use dspcore::{DiscreteSignal, Filter, FilteringMethod, FirFilter, Float, IirFilter, WindowType};

const SAMPLE_RATE: u32 = 44100;
const ONE_SECOND: usize = 44100;

fn test_signal(samples: usize) -> DiscreteSignal {
    let data = (0..samples)
        .map(|i| {
            let t = i as Float / SAMPLE_RATE as Float;
            let fundamental = (t * 440.0 * std::f32::consts::TAU).sin();
            let harmonic = (t * 5000.0 * std::f32::consts::TAU).sin() * 0.3;
            (fundamental + harmonic) * 0.5
        })
        .collect();
    DiscreteSignal::new(SAMPLE_RATE, data).unwrap()
}

fn bench_fir_methods(c: &mut Criterion) {
    let signal = test_signal(ONE_SECOND);
    let mut group = c.benchmark_group("fir_1sec");
    for taps in [31, 255, 1023] {
        let filter = FirFilter::new(fir_lowpass(taps, 0.05, WindowType::Hamming).unwrap()).unwrap();
        for method in [FilteringMethod::DifferenceEquation, FilteringMethod::OverlapAdd, FilteringMethod::OverlapSave] {
            group.bench_with_input(BenchmarkId::new(format!("{method:?}"), taps), &taps, |b, _| {
                b.iter(|| black_box(filter.apply_to(&signal, method).unwrap()));
            });
        }
    }
    group.finish();
}

fn bench_iir_online(c: &mut Criterion) {
    let signal = test_signal(ONE_SECOND);
    let mut filter = IirFilter::new(butterworth_lowpass(0.05, 4).unwrap()).unwrap();

    c.bench_function("iir_online_1sec", |b| {
        b.iter(|| {
            for &sample in signal.samples() {
                black_box(filter.process(sample));
            }
        });
    });
}

criterion_group!(benches, bench_fir_methods, bench_iir_online);
criterion_main!(benches);
