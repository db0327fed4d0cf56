use approx::assert_abs_diff_eq;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::f32::consts::PI;

use dspcore::block_convolution::{OlaBlockConvolver, OlsBlockConvolver};
use dspcore::convolution::{convolve, deconvolve};
use dspcore::design::{butterworth_lowpass, fir_lowpass};
use dspcore::effects::PassThrough;
use dspcore::tsm::{stretcher, TimeStretcher, TsmAlgorithm, TsmParameters};
use dspcore::wsola::Wsola;
use dspcore::{
    DiscreteSignal, Filter, FilteringMethod, FirFilter, Float, IirFilter, OverlapAddFilter, Resampler, WaveFile,
    WindowType,
};

fn noise(n: usize, seed: u64) -> DiscreteSignal {
    let mut rng = StdRng::seed_from_u64(seed);
    DiscreteSignal::new(16000, (0..n).map(|_| rng.random_range(-1.0..1.0)).collect()).unwrap()
}

fn sine(fs: u32, freq: Float, n: usize) -> DiscreteSignal {
    let samples = (0..n).map(|i| (2.0 * PI * freq * i as Float / fs as Float).sin()).collect();
    DiscreteSignal::new(fs, samples).unwrap()
}

fn assert_close(a: &[Float], b: &[Float], rel: Float) {
    assert_eq!(a.len(), b.len());
    let peak = b.iter().fold(0.0, |m: Float, v| m.max(v.abs())).max(1e-6);
    for (i, (x, y)) in a.iter().zip(b).enumerate() {
        assert!((x - y).abs() <= rel * peak, "sample {i}: {x} vs {y}");
    }
}

// every strategy, and sample-by-sample processing, give the same output
fn check_strategies(filter: &mut dyn Filter, signal: &DiscreteSignal) {
    let reference = filter.apply_to(signal, FilteringMethod::DifferenceEquation).unwrap();
    for method in [FilteringMethod::Auto, FilteringMethod::OverlapAdd, FilteringMethod::OverlapSave] {
        let y = filter.apply_to(signal, method).unwrap();
        assert_close(y.samples(), reference.samples(), 1e-4);
    }
    filter.reset();
    let online: Vec<Float> = signal.samples().iter().map(|&x| filter.process(x)).collect();
    assert_close(&online, reference.samples(), 1e-4);
}

#[test]
fn test_filtering_strategies_agree() {
    let signal = noise(5000, 1);

    let mut fir = FirFilter::new(fir_lowpass(101, 0.1, WindowType::Hamming).unwrap()).unwrap();
    check_strategies(&mut fir, &signal);

    let mut short = FirFilter::new(vec![0.5, 0.3, 0.2]).unwrap();
    check_strategies(&mut short, &signal);

    let mut iir = IirFilter::new(butterworth_lowpass(0.1, 4).unwrap()).unwrap();
    check_strategies(&mut iir, &signal);

    // narrow one-pole low-pass, thousands of samples to decay
    let mut slow = IirFilter::from_coeffs(&[0.005], &[1.0, -0.995]).unwrap();
    check_strategies(&mut slow, &signal);
}

#[test]
fn test_block_convolvers_online_latency() {
    let signal = noise(3000, 2);
    let kernel = fir_lowpass(129, 0.2, WindowType::Blackman).unwrap();
    let reference = FirFilter::new(kernel.clone()).unwrap().apply_to(&signal, FilteringMethod::DifferenceEquation).unwrap();

    let mut ola = OlaBlockConvolver::new(kernel.clone(), None).unwrap();
    let mut ols = OlsBlockConvolver::new(kernel, None).unwrap();
    for (latency, filter) in [(ola.latency(), &mut ola as &mut dyn Filter), (ols.latency(), &mut ols as &mut dyn Filter)] {
        let online: Vec<Float> = signal.samples().iter().map(|&x| filter.process(x)).collect();
        assert_close(&online[latency..], &reference.samples()[..3000 - latency], 1e-4);
        let offline = filter.apply_to(&signal, FilteringMethod::Auto).unwrap();
        assert_close(offline.samples(), reference.samples(), 1e-4);
    }
}

#[test]
fn test_decimate_undoes_interpolate() {
    let fs = 8000;
    let n = 2000;
    let samples: Vec<Float> = (0..n)
        .map(|i| {
            let t = i as Float / fs as Float;
            (2.0 * PI * 300.0 * t).sin() + 0.5 * (2.0 * PI * 1100.0 * t).cos()
        })
        .collect();
    let signal = DiscreteSignal::new(fs, samples).unwrap();
    let resampler = Resampler::default();
    for k in [2, 3, 4] {
        let up = resampler.interpolate(&signal, k).unwrap();
        let back = resampler.decimate(&up, k).unwrap();
        assert_eq!(back.len(), n);
        assert_eq!(back.sampling_rate(), fs);

        let interior = 200..n - 200;
        let error: f64 = back.samples()[interior.clone()]
            .iter()
            .zip(&signal.samples()[interior.clone()])
            .map(|(a, b)| ((a - b) as f64).powi(2))
            .sum();
        let energy: f64 = signal.samples()[interior].iter().map(|&v| (v as f64).powi(2)).sum();
        assert!(error / energy < 1e-3, "factor {k}: relative error {}", error / energy);
    }
}

#[test]
fn test_deconvolution_round_trip() {
    let a = noise(300, 3);
    let b = DiscreteSignal::new(16000, vec![1.0, 0.5, 0.25, -0.1]).unwrap();
    let c = convolve(&a, &b).unwrap();
    assert_eq!(c.len(), 303);
    let recovered = deconvolve(&c, &b).unwrap();
    assert_eq!(recovered.len(), 300);
    assert_abs_diff_eq!(recovered.samples(), a.samples(), epsilon = 1e-3);
}

#[test]
fn test_phase_vocoder_unit_stretch() {
    let signal = noise(6000, 4);
    let params = TsmParameters { window_size: 1024, hop_analysis: 256, hop_synthesis: 256, max_delta: 0 };
    for algorithm in [TsmAlgorithm::PhaseVocoder, TsmAlgorithm::PhaseLockedVocoder] {
        let pv = stretcher(algorithm, 1.0, &params).unwrap();
        let y = pv.time_stretch(&signal).unwrap();
        assert_eq!(y.len(), signal.len());
        assert_abs_diff_eq!(y.samples(), signal.samples(), epsilon = 1e-3);
    }
}

#[test]
fn test_wsola_lengths() {
    let signal = sine(22050, 440.0, 22050);
    for stretch in [0.5, 0.8, 1.0, 1.3, 2.0] {
        let params = TsmParameters::tuned(TsmAlgorithm::Wsola, stretch, 22050).unwrap();
        let wsola = Wsola::from_parameters(stretch, &params).unwrap();
        let y = wsola.time_stretch(&signal).unwrap();
        let expected = (signal.len() as f64 * stretch).round() as i64;
        assert!((y.len() as i64 - expected).abs() <= params.hop_synthesis as i64);
    }
}

#[test]
fn test_overlap_add_dc_gain() {
    let (fft, hop) = (512, 128);
    let n = 4000;
    let ola = OverlapAddFilter::new(PassThrough, fft, hop).unwrap();
    let y = ola.apply_to(&DiscreteSignal::constant(16000, n, 1.0).unwrap(), FilteringMethod::Auto).unwrap();
    for &v in &y.samples()[fft - hop..n - (fft - hop)] {
        assert_abs_diff_eq!(v, 1.0, epsilon = 1e-4);
    }
}

#[test]
fn test_butterworth_attenuates_above_cutoff() {
    let fs = 16000;
    let tf = butterworth_lowpass(500.0 / fs as f64, 4).unwrap();
    let filter = IirFilter::new(tf).unwrap();
    let input = sine(fs, 1000.0, 8000);
    let output = filter.apply_to(&input, FilteringMethod::Auto).unwrap();
    let settled = output.slice(2000, 8000).unwrap();
    let ratio_db = 20.0 * (settled.rms() / input.slice(2000, 8000).unwrap().rms()).log10();
    assert!(ratio_db <= -20.0, "attenuation only {ratio_db} dB");
}

#[test]
fn test_wave_file_ramp_round_trip() {
    let ramp: Vec<Float> = (0..100).map(|i| (i as Float * 300.0 - 15000.0) / 32768.0).collect();
    let file = WaveFile::from_signal(DiscreteSignal::new(8000, ramp.clone()).unwrap(), 16).unwrap();
    let path = std::env::temp_dir().join(format!("dspcore_ramp_{}.wav", std::process::id()));
    file.save(&path).unwrap();
    let loaded = WaveFile::load(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(loaded.channel_count(), 1);
    assert_eq!(loaded.sampling_rate(), 8000);
    assert_eq!(loaded.bits_per_sample(), 16);
    assert_eq!(loaded.signals()[0].samples(), &ramp[..]);
}
