// std lib imports
use std::f64::consts::TAU;
// local crates
use crate::error::{DspError, Result};
use crate::fft::RealFft;
use crate::signal::DiscreteSignal;
use crate::tsm::{check_stretch, TimeStretcher, TsmParameters};
use crate::utils::{check_power_of_two, wrap_phase, Float};
use crate::windows::WindowType;

/* PhaseVocoder: time stretching by resynthesizing per-bin phases
 *
 * Synthesis frames sit every hop_synthesis samples; analysis frames are read
 * at the matching input times round(t hop_synthesis / stretch), so the output
 * is exactly round(len * stretch) samples long.
 *
 * BORING MATH:
 * for bin k (w_k = 2 pi k / N) and analysis step da between frames,
 *   dphi   = wrap( phi_t[k] - phi_{t-1}[k] - da w_k )    in (-pi, pi]
 *   freq_k = w_k + dphi / da                              (instantaneous)
 *   psi_t[k] = psi_{t-1}[k] + hop_synthesis freq_k
 * Frames are resynthesized with |X_t[k]| e^(j psi_t[k]), windowed again and
 * overlap-added, normalized by the overlapped squared window.
 *
 * With phase locking only spectral peaks get the update above; each
 * remaining bin keeps its analysis phase offset to the peak of its region
 *   psi_t[k] = psi_t[p] + phi_t[k] - phi_t[p]
 * where regions are split at the magnitude minimum between two peaks.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseVocoder {
    stretch: f64,
    window_size: usize,
    hop_synthesis: usize,
    phase_locking: bool,
}

impl PhaseVocoder {
    pub fn new(stretch: f64, window_size: usize, hop_synthesis: usize) -> Result<Self> {
        check_stretch(stretch)?;
        check_power_of_two("phase vocoder window size", window_size)?;
        if hop_synthesis == 0 || hop_synthesis >= window_size {
            return Err(DspError::config(format!(
                "synthesis hop must be in 1..{window_size}, got {hop_synthesis}"
            )));
        }
        if (hop_synthesis as f64 / stretch) < 1.0 {
            return Err(DspError::config(format!(
                "stretch {stretch} needs an analysis hop below one sample"
            )));
        }
        Ok(Self { stretch, window_size, hop_synthesis, phase_locking: false })
    }

    pub fn from_parameters(stretch: f64, params: &TsmParameters, phase_locking: bool) -> Result<Self> {
        params.validate()?;
        Ok(Self::new(stretch, params.window_size, params.hop_synthesis)?.phase_locked(phase_locking))
    }

    pub fn phase_locked(mut self, locking: bool) -> Self {
        self.phase_locking = locking;
        self
    }

    pub fn is_phase_locked(&self) -> bool {
        self.phase_locking
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn hop_synthesis(&self) -> usize {
        self.hop_synthesis
    }

    // average distance between analysis frames
    pub fn hop_analysis(&self) -> f64 {
        self.hop_synthesis as f64 / self.stretch
    }

    fn analysis_position(&self, t: usize) -> isize {
        (t as f64 * self.hop_analysis()).round() as isize
    }
}

impl TimeStretcher for PhaseVocoder {
    fn stretch(&self) -> f64 {
        self.stretch
    }

    fn time_stretch(&self, signal: &DiscreteSignal) -> Result<DiscreteSignal> {
        let size = self.window_size;
        let hop = self.hop_synthesis;
        let pad = size / 2;
        let x = signal.samples();
        let out_len = (x.len() as f64 * self.stretch).round() as usize;
        let n_frames = 1 + (out_len.saturating_sub(1) + pad).div_ceil(hop);

        let window = WindowType::Hann.periodic(size);
        let mut fft = RealFft::<Float>::new(size)?;
        let bins = fft.bins();
        let omega: Vec<f64> = (0..bins).map(|k| TAU * k as f64 / size as f64).collect();

        let mut frame = vec![0.0; size];
        let mut re = vec![0.0; bins];
        let mut im = vec![0.0; bins];
        let mut magnitude = vec![0.0f64; bins];
        let mut phase = vec![0.0f64; bins];
        let mut prev_phase = vec![0.0f64; bins];
        let mut synth_phase = vec![0.0f64; bins];
        let mut peaks = Vec::with_capacity(bins);
        let mut peak_phase = Vec::with_capacity(bins);

        let total = (n_frames - 1) * hop + size;
        let mut acc = vec![0.0f64; total];
        let mut norm = vec![0.0f64; total];
        let scale = 1.0 / size as f64;
        let mut prev_pos = 0isize;

        for t in 0..n_frames {
            let pos = self.analysis_position(t);
            let start = pos - pad as isize;
            for (i, f) in frame.iter_mut().enumerate() {
                let idx = start + i as isize;
                let v = if idx >= 0 { x.get(idx as usize).copied().unwrap_or(0.0) } else { 0.0 };
                *f = v * window[i];
            }
            fft.direct(&frame, &mut re, &mut im);
            for k in 0..bins {
                magnitude[k] = (re[k] as f64).hypot(im[k] as f64);
                phase[k] = (im[k] as f64).atan2(re[k] as f64);
            }

            if t == 0 {
                synth_phase.copy_from_slice(&phase);
            } else {
                let da = (pos - prev_pos) as f64;
                let advance = |k: usize, prev_synth: f64| {
                    let dphi = wrap_phase(phase[k] - prev_phase[k] - da * omega[k]);
                    wrap_phase(prev_synth + hop as f64 * (omega[k] + dphi / da))
                };
                if self.phase_locking {
                    find_peaks(&magnitude, &mut peaks);
                }
                if peaks.is_empty() || !self.phase_locking {
                    for k in 0..bins {
                        synth_phase[k] = advance(k, synth_phase[k]);
                    }
                } else {
                    peak_phase.clear();
                    peak_phase.extend(peaks.iter().map(|&p| advance(p, synth_phase[p])));
                    let mut lo = 0;
                    for (i, &p) in peaks.iter().enumerate() {
                        let hi = match peaks.get(i + 1) {
                            Some(&next) => region_boundary(&magnitude, p, next),
                            None => bins,
                        };
                        for k in lo..hi {
                            synth_phase[k] = peak_phase[i] + phase[k] - phase[p];
                        }
                        lo = hi;
                    }
                }
            }
            prev_phase.copy_from_slice(&phase);
            prev_pos = pos;

            for k in 0..bins {
                re[k] = (magnitude[k] * synth_phase[k].cos()) as Float;
                im[k] = (magnitude[k] * synth_phase[k].sin()) as Float;
            }
            fft.inverse(&re, &im, &mut frame);
            let offset = t * hop;
            for (i, (&y, &w)) in frame.iter().zip(window.iter()).enumerate() {
                acc[offset + i] += y as f64 * scale * w as f64;
                norm[offset + i] += (w * w) as f64;
            }
        }

        let samples = (0..out_len)
            .map(|n| {
                let i = n + pad;
                if norm[i] > 1e-10 { (acc[i] / norm[i]) as Float } else { 0.0 }
            })
            .collect();
        DiscreteSignal::new(signal.sampling_rate(), samples)
    }
}

// bins whose magnitude beats the left neighbour and is no less than the right one
fn find_peaks(magnitude: &[f64], peaks: &mut Vec<usize>) {
    peaks.clear();
    let n = magnitude.len();
    for k in 0..n {
        let m = magnitude[k];
        let left = k == 0 || m > magnitude[k - 1];
        let right = k + 1 == n || m >= magnitude[k + 1];
        if left && right && m > 0.0 {
            peaks.push(k);
        }
    }
}

// first bin owned by peak `next`: the lowest magnitude strictly between the two peaks
fn region_boundary(magnitude: &[f64], peak: usize, next: usize) -> usize {
    (peak + 1..next)
        .min_by(|&a, &b| magnitude[a].total_cmp(&magnitude[b]))
        .unwrap_or(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use std::f32::consts::PI;

    fn sine(fs: u32, freq: Float, n: usize) -> DiscreteSignal {
        let samples = (0..n).map(|i| (2.0 * PI * freq * i as Float / fs as Float).sin()).collect();
        DiscreteSignal::new(fs, samples).unwrap()
    }

    // frequency of the strongest bin in the middle of `x`
    fn dominant_frequency(x: &[Float], fs: Float) -> Float {
        let mut fft = RealFft::<Float>::new(2048).unwrap();
        let mid = x.len() / 2 - 1024;
        let window = WindowType::Hann.periodic(2048);
        let frame: Vec<Float> = x[mid..mid + 2048].iter().zip(window.iter()).map(|(a, w)| a * w).collect();
        let mut re = vec![0.0; 1025];
        let mut im = vec![0.0; 1025];
        fft.direct(&frame, &mut re, &mut im);
        let peak = (0..1025).max_by(|&a, &b| (re[a].hypot(im[a])).total_cmp(&re[b].hypot(im[b]))).unwrap();
        peak as Float * fs / 2048.0
    }

    #[test]
    fn test_configuration() {
        assert!(PhaseVocoder::new(1.0, 1000, 250).is_err());
        assert!(PhaseVocoder::new(1.0, 1024, 1024).is_err());
        assert!(PhaseVocoder::new(0.0, 1024, 256).is_err());
        assert!(PhaseVocoder::new(512.0, 1024, 256).is_err());
        let pv = PhaseVocoder::new(2.0, 1024, 256).unwrap();
        assert_abs_diff_eq!(pv.hop_analysis(), 128.0);
        assert!(!pv.is_phase_locked());
        assert!(pv.phase_locked(true).is_phase_locked());
    }

    #[test]
    fn test_unit_stretch_is_identity() {
        let mut rng = StdRng::seed_from_u64(40);
        let x: Vec<Float> = (0..5000).map(|_| rng.random_range(-1.0..1.0)).collect();
        let signal = DiscreteSignal::new(16000, x.clone()).unwrap();
        for locked in [false, true] {
            let pv = PhaseVocoder::new(1.0, 1024, 256).unwrap().phase_locked(locked);
            let y = pv.time_stretch(&signal).unwrap();
            assert_eq!(y.len(), x.len());
            assert_abs_diff_eq!(y.samples(), &x[..], epsilon = 1e-3);
        }
    }

    #[test]
    fn test_stretch_keeps_pitch() {
        let fs = 8000;
        let signal = sine(fs, 440.0, 8000);
        for (stretch, locked) in [(1.5, false), (1.5, true), (0.7, true), (2.0, true)] {
            let pv = PhaseVocoder::new(stretch, 1024, 256).unwrap().phase_locked(locked);
            let y = pv.time_stretch(&signal).unwrap();
            assert_eq!(y.len(), (8000.0 * stretch).round() as usize);
            let f = dominant_frequency(y.samples(), fs as Float);
            assert!((f - 440.0).abs() < 8.0, "stretch {stretch}: peak at {f} Hz");
            let rms = y.slice(1024, y.len() - 1024).unwrap().rms();
            assert!(rms > 0.6 && rms < 0.8, "stretch {stretch}: rms {rms}");
        }
    }

    #[test]
    fn test_find_peaks_and_regions() {
        let mag = [1.0, 3.0, 2.0, 0.5, 4.0, 4.0, 1.0, 0.0];
        let mut peaks = vec![];
        find_peaks(&mag, &mut peaks);
        assert_eq!(peaks, vec![1, 4]);
        assert_eq!(region_boundary(&mag, 1, 4), 3);
        assert_eq!(region_boundary(&mag, 1, 2), 2);
        find_peaks(&[0.0; 4], &mut peaks);
        assert!(peaks.is_empty());
    }
}
