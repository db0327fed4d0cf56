//!
//! Sample rate conversion.
//!
// std lib imports
use std::f64::consts::PI;
// local crates
use crate::convolution::convolve_samples;
use crate::design::fir_lowpass;
use crate::error::{DspError, Result};
use crate::signal::{DiscreteSignal, SampleRate};
use crate::utils::{sinc, Float};
use crate::windows::WindowType;

/// Default half-width (in input samples) of the band-limited interpolation kernel
pub const DEFAULT_RESAMPLE_ORDER: usize = 15;
/// Up/down factors above this go through band-limited resampling
pub const MAX_POLYPHASE_FACTOR: usize = 20;

/* Resampler: interpolation, decimation and arbitrary-ratio resampling
 *
 * Anti-imaging / anti-aliasing uses a Blackman windowed-sinc low-pass with
 * max(2 factor + 1, min_order) taps (rounded up to odd). The filter is applied
 * with its group delay removed, so outputs stay time-aligned with inputs.
 */
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Resampler {
    pub min_order: usize,
}

impl Default for Resampler {
    fn default() -> Self {
        Self { min_order: 101 }
    }
}

impl Resampler {
    pub fn new(min_order: usize) -> Self {
        Self { min_order }
    }

    fn filter_order(&self, factor: usize) -> usize {
        (2 * factor + 1).max(self.min_order) | 1
    }

    // low-pass at `freq` with the group delay removed, output as long as the input
    fn lowpass(&self, samples: &[Float], freq: f64, factor: usize) -> Result<Vec<Float>> {
        let order = self.filter_order(factor);
        let kernel = fir_lowpass(order, freq, WindowType::Blackman)?;
        let full = convolve_samples(samples, &kernel)?;
        let delay = (order - 1) / 2;
        Ok(full.into_iter().skip(delay).take(samples.len()).collect())
    }

    /// Upsample by an integer `factor`: zero-stuff, scale by `factor`, anti-image at `0.5 / factor`
    pub fn interpolate(&self, signal: &DiscreteSignal, factor: usize) -> Result<DiscreteSignal> {
        let fs = new_rate(signal.sampling_rate(), factor, 1)?;
        if factor == 1 {
            return Ok(signal.clone());
        }
        let mut stuffed = vec![0.0; signal.len() * factor];
        for (i, &x) in signal.samples().iter().enumerate() {
            stuffed[i * factor] = x * factor as Float;
        }
        let samples = self.lowpass(&stuffed, 0.5 / factor as f64, factor)?;
        DiscreteSignal::new(fs, samples)
    }

    /// Downsample by an integer `factor`: anti-alias at `0.5 / factor`, keep every `factor`-th sample
    pub fn decimate(&self, signal: &DiscreteSignal, factor: usize) -> Result<DiscreteSignal> {
        let fs = new_rate(signal.sampling_rate(), 1, factor)?;
        if factor == 1 {
            return Ok(signal.clone());
        }
        let filtered = self.lowpass(signal.samples(), 0.5 / factor as f64, factor)?;
        DiscreteSignal::new(fs, filtered.into_iter().step_by(factor).collect())
    }

    /// Band-limited resampling to `new_rate`;
    /// `order` is the kernel half-width in input samples (`DEFAULT_RESAMPLE_ORDER` if None)
    pub fn resample(&self, signal: &DiscreteSignal, new_rate: SampleRate, order: Option<usize>) -> Result<DiscreteSignal> {
        if new_rate == 0 {
            return Err(DspError::config("target sampling rate must be positive"));
        }
        let fs = signal.sampling_rate();
        if new_rate == fs {
            return Ok(signal.clone());
        }
        let ratio = new_rate as f64 / fs as f64;
        let samples = self.resample_ratio(signal.samples(), ratio, order.unwrap_or(DEFAULT_RESAMPLE_ORDER))?;
        DiscreteSignal::new(new_rate, samples)
    }

    /// Rational resampling by `up / down`:
    /// combined interpolation and decimation for small factors,
    /// band-limited resampling when either factor exceeds `MAX_POLYPHASE_FACTOR`
    pub fn resample_up_down(&self, signal: &DiscreteSignal, up: usize, down: usize) -> Result<DiscreteSignal> {
        if up == 0 || down == 0 {
            return Err(DspError::config(format!("resampling factors must be positive, got {up}/{down}")));
        }
        let g = gcd(up, down);
        let (up, down) = (up / g, down / g);
        let fs = new_rate(signal.sampling_rate(), up, down)?;
        if up == down {
            return Ok(signal.clone());
        }

        if up > MAX_POLYPHASE_FACTOR || down > MAX_POLYPHASE_FACTOR {
            log::debug!("resampling {up}/{down} with a band-limited kernel");
            let ratio = up as f64 / down as f64;
            let samples = self.resample_ratio(signal.samples(), ratio, DEFAULT_RESAMPLE_ORDER)?;
            return DiscreteSignal::new(fs, samples);
        }

        // one low-pass covers both anti-imaging and anti-aliasing
        let factor = up.max(down);
        let mut stuffed = vec![0.0; signal.len() * up];
        for (i, &x) in signal.samples().iter().enumerate() {
            stuffed[i * up] = x * up as Float;
        }
        let filtered = if factor > 1 {
            self.lowpass(&stuffed, 0.5 / factor as f64, factor)?
        } else {
            stuffed
        };
        DiscreteSignal::new(fs, filtered.into_iter().step_by(down).collect())
    }

    /* BORING MATH:
     * output sample n sits at input time t = n / ratio and is
     *   y[n] = sum{k}( x[k] sinc(t - k) w(t - k) ),  |t - k| <= order
     * with a raised cosine taper w(d) = (1 + cos(pi d / (order + 1))) / 2.
     * When shrinking (ratio < 1), the input is low-passed at ratio / 2 first.
     */
    fn resample_ratio(&self, samples: &[Float], ratio: f64, order: usize) -> Result<Vec<Float>> {
        if !(ratio > 0.0) || !ratio.is_finite() {
            return Err(DspError::config(format!("resampling ratio must be positive, got {ratio}")));
        }
        if order == 0 {
            return Err(DspError::config("resampling kernel order must be positive"));
        }
        let filtered;
        let input = if ratio < 1.0 {
            let factor = (1.0 / ratio).ceil() as usize;
            filtered = self.lowpass(samples, 0.5 * ratio, factor)?;
            &filtered[..]
        } else {
            samples
        };

        let out_len = (input.len() as f64 * ratio).round() as usize;
        let half = order as isize;
        let taper = (order + 1) as f64;
        let mut out = Vec::with_capacity(out_len);
        for n in 0..out_len {
            let t = n as f64 / ratio;
            let center = t.floor() as isize;
            let mut acc = 0.0;
            for k in (center - half + 1)..=(center + half) {
                if k < 0 || k as usize >= input.len() {
                    continue;
                }
                let d = t - k as f64;
                if d.abs() > order as f64 {
                    continue;
                }
                let w = 0.5 * (1.0 + (PI * d / taper).cos());
                acc += input[k as usize] as f64 * sinc(d) * w;
            }
            out.push(acc as Float);
        }
        Ok(out)
    }
}

fn new_rate(fs: SampleRate, up: usize, down: usize) -> Result<SampleRate> {
    if up == 0 || down == 0 {
        return Err(DspError::config(format!("resampling factors must be positive, got {up}/{down}")));
    }
    let rate = (fs as u64 * up as u64) / down as u64;
    if rate == 0 || rate > SampleRate::MAX as u64 {
        return Err(DspError::config(format!("can't resample {fs} Hz by {up}/{down}")));
    }
    Ok(rate as SampleRate)
}

fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn sine(fs: SampleRate, freq: f64, n: usize) -> DiscreteSignal {
        let samples = (0..n).map(|i| (2.0 * PI * freq * i as f64 / fs as f64).sin() as Float).collect();
        DiscreteSignal::new(fs, samples).unwrap()
    }

    fn max_error(a: &[Float], b: &[Float]) -> Float {
        a.iter().zip(b).map(|(x, y)| (x - y).abs()).fold(0.0, Float::max)
    }

    #[test]
    fn test_filter_order() {
        let r = Resampler::default();
        assert_eq!(r.filter_order(2), 101);
        assert_eq!(r.filter_order(60), 121);
        assert_eq!(Resampler::new(10).filter_order(2), 11);
    }

    #[test]
    fn test_interpolate() {
        let x = sine(8000, 200.0, 800);
        let y = Resampler::default().interpolate(&x, 3).unwrap();
        assert_eq!(y.sampling_rate(), 24000);
        assert_eq!(y.len(), 2400);
        let expected = sine(24000, 200.0, 2400);
        assert!(max_error(&y.samples()[200..2200], &expected.samples()[200..2200]) < 1e-2);
    }

    #[test]
    fn test_decimate() {
        let x = sine(16000, 300.0, 1600);
        let y = Resampler::default().decimate(&x, 4).unwrap();
        assert_eq!(y.sampling_rate(), 4000);
        assert_eq!(y.len(), 400);
        let expected = sine(4000, 300.0, 400);
        assert!(max_error(&y.samples()[30..370], &expected.samples()[30..370]) < 1e-2);

        // a tone above the new Nyquist is removed
        let high = sine(16000, 3000.0, 1600);
        let y = Resampler::default().decimate(&high, 4).unwrap();
        assert!(y.slice(30, 370).unwrap().rms() < 0.01);
    }

    #[test]
    fn test_resample() {
        let r = Resampler::default();
        let x = sine(16000, 440.0, 1600);
        let y = r.resample(&x, 22050, None).unwrap();
        assert_eq!(y.sampling_rate(), 22050);
        assert_eq!(y.len(), 2205);
        let expected = sine(22050, 440.0, 2205);
        assert!(max_error(&y.samples()[40..2160], &expected.samples()[40..2160]) < 1e-2);

        let y = r.resample(&x, 8000, None).unwrap();
        assert_eq!(y.len(), 800);
        let expected = sine(8000, 440.0, 800);
        assert!(max_error(&y.samples()[60..740], &expected.samples()[60..740]) < 2e-2);

        assert!(r.resample(&x, 0, None).is_err());
        assert_eq!(r.resample(&x, 16000, None).unwrap().samples(), x.samples());
    }

    #[test]
    fn test_resample_up_down() {
        let r = Resampler::default();
        let x = sine(8000, 250.0, 1200);

        let y = r.resample_up_down(&x, 3, 2).unwrap();
        assert_eq!(y.sampling_rate(), 12000);
        assert_eq!(y.len(), 1800);
        let expected = sine(12000, 250.0, 1800);
        assert!(max_error(&y.samples()[150..1650], &expected.samples()[150..1650]) < 1e-2);

        // 160/147 goes through the band-limited path
        let y = r.resample_up_down(&x, 160, 147).unwrap();
        assert_eq!(y.sampling_rate(), 8707);
        assert_eq!(y.len(), (1200.0f64 * 160.0 / 147.0).round() as usize);
        for (n, &v) in y.samples().iter().enumerate().skip(40).take(1200) {
            let t = n as f64 * 147.0 / 160.0 / 8000.0;
            assert_abs_diff_eq!(v, (2.0 * PI * 250.0 * t).sin() as Float, epsilon = 1e-2);
        }

        assert!(r.resample_up_down(&x, 0, 2).is_err());
        assert_eq!(r.resample_up_down(&x, 4, 4).unwrap().len(), 1200);
    }
}
