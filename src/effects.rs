//!
//! Spectral effects built on the overlap-add framework,
//! plus offline harmonic/percussive separation.
//!
// external crates
use ndarray::{s, Array2, Zip};
use rustfft::num_complex::Complex32;
// local crates
use crate::error::{DspError, Result};
use crate::fft::RealFft;
use crate::overlap_add::{OverlapAddFilter, SpectralProcessor};
use crate::signal::DiscreteSignal;
use crate::stft::Stft;
use crate::utils::{median, Float};
use crate::windows::WindowType;

/// Over-subtraction factor used by `SpectralSubtraction::new`
pub const DEFAULT_ALPHA: Float = 2.0;
/// Spectral floor used by `SpectralSubtraction::new` (about -34 dB)
pub const DEFAULT_BETA: Float = 0.02;

// Dummy processor that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl SpectralProcessor for PassThrough {
    fn process_spectrum(&mut self, re: &[Float], im: &[Float], out_re: &mut [Float], out_im: &mut [Float]) {
        out_re.copy_from_slice(re);
        out_im.copy_from_slice(im);
    }
}

/* Robotizer: keep magnitudes, zero every phase
 */
#[derive(Debug, Clone, Copy, Default)]
pub struct Robotizer;

impl SpectralProcessor for Robotizer {
    fn process_spectrum(&mut self, re: &[Float], im: &[Float], out_re: &mut [Float], _out_im: &mut [Float]) {
        for ((o, &r), &i) in out_re.iter_mut().zip(re).zip(im) {
            *o = (r * r + i * i).sqrt();
        }
    }
}

/* SpectralSubtraction: stationary noise reduction (power subtraction)
 *
 * BORING MATH:
 *   g[k] = sqrt( max(1 - alpha N[k] / P[k], beta) )
 * where P is the power of the current frame and N the average noise power
 * measured on a noise-only signal with the same window and FFT size.
 */
#[derive(Debug, Clone)]
pub struct SpectralSubtraction {
    noise_power: Vec<Float>,
    alpha: Float,
    beta: Float,
}

impl SpectralSubtraction {
    /// Estimate the noise profile from `noise` (frames of `fft_size` every `hop_size`)
    pub fn new(noise: &DiscreteSignal, fft_size: usize, hop_size: usize) -> Result<Self> {
        if hop_size == 0 {
            return Err(DspError::config("noise estimation hop size must be positive"));
        }
        let mut fft = RealFft::<Float>::new(fft_size)?;
        let window = WindowType::Hann.periodic(fft_size);
        let bins = fft.bins();
        let mut re = vec![0.0; bins];
        let mut im = vec![0.0; bins];
        let mut frame = vec![0.0; fft_size];
        let mut noise_power = vec![0.0; bins];

        let samples = noise.samples();
        let mut start = 0;
        let mut frames = 0;
        loop {
            for (i, f) in frame.iter_mut().enumerate() {
                *f = samples.get(start + i).copied().unwrap_or(0.0) * window[i];
            }
            fft.direct(&frame, &mut re, &mut im);
            for (p, (&r, &i)) in noise_power.iter_mut().zip(re.iter().zip(im.iter())) {
                *p += r * r + i * i;
            }
            frames += 1;
            start += hop_size;
            if start + fft_size > samples.len() {
                break;
            }
        }
        for p in noise_power.iter_mut() {
            *p /= frames as Float;
        }
        Ok(Self { noise_power, alpha: DEFAULT_ALPHA, beta: DEFAULT_BETA })
    }

    /// Noise profile from `noise`, wrapped in a ready-to-use overlap-add filter
    pub fn filter(noise: &DiscreteSignal, fft_size: usize, hop_size: usize) -> Result<OverlapAddFilter<Self>> {
        OverlapAddFilter::new(Self::new(noise, fft_size, hop_size)?, fft_size, hop_size)
    }

    pub fn with_params(mut self, alpha: Float, beta: Float) -> Result<Self> {
        if !(alpha >= 0.0) || !(0.0..=1.0).contains(&beta) {
            return Err(DspError::config(format!(
                "spectral subtraction needs alpha >= 0 and beta in [0, 1], got {alpha} / {beta}"
            )));
        }
        self.alpha = alpha;
        self.beta = beta;
        Ok(self)
    }

    pub fn noise_power(&self) -> &[Float] {
        &self.noise_power
    }
}

impl SpectralProcessor for SpectralSubtraction {
    fn process_spectrum(&mut self, re: &[Float], im: &[Float], out_re: &mut [Float], out_im: &mut [Float]) {
        for k in 0..re.len().min(self.noise_power.len()) {
            let power = re[k] * re[k] + im[k] * im[k];
            if power <= 0.0 {
                continue;
            }
            let gain = (1.0 - self.alpha * self.noise_power[k] / power).max(self.beta).sqrt();
            out_re[k] = re[k] * gain;
            out_im[k] = im[k] * gain;
        }
    }
}

/* SpectralEnvelope: envelope following on the magnitude spectrum
 *
 * BORING MATH:
 *   E[k] = mean{ |X[j]| : |j - k| <= radius }      (bins past the edges are skipped)
 *   F[k] = smoothing F[k] + (1 - smoothing) E[k]    (followed across frames)
 * Each frame is resynthesized from F with zero phase.
 */
#[derive(Debug, Clone, Default)]
pub struct SpectralEnvelope {
    radius: usize,
    smoothing: Float,
    envelope: Vec<Float>,
    // running sum of |X|, one longer than the spectrum
    cumulative: Vec<Float>,
}

impl SpectralEnvelope {
    /// Envelope averaged over `2 * radius + 1` bins
    pub fn new(radius: usize) -> Self {
        Self { radius, ..Default::default() }
    }

    /// Envelope follower wrapped in a ready-to-use overlap-add filter
    pub fn filter(radius: usize, fft_size: usize, hop_size: usize) -> Result<OverlapAddFilter<Self>> {
        OverlapAddFilter::new(Self::new(radius), fft_size, hop_size)
    }

    // 0 follows every frame as is, closer to 1 is slower
    pub fn with_smoothing(mut self, smoothing: Float) -> Result<Self> {
        if !(0.0..1.0).contains(&smoothing) {
            return Err(DspError::config(format!("envelope smoothing must be in [0, 1), got {smoothing}")));
        }
        self.smoothing = smoothing;
        Ok(self)
    }

    pub fn radius(&self) -> usize {
        self.radius
    }

    /// Envelope of the last processed frame
    pub fn envelope(&self) -> &[Float] {
        &self.envelope
    }
}

impl SpectralProcessor for SpectralEnvelope {
    fn process_spectrum(&mut self, re: &[Float], im: &[Float], out_re: &mut [Float], _out_im: &mut [Float]) {
        let bins = re.len();
        if self.envelope.len() != bins {
            self.envelope = vec![0.0; bins];
            self.cumulative = vec![0.0; bins + 1];
        }
        for (k, (&r, &i)) in re.iter().zip(im).enumerate() {
            self.cumulative[k + 1] = self.cumulative[k] + (r * r + i * i).sqrt();
        }
        for k in 0..bins {
            let lo = k.saturating_sub(self.radius);
            let hi = (k + self.radius + 1).min(bins);
            let mean = (self.cumulative[hi] - self.cumulative[lo]) / (hi - lo) as Float;
            let e = &mut self.envelope[k];
            *e = self.smoothing * *e + (1.0 - self.smoothing) * mean;
            out_re[k] = *e;
        }
    }

    fn reset(&mut self) {
        self.envelope.fill(0.0);
    }
}

/* HarmonicPercussiveSeparator: median-filtering source separation
 *
 * Steady tones are smooth along time, clicks are smooth along frequency.
 * Median-filter the magnitude spectrogram both ways to get harmonic (H) and
 * percussive (P) estimates, then split every bin with soft masks
 *   M_h = H^p / (H^p + P^p),  M_p = P^p / (H^p + P^p)
 * The masks sum to 1, so the two outputs add back up to the input.
 */
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HarmonicPercussiveSeparator {
    pub fft_size: usize,
    pub hop_size: usize,
    // median length along time (frames)
    pub harmonic_width: usize,
    // median length along frequency (bins)
    pub percussive_width: usize,
    pub mask_power: Float,
}

impl Default for HarmonicPercussiveSeparator {
    fn default() -> Self {
        Self { fft_size: 1024, hop_size: 256, harmonic_width: 17, percussive_width: 17, mask_power: 2.0 }
    }
}

impl HarmonicPercussiveSeparator {
    /// Split `signal` into (harmonic, percussive) parts of the same length
    pub fn separate(&self, signal: &DiscreteSignal) -> Result<(DiscreteSignal, DiscreteSignal)> {
        if self.harmonic_width == 0 || self.percussive_width == 0 {
            return Err(DspError::config("median filter widths must be positive"));
        }
        let mut stft = Stft::new(self.fft_size, self.hop_size, WindowType::Hann)?;
        let spec = stft.direct(signal.samples());
        let magnitude = spec.mapv(|z| z.norm());

        let harmonic = median_filter(&magnitude, self.harmonic_width, 0);
        let percussive = median_filter(&magnitude, self.percussive_width, 1);

        let mut harmonic_spec = spec.clone();
        let mut percussive_spec = spec;
        let p = self.mask_power;
        Zip::from(&mut harmonic_spec)
            .and(&mut percussive_spec)
            .and(&harmonic)
            .and(&percussive)
            .for_each(|hz: &mut Complex32, pz: &mut Complex32, &h, &q| {
                let (hp, qp) = (h.powf(p), q.powf(p));
                let total = hp + qp;
                let mask = if total > 1e-20 { hp / total } else { 0.5 };
                *hz *= mask;
                *pz *= 1.0 - mask;
            });

        let fs = signal.sampling_rate();
        let n = signal.len();
        let h = DiscreteSignal::new(fs, stft.inverse(&harmonic_spec, n)?)?;
        let q = DiscreteSignal::new(fs, stft.inverse(&percussive_spec, n)?)?;
        Ok((h, q))
    }
}

// centered running median of `width` values along `axis` (0 = time, 1 = frequency)
fn median_filter(data: &Array2<Float>, width: usize, axis: usize) -> Array2<Float> {
    let (rows, cols) = data.dim();
    let half = width / 2;
    let mut out = Array2::<Float>::zeros((rows, cols));
    let mut scratch = Vec::with_capacity(width);
    for r in 0..rows {
        for c in 0..cols {
            scratch.clear();
            if axis == 0 {
                let lo = r.saturating_sub(half);
                let hi = (r + half + 1).min(rows);
                scratch.extend(data.slice(s![lo..hi, c]).iter().copied());
            } else {
                let lo = c.saturating_sub(half);
                let hi = (c + half + 1).min(cols);
                scratch.extend(data.slice(s![r, lo..hi]).iter().copied());
            }
            out[[r, c]] = median(&mut scratch);
        }
    }
    out
}
