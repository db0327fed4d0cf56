//!
//! Offline convolution, cross-correlation and deconvolution.
//!
// external crates
use rustfft::num_complex::Complex;
// local crates
use crate::error::{DspError, Result};
use crate::fft::{Fft, RealFft};
use crate::polynomial;
use crate::signal::{ComplexDiscreteSignal, DiscreteSignal};
use crate::utils::{Float, C64};

/// Added to the real part of both spectra in spectral deconvolution.
///
/// This biases every bin towards 1 and keeps empty bins finite,
/// so spectral results are approximate.
pub const DECONVOLUTION_EPSILON: f64 = 1e-10;

// remainder energy (relative to the signal's) below which division counts as exact
const EXACT_REMAINDER_TOLERANCE: f64 = 1e-10;

/// Direct (time-domain) full linear convolution, `a.len() + b.len() - 1` samples
pub fn convolve_direct(a: &[Float], b: &[Float]) -> Vec<Float> {
    if a.is_empty() || b.is_empty() {
        return vec![];
    }
    let mut out = vec![0.0f64; a.len() + b.len() - 1];
    for (i, &x) in a.iter().enumerate() {
        for (j, &h) in b.iter().enumerate() {
            out[i + j] += x as f64 * h as f64;
        }
    }
    out.into_iter().map(|v| v as Float).collect()
}

/* Convolver: FFT convolution of real blocks of a fixed FFT size.
 *
 * BORING MATH:
 *   a * b = IFFT( FFT(a) FFT(b) ) / N
 * which equals linear convolution as long as a.len() + b.len() - 1 <= N.
 * All buffers live inside the instance, so repeated calls don't allocate.
 */
#[derive(Debug, Clone)]
pub struct Convolver {
    fft: RealFft<Float>,
    re1: Vec<Float>,
    im1: Vec<Float>,
    re2: Vec<Float>,
    im2: Vec<Float>,
    reversed: Vec<Float>,
    out: Vec<Float>,
}

impl Convolver {
    pub fn new(fft_size: usize) -> Result<Self> {
        let fft = RealFft::new(fft_size)?;
        let bins = fft.bins();
        Ok(Self {
            fft,
            re1: vec![0.0; bins],
            im1: vec![0.0; bins],
            re2: vec![0.0; bins],
            im2: vec![0.0; bins],
            reversed: vec![0.0; fft_size],
            out: vec![0.0; fft_size],
        })
    }

    // smallest convolver that fits the full convolution of lengths `n` and `m`
    pub fn for_lengths(n: usize, m: usize) -> Result<Self> {
        Self::new((n + m).saturating_sub(1).max(2).next_power_of_two())
    }

    pub fn fft_size(&self) -> usize {
        self.fft.size()
    }

    /// Full linear convolution of `a` and `b`; the first `output.len()`
    /// samples (at most the FFT size) are written.
    pub fn convolve(&mut self, a: &[Float], b: &[Float], output: &mut [Float]) -> Result<()> {
        self.check_fits(a.len(), b.len())?;
        self.fft.direct(a, &mut self.re1, &mut self.im1);
        self.fft.direct(b, &mut self.re2, &mut self.im2);
        self.multiply_and_invert(output);
        Ok(())
    }

    /// Cross-correlation of `a` with `b` (convolution with `b` reversed):
    /// output[k] = sum{i}( a[i] b[i + (b.len()-1) - k] )
    /// so lag zero sits at index `b.len() - 1`.
    pub fn cross_correlate(&mut self, a: &[Float], b: &[Float], output: &mut [Float]) -> Result<()> {
        self.check_fits(a.len(), b.len())?;
        self.reversed.fill(0.0);
        for (r, &x) in self.reversed.iter_mut().zip(b.iter().rev()) {
            *r = x;
        }
        self.fft.direct(a, &mut self.re1, &mut self.im1);
        self.fft.direct(&self.reversed[..b.len()], &mut self.re2, &mut self.im2);
        self.multiply_and_invert(output);
        Ok(())
    }

    fn multiply_and_invert(&mut self, output: &mut [Float]) {
        for k in 0..self.re1.len() {
            let z = Complex::new(self.re1[k], self.im1[k]) * Complex::new(self.re2[k], self.im2[k]);
            self.re1[k] = z.re;
            self.im1[k] = z.im;
        }
        self.fft.inverse(&self.re1, &self.im1, &mut self.out);
        let scale = 1.0 / self.fft.size() as Float;
        for (o, &v) in output.iter_mut().zip(self.out.iter()) {
            *o = v * scale;
        }
    }

    fn check_fits(&self, n: usize, m: usize) -> Result<()> {
        if n + m > self.fft.size() + 1 {
            return Err(DspError::config(format!(
                "convolution of {n} and {m} samples doesn't fit fft size {}", self.fft.size()
            )));
        }
        Ok(())
    }
}

/// Fast convolution, output has `N + M - 1` samples at the signal's rate
pub fn convolve(signal: &DiscreteSignal, kernel: &DiscreteSignal) -> Result<DiscreteSignal> {
    let samples = convolve_samples(signal.samples(), kernel.samples())?;
    DiscreteSignal::new(signal.sampling_rate(), samples)
}

pub fn convolve_samples(a: &[Float], b: &[Float]) -> Result<Vec<Float>> {
    if a.is_empty() || b.is_empty() {
        return Ok(vec![]);
    }
    let mut out = vec![0.0; a.len() + b.len() - 1];
    Convolver::for_lengths(a.len(), b.len())?.convolve(a, b, &mut out)?;
    Ok(out)
}

/// Cross-correlation (convolution with the time-reversed kernel)
pub fn cross_correlate(signal: &DiscreteSignal, kernel: &DiscreteSignal) -> Result<DiscreteSignal> {
    let (a, b) = (signal.samples(), kernel.samples());
    if a.is_empty() || b.is_empty() {
        return DiscreteSignal::new(signal.sampling_rate(), vec![]);
    }
    let mut out = vec![0.0; a.len() + b.len() - 1];
    Convolver::for_lengths(a.len(), b.len())?.cross_correlate(a, b, &mut out)?;
    DiscreteSignal::new(signal.sampling_rate(), out)
}

/// Undo a convolution: find x such that `x * kernel ~= signal`.
///
/// Exact polynomial division is tried first. If it leaves a remainder that
/// isn't numerically zero (or the kernel starts with zero), the quotient
/// comes from spectral division instead; see `deconvolve_spectral`.
/// Output has `N - M + 1` samples.
pub fn deconvolve(signal: &DiscreteSignal, kernel: &DiscreteSignal) -> Result<DiscreteSignal> {
    check_deconvolution(signal, kernel)?;
    let dividend: Vec<f64> = signal.samples().iter().map(|&v| v as f64).collect();
    let divisor: Vec<f64> = kernel.samples().iter().map(|&v| v as f64).collect();

    match polynomial::divide(&dividend, &divisor) {
        Ok((quotient, remainder)) => {
            let residual: f64 = remainder.iter().map(|r| r * r).sum();
            let total: f64 = dividend.iter().map(|v| v * v).sum();
            if residual <= EXACT_REMAINDER_TOLERANCE * total.max(f64::MIN_POSITIVE) {
                let samples = quotient.into_iter().map(|q| q as Float).collect();
                return DiscreteSignal::new(signal.sampling_rate(), samples);
            }
            log::debug!("deconvolution remainder energy {residual:e}, using spectral division");
        }
        Err(e) => log::debug!("polynomial deconvolution failed ({e}), using spectral division"),
    }
    deconvolve_spectral(signal, kernel)
}

/// Deconvolution by spectral division,
/// X = (FFT(signal) + eps) / (FFT(kernel) + eps), eps = `DECONVOLUTION_EPSILON`.
///
/// The result is approximate; callers should check the residual
/// `signal - convolve(result, kernel)` themselves.
pub fn deconvolve_spectral(signal: &DiscreteSignal, kernel: &DiscreteSignal) -> Result<DiscreteSignal> {
    check_deconvolution(signal, kernel)?;
    let n = signal.len();
    let size = n.max(2).next_power_of_two();
    let mut fft = Fft::<f64>::new(size)?;

    let mut sre: Vec<f64> = signal.samples().iter().map(|&v| v as f64).collect();
    let mut sim = vec![0.0; size];
    sre.resize(size, 0.0);
    fft.direct(&mut sre, &mut sim);

    let mut kre: Vec<f64> = kernel.samples().iter().map(|&v| v as f64).collect();
    let mut kim = vec![0.0; size];
    kre.resize(size, 0.0);
    fft.direct(&mut kre, &mut kim);

    for k in 0..size {
        let num = C64::new(sre[k] + DECONVOLUTION_EPSILON, sim[k]);
        let den = C64::new(kre[k] + DECONVOLUTION_EPSILON, kim[k]);
        let q = num / den;
        sre[k] = q.re;
        sim[k] = q.im;
    }
    fft.inverse_norm(&mut sre, &mut sim);

    let samples = sre[..n - kernel.len() + 1].iter().map(|&v| v as Float).collect();
    DiscreteSignal::new(signal.sampling_rate(), samples)
}

fn check_deconvolution(signal: &DiscreteSignal, kernel: &DiscreteSignal) -> Result<()> {
    if kernel.is_empty() || kernel.len() > signal.len() {
        return Err(DspError::config(format!(
            "can't deconvolve {} samples by a kernel of {}", signal.len(), kernel.len()
        )));
    }
    if kernel.samples().iter().all(|&v| v == 0.0) {
        return Err(DspError::degenerate("deconvolution kernel has zero energy"));
    }
    Ok(())
}

/// Fast convolution of complex signals, `N + M - 1` samples
pub fn convolve_complex(
    signal: &ComplexDiscreteSignal,
    kernel: &ComplexDiscreteSignal,
) -> Result<ComplexDiscreteSignal> {
    complex_product(signal, &kernel.to_complex())
}

/// Complex cross-correlation: convolution with the reversed, conjugated kernel
pub fn cross_correlate_complex(
    signal: &ComplexDiscreteSignal,
    kernel: &ComplexDiscreteSignal,
) -> Result<ComplexDiscreteSignal> {
    let reversed: Vec<C64> = kernel.to_complex().into_iter().rev().map(|z| z.conj()).collect();
    complex_product(signal, &reversed)
}

fn complex_product(signal: &ComplexDiscreteSignal, kernel: &[C64]) -> Result<ComplexDiscreteSignal> {
    let fs = signal.sampling_rate();
    if signal.is_empty() || kernel.is_empty() {
        return ComplexDiscreteSignal::new(fs, vec![], vec![]);
    }
    let len = signal.len() + kernel.len() - 1;
    let size = len.max(2).next_power_of_two();
    let mut fft = Fft::<f64>::new(size)?;

    let mut a = signal.to_complex();
    a.resize(size, C64::new(0.0, 0.0));
    let mut b = kernel.to_vec();
    b.resize(size, C64::new(0.0, 0.0));
    fft.direct_complex(&mut a);
    fft.direct_complex(&mut b);
    for (x, y) in a.iter_mut().zip(b.iter()) {
        *x *= *y;
    }
    fft.inverse_complex(&mut a);

    let scale = 1.0 / size as f64;
    let values: Vec<C64> = a[..len].iter().map(|&z| z * scale).collect();
    ComplexDiscreteSignal::from_complex(fs, &values)
}
