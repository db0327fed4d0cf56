// std lib imports
use std::fmt;
use std::sync::Arc;
// external crates
use num_traits::Float as NumFloat;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use rustfft::{num_complex::Complex, FftNum, FftPlanner};
// local crates
use crate::error::Result;
use crate::utils::check_power_of_two;

/* Fft: complex FFT of a fixed power-of-two size.
 *
 * Plans are made once at construction, and the scratch buffers are owned by
 * the instance, so `direct`/`inverse` never allocate.
 * `inverse` is unnormalized (result is scaled by `size`), `inverse_norm` isn't.
 */
pub struct Fft<T: FftNum> {
    size: usize,
    forward: Arc<dyn rustfft::Fft<T>>,
    backward: Arc<dyn rustfft::Fft<T>>,
    buf: Vec<Complex<T>>,
    scratch: Vec<Complex<T>>,
}

impl<T: FftNum + NumFloat> Fft<T> {
    pub fn new(size: usize) -> Result<Self> {
        check_power_of_two("fft size", size)?;
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(size);
        let backward = planner.plan_fft_inverse(size);
        let scratch_len = forward.get_inplace_scratch_len().max(backward.get_inplace_scratch_len());
        Ok(Self {
            size,
            forward,
            backward,
            buf: vec![Complex::new(T::zero(), T::zero()); size],
            scratch: vec![Complex::new(T::zero(), T::zero()); scratch_len],
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    // in-place forward transform of an interleaved complex buffer
    pub fn direct_complex(&mut self, data: &mut [Complex<T>]) {
        self.forward.process_with_scratch(data, &mut self.scratch);
    }

    // in-place inverse transform (unnormalized)
    pub fn inverse_complex(&mut self, data: &mut [Complex<T>]) {
        self.backward.process_with_scratch(data, &mut self.scratch);
    }

    // forward transform of split real/imag buffers (in place)
    pub fn direct(&mut self, re: &mut [T], im: &mut [T]) {
        self.load(re, im);
        self.forward.process_with_scratch(&mut self.buf, &mut self.scratch);
        self.store(re, im, T::one());
    }

    // inverse transform of split real/imag buffers (in place, unnormalized)
    pub fn inverse(&mut self, re: &mut [T], im: &mut [T]) {
        self.load(re, im);
        self.backward.process_with_scratch(&mut self.buf, &mut self.scratch);
        self.store(re, im, T::one());
    }

    // inverse transform scaled by 1/size
    pub fn inverse_norm(&mut self, re: &mut [T], im: &mut [T]) {
        self.load(re, im);
        self.backward.process_with_scratch(&mut self.buf, &mut self.scratch);
        let scale = T::one() / T::from(self.size).unwrap_or(T::one());
        self.store(re, im, scale);
    }

    // copy (zero-padded / truncated) inputs into the interleaved buffer
    fn load(&mut self, re: &[T], im: &[T]) {
        for (i, z) in self.buf.iter_mut().enumerate() {
            let r = re.get(i).copied().unwrap_or(T::zero());
            let j = im.get(i).copied().unwrap_or(T::zero());
            *z = Complex::new(r, j);
        }
    }

    fn store(&self, re: &mut [T], im: &mut [T], scale: T) {
        for (i, z) in self.buf.iter().enumerate() {
            if let Some(r) = re.get_mut(i) {
                *r = z.re * scale;
            }
            if let Some(j) = im.get_mut(i) {
                *j = z.im * scale;
            }
        }
    }

    /// Magnitude spectrum (`size/2 + 1` bins) of real `samples`.
    ///
    /// Samples are zero-padded or truncated to the FFT size.
    /// With `normalize` the magnitudes are divided by the FFT size.
    pub fn magnitude_spectrum(&mut self, samples: &[T], normalize: bool) -> Vec<T> {
        let n = self.size;
        for (i, z) in self.buf.iter_mut().enumerate() {
            *z = Complex::new(samples.get(i).copied().unwrap_or(T::zero()), T::zero());
        }
        self.forward.process_with_scratch(&mut self.buf, &mut self.scratch);
        let scale = if normalize { T::one() / T::from(n).unwrap_or(T::one()) } else { T::one() };
        self.buf[..n / 2 + 1].iter().map(|z| z.norm() * scale).collect()
    }

    /// Power spectrum (`size/2 + 1` bins) of real `samples`.
    pub fn power_spectrum(&mut self, samples: &[T], normalize: bool) -> Vec<T> {
        self.magnitude_spectrum(samples, normalize)
            .into_iter()
            .map(|m| m * m)
            .collect()
    }
}

impl<T: FftNum> fmt::Debug for Fft<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fft").field("size", &self.size).finish()
    }
}

impl<T: FftNum + NumFloat> Clone for Fft<T> {
    // plans are immutable and shared; scratch space is not
    fn clone(&self) -> Self {
        Self {
            size: self.size,
            forward: Arc::clone(&self.forward),
            backward: Arc::clone(&self.backward),
            buf: self.buf.clone(),
            scratch: self.scratch.clone(),
        }
    }
}

/* RealFft: FFT of a real signal of power-of-two size N into N/2+1 complex bins
 * (split into real and imaginary arrays), and back.
 *
 * Like Fft, every buffer lives inside the instance.
 */
pub struct RealFft<T: FftNum> {
    size: usize,
    r2c: Arc<dyn RealToComplex<T>>,
    c2r: Arc<dyn ComplexToReal<T>>,
    real_buf: Vec<T>,
    spectrum: Vec<Complex<T>>,
    scratch: Vec<Complex<T>>,
}

impl<T: FftNum + NumFloat> RealFft<T> {
    pub fn new(size: usize) -> Result<Self> {
        check_power_of_two("real fft size", size)?;
        let mut planner = RealFftPlanner::<T>::new();
        let r2c = planner.plan_fft_forward(size);
        let c2r = planner.plan_fft_inverse(size);
        let scratch_len = r2c.get_scratch_len().max(c2r.get_scratch_len());
        Ok(Self {
            size,
            real_buf: r2c.make_input_vec(),
            spectrum: r2c.make_output_vec(),
            scratch: vec![Complex::new(T::zero(), T::zero()); scratch_len],
            r2c,
            c2r,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    // number of complex output bins
    pub fn bins(&self) -> usize {
        self.size / 2 + 1
    }

    /// Forward transform: `input` is zero-padded/truncated to the FFT size,
    /// `re`/`im` receive (up to) `size/2 + 1` bins.
    pub fn direct(&mut self, input: &[T], re: &mut [T], im: &mut [T]) {
        for (i, x) in self.real_buf.iter_mut().enumerate() {
            *x = input.get(i).copied().unwrap_or(T::zero());
        }
        // lengths always match the plan
        let result = self.r2c.process_with_scratch(&mut self.real_buf, &mut self.spectrum, &mut self.scratch);
        debug_assert!(result.is_ok(), "forward real fft failed: {result:?}");
        for (i, z) in self.spectrum.iter().enumerate() {
            if let Some(r) = re.get_mut(i) {
                *r = z.re;
            }
            if let Some(j) = im.get_mut(i) {
                *j = z.im;
            }
        }
    }

    /// Inverse transform of `size/2 + 1` bins into `output` (unnormalized:
    /// result is scaled by `size`).
    ///
    /// The imaginary parts of the DC and Nyquist bins are ignored.
    pub fn inverse(&mut self, re: &[T], im: &[T], output: &mut [T]) {
        let last = self.spectrum.len() - 1;
        for (i, z) in self.spectrum.iter_mut().enumerate() {
            let r = re.get(i).copied().unwrap_or(T::zero());
            let j = if i == 0 || i == last { T::zero() } else { im.get(i).copied().unwrap_or(T::zero()) };
            *z = Complex::new(r, j);
        }
        // lengths match the plan and the DC/Nyquist imaginary parts are zeroed
        let result = self.c2r.process_with_scratch(&mut self.spectrum, &mut self.real_buf, &mut self.scratch);
        debug_assert!(result.is_ok(), "inverse real fft failed: {result:?}");
        for (o, x) in output.iter_mut().zip(self.real_buf.iter()) {
            *o = *x;
        }
    }
}

impl<T: FftNum> fmt::Debug for RealFft<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealFft").field("size", &self.size).finish()
    }
}

impl<T: FftNum + NumFloat> Clone for RealFft<T> {
    fn clone(&self) -> Self {
        Self {
            size: self.size,
            r2c: Arc::clone(&self.r2c),
            c2r: Arc::clone(&self.c2r),
            real_buf: self.real_buf.clone(),
            spectrum: self.spectrum.clone(),
            scratch: self.scratch.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use crate::error::DspError;

    #[test]
    fn test_non_power_of_two_rejected() {
        assert!(matches!(Fft::<f32>::new(100), Err(DspError::Configuration(_))));
        assert!(matches!(RealFft::<f64>::new(0), Err(DspError::Configuration(_))));
    }

    #[test]
    fn test_fft_roundtrip() {
        let mut fft = Fft::<f64>::new(8).unwrap();
        let x = [1.0, -2.0, 3.0, 0.5, 0.0, 1.5, -1.0, 2.0];
        let mut re = x.to_vec();
        let mut im = vec![0.0; 8];
        fft.direct(&mut re, &mut im);
        // DC bin = sum of samples
        assert_abs_diff_eq!(re[0], x.iter().sum::<f64>(), epsilon = 1e-12);
        fft.inverse_norm(&mut re, &mut im);
        assert_abs_diff_eq!(re[..], x[..], epsilon = 1e-12);
        assert_abs_diff_eq!(im[..], [0.0; 8][..], epsilon = 1e-12);
    }

    #[test]
    fn test_real_fft_matches_complex_fft() {
        let x: Vec<f64> = (0..16).map(|i| (i as f64 * 0.3).sin() + 0.1 * i as f64).collect();
        let mut fft = Fft::<f64>::new(16).unwrap();
        let mut re = x.clone();
        let mut im = vec![0.0; 16];
        fft.direct(&mut re, &mut im);

        let mut rfft = RealFft::<f64>::new(16).unwrap();
        let mut rre = vec![0.0; 9];
        let mut rim = vec![0.0; 9];
        rfft.direct(&x, &mut rre, &mut rim);
        assert_abs_diff_eq!(rre[..], re[..9], epsilon = 1e-10);
        assert_abs_diff_eq!(rim[..], im[..9], epsilon = 1e-10);

        let mut back = vec![0.0; 16];
        rfft.inverse(&rre, &rim, &mut back);
        let back: Vec<f64> = back.iter().map(|v| v / 16.0).collect();
        assert_abs_diff_eq!(back[..], x[..], epsilon = 1e-10);
    }

    #[test]
    fn test_magnitude_spectrum_of_sinusoid() {
        let n = 64;
        let x: Vec<f32> = (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * 4.0 * i as f32 / n as f32).cos())
            .collect();
        let mut fft = Fft::<f32>::new(n).unwrap();
        let mag = fft.magnitude_spectrum(&x, true);
        assert_eq!(mag.len(), n / 2 + 1);
        assert_abs_diff_eq!(mag[4], 0.5, epsilon = 1e-5);
        assert_abs_diff_eq!(mag[5], 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_real_inverse_ignores_edge_imaginary_parts() {
        // realfft rejects these; they must be dropped before the transform
        let mut rfft = RealFft::<f32>::new(8).unwrap();
        let re = [8.0, 0.0, 0.0, 0.0, 0.0];
        let im = [3.0, 0.0, 0.0, 0.0, -2.0];
        let mut out = [0.0; 8];
        rfft.inverse(&re, &im, &mut out);
        assert_abs_diff_eq!(out[..], [8.0; 8][..], epsilon = 1e-5);

        // short input is zero-padded
        let mut re = [0.0; 5];
        let mut im = [0.0; 5];
        rfft.direct(&[1.0, 1.0], &mut re, &mut im);
        assert_abs_diff_eq!(re[0], 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(re[4], 0.0, epsilon = 1e-6);
    }
}
