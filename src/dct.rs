use std::f64::consts::PI;

use rustfft::num_complex::Complex;

use crate::error::{DspError, Result};
use crate::fft::Fft;
use crate::utils::Float;

/* Dct2: DCT-II of a fixed size, computed through an N-point complex FFT
 * (even/odd reordering, then a quarter-sample twiddle).
 *
 * BORING MATH:
 *   X[k] = sum{n: 0->N-1}( x[n] cos(pi k (2n+1) / 2N) )
 * reorder v[n] = x[2n], v[N-1-n] = x[2n+1], V = FFT(v), then
 *   X[k] = Re[ exp(-j pi k / 2N) V[k] ]
 * The inverse runs the same steps backwards, using
 *   V[k] = exp(j pi k / 2N) (X[k] - j X[N-k]),  X[N] = 0
 */
#[derive(Debug, Clone)]
pub struct Dct2 {
    size: usize,
    fft: Fft<f64>,
    twiddles: Vec<Complex<f64>>,
    buf: Vec<Complex<f64>>,
}

impl Dct2 {
    pub fn new(size: usize) -> Result<Self> {
        if size < 2 {
            return Err(DspError::config("dct size must be at least 2"));
        }
        let fft = Fft::new(size)?;
        let twiddles = (0..size)
            .map(|k| Complex::from_polar(1.0, -PI * k as f64 / (2 * size) as f64))
            .collect();
        Ok(Self { size, fft, twiddles, buf: vec![Complex::new(0.0, 0.0); size] })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    // unnormalized DCT-II
    pub fn direct(&mut self, input: &[Float], output: &mut [Float]) -> Result<()> {
        self.check_lengths(input.len(), output.len())?;
        let n = self.size;
        for i in 0..n / 2 {
            self.buf[i] = Complex::new(input[2 * i] as f64, 0.0);
            self.buf[n - 1 - i] = Complex::new(input[2 * i + 1] as f64, 0.0);
        }
        self.fft.direct_complex(&mut self.buf);
        for (k, out) in output.iter_mut().enumerate() {
            *out = (self.twiddles[k] * self.buf[k]).re as Float;
        }
        Ok(())
    }

    // orthonormal DCT-II (energy preserving)
    pub fn direct_norm(&mut self, input: &[Float], output: &mut [Float]) -> Result<()> {
        self.direct(input, output)?;
        let n = self.size as f64;
        output[0] *= (1.0 / n).sqrt() as Float;
        let scale = (2.0 / n).sqrt() as Float;
        for x in output[1..].iter_mut() {
            *x *= scale;
        }
        Ok(())
    }

    // exact inverse of `direct` (a scaled DCT-III)
    pub fn inverse(&mut self, input: &[Float], output: &mut [Float]) -> Result<()> {
        self.check_lengths(input.len(), output.len())?;
        let n = self.size;
        for k in 0..n {
            let xk = input[k] as f64;
            let xnk = if k == 0 { 0.0 } else { input[n - k] as f64 };
            self.buf[k] = self.twiddles[k].conj() * Complex::new(xk, -xnk);
        }
        self.fft.inverse_complex(&mut self.buf);
        let scale = 1.0 / n as f64;
        for i in 0..n / 2 {
            output[2 * i] = (self.buf[i].re * scale) as Float;
            output[2 * i + 1] = (self.buf[n - 1 - i].re * scale) as Float;
        }
        Ok(())
    }

    fn check_lengths(&self, input: usize, output: usize) -> Result<()> {
        if input != self.size || output != self.size {
            return Err(DspError::config(format!(
                "dct of size {} got input {input} / output {output}", self.size
            )));
        }
        Ok(())
    }
}
