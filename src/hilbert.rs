use crate::error::{DspError, Result};
use crate::fft::Fft;
use crate::signal::{ComplexDiscreteSignal, DiscreteSignal};
use crate::utils::Float;

/* HilbertTransform: FFT-based analytic signal of a fixed-size block.
 *
 * The negative half of the spectrum is zeroed and the positive half doubled;
 * the imaginary part of the inverse transform is the Hilbert transform
 * (quadrature component) of the input.
 */
#[derive(Debug, Clone)]
pub struct HilbertTransform {
    fft: Fft<f64>,
    re: Vec<f64>,
    im: Vec<f64>,
}

impl HilbertTransform {
    pub fn new(size: usize) -> Result<Self> {
        let fft = Fft::new(size)?;
        Ok(Self { fft, re: vec![0.0; size], im: vec![0.0; size] })
    }

    pub fn size(&self) -> usize {
        self.fft.size()
    }

    // analytic signal x + j H{x} of (zero-padded) `signal`
    pub fn analytic_signal(&mut self, signal: &DiscreteSignal) -> Result<ComplexDiscreteSignal> {
        self.check_len(signal.len())?;
        self.transform(signal.samples());
        ComplexDiscreteSignal::new(signal.sampling_rate(), self.re.clone(), self.im.clone())
    }

    // Hilbert transform H{x} only
    pub fn direct(&mut self, input: &[Float], output: &mut [Float]) -> Result<()> {
        self.check_len(input.len())?;
        self.transform(input);
        for (o, &v) in output.iter_mut().zip(self.im.iter()) {
            *o = v as Float;
        }
        Ok(())
    }

    fn transform(&mut self, input: &[Float]) {
        let n = self.fft.size();
        for i in 0..n {
            self.re[i] = input.get(i).map_or(0.0, |&x| x as f64);
            self.im[i] = 0.0;
        }
        self.fft.direct(&mut self.re, &mut self.im);

        // keep DC and Nyquist, double positive bins, drop negative bins
        for k in 1..n {
            let gain = if k < (n + 1) / 2 { 2.0 } else if 2 * k == n { 1.0 } else { 0.0 };
            self.re[k] *= gain;
            self.im[k] *= gain;
        }
        self.fft.inverse_norm(&mut self.re, &mut self.im);
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len > self.fft.size() {
            return Err(DspError::config(format!(
                "input of {len} samples exceeds hilbert transform size {}", self.fft.size()
            )));
        }
        Ok(())
    }
}
