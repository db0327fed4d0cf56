use std::ops::{Index, IndexMut};

use crate::error::{DspError, Result};
use crate::utils::{self, Float, C64};

pub type SampleRate = u32;

/* DiscreteSignal: mono real-valued signal tagged with a sample rate.
 * Samples vector is owned by this object.
 *
 * Length is fixed once constructed, but contents are mutable in place.
 * Offline operations below always return a new signal;
 * the in-place ones say so in their name (`amplify`, `attenuate`, ...).
 */
#[derive(Debug, Clone, PartialEq)]
pub struct DiscreteSignal {
    samples: Vec<Float>,
    fs: SampleRate,
}

impl DiscreteSignal {
    // constructor
    pub fn new(fs: SampleRate, samples: Vec<Float>) -> Result<Self> {
        if fs == 0 {
            return Err(DspError::config("sampling rate must be positive"));
        }
        Ok(Self { samples, fs })
    }

    // signal of `len` zeros
    pub fn zeros(fs: SampleRate, len: usize) -> Result<Self> {
        Self::new(fs, vec![0.0; len])
    }

    // signal of `len` copies of `value`
    pub fn constant(fs: SampleRate, len: usize, value: Float) -> Result<Self> {
        Self::new(fs, vec![value; len])
    }

    // unit impulse at index 0
    pub fn unit_impulse(fs: SampleRate, len: usize) -> Result<Self> {
        let mut sig = Self::zeros(fs, len)?;
        if let Some(first) = sig.samples.first_mut() {
            *first = 1.0;
        }
        Ok(sig)
    }

    // sample rate (hz)
    pub fn sampling_rate(&self) -> SampleRate {
        self.fs
    }

    // reference to internal samples
    pub fn samples(&self) -> &[Float] {
        &self.samples
    }

    // mutable ref to internal samples (length can't change)
    pub fn samples_mut(&mut self) -> &mut [Float] {
        &mut self.samples
    }

    pub fn into_samples(self) -> Vec<Float> {
        self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    // duration in seconds
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.fs as f64
    }

    pub fn energy(&self) -> f64 {
        self.samples.iter().map(|&x| (x as f64) * (x as f64)).sum()
    }

    pub fn rms(&self) -> f64 {
        utils::rms::<_, f64>(&self.samples)
    }

    // multiply every sample by `gain` (in place)
    pub fn amplify(&mut self, gain: Float) {
        utils::vec_scale_inplace(&mut self.samples, gain);
    }

    // divide every sample by `factor` (in place)
    pub fn attenuate(&mut self, factor: Float) -> Result<()> {
        if factor.abs() < Float::EPSILON {
            return Err(DspError::degenerate("attenuation factor is zero"));
        }
        self.amplify(1.0 / factor);
        Ok(())
    }

    // copy of samples [start, end)
    pub fn slice(&self, start: usize, end: usize) -> Result<Self> {
        if start > end || end > self.len() {
            return Err(DspError::config(format!(
                "slice [{start}, {end}) is out of bounds for length {}", self.len()
            )));
        }
        Self::new(self.fs, self.samples[start..end].to_vec())
    }

    pub fn first(&self, n: usize) -> Self {
        let n = n.min(self.len());
        Self { samples: self.samples[..n].to_vec(), fs: self.fs }
    }

    pub fn last(&self, n: usize) -> Self {
        let n = n.min(self.len());
        Self { samples: self.samples[self.len() - n..].to_vec(), fs: self.fs }
    }

    pub fn reversed(&self) -> Self {
        let mut samples = self.samples.clone();
        samples.reverse();
        Self { samples, fs: self.fs }
    }

    // prepend `n` zeros
    pub fn delay(&self, n: usize) -> Self {
        let mut samples = vec![0.0; n + self.len()];
        samples[n..].copy_from_slice(&self.samples);
        Self { samples, fs: self.fs }
    }

    pub fn repeat(&self, times: usize) -> Self {
        Self { samples: self.samples.repeat(times), fs: self.fs }
    }

    // append another signal of the same rate
    pub fn concatenate(&self, other: &Self) -> Result<Self> {
        self.check_rate(other)?;
        let mut samples = Vec::with_capacity(self.len() + other.len());
        samples.extend_from_slice(&self.samples);
        samples.extend_from_slice(&other.samples);
        Ok(Self { samples, fs: self.fs })
    }

    // sample-wise sum; output length is the max length of either input
    pub fn superimpose(&self, other: &Self) -> Result<Self> {
        self.check_rate(other)?;
        Ok(Self { samples: utils::vec_add(&self.samples, &other.samples), fs: self.fs })
    }

    // sample-wise difference; output length is the max length of either input
    pub fn subtract(&self, other: &Self) -> Result<Self> {
        self.check_rate(other)?;
        let negated: Vec<Float> = other.samples.iter().map(|x| -x).collect();
        Ok(Self { samples: utils::vec_add(&self.samples, &negated), fs: self.fs })
    }

    fn check_rate(&self, other: &Self) -> Result<()> {
        if self.fs != other.fs {
            return Err(DspError::config(format!(
                "sampling rates differ: {} vs {}", self.fs, other.fs
            )));
        }
        Ok(())
    }
}

impl Index<usize> for DiscreteSignal {
    type Output = Float;

    fn index(&self, i: usize) -> &Float {
        &self.samples[i]
    }
}

impl IndexMut<usize> for DiscreteSignal {
    fn index_mut(&mut self, i: usize) -> &mut Float {
        &mut self.samples[i]
    }
}

/* ComplexDiscreteSignal: parallel real/imaginary arrays sharing one sample rate.
 * Used for analytic signals, spectra and frequency responses.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct ComplexDiscreteSignal {
    real: Vec<f64>,
    imag: Vec<f64>,
    fs: SampleRate,
}

impl ComplexDiscreteSignal {
    pub fn new(fs: SampleRate, real: Vec<f64>, imag: Vec<f64>) -> Result<Self> {
        if fs == 0 {
            return Err(DspError::config("sampling rate must be positive"));
        }
        if real.len() != imag.len() {
            return Err(DspError::config(format!(
                "real and imaginary parts differ in length: {} vs {}", real.len(), imag.len()
            )));
        }
        Ok(Self { real, imag, fs })
    }

    // purely real complex signal
    pub fn from_real(signal: &DiscreteSignal) -> Self {
        let real = signal.samples().iter().map(|&x| x as f64).collect::<Vec<_>>();
        let imag = vec![0.0; real.len()];
        Self { real, imag, fs: signal.sampling_rate() }
    }

    pub fn from_complex(fs: SampleRate, values: &[C64]) -> Result<Self> {
        let real = values.iter().map(|z| z.re).collect();
        let imag = values.iter().map(|z| z.im).collect();
        Self::new(fs, real, imag)
    }

    pub fn sampling_rate(&self) -> SampleRate {
        self.fs
    }

    pub fn real(&self) -> &[f64] {
        &self.real
    }

    pub fn imag(&self) -> &[f64] {
        &self.imag
    }

    pub fn len(&self) -> usize {
        self.real.len()
    }

    pub fn is_empty(&self) -> bool {
        self.real.is_empty()
    }

    pub fn to_complex(&self) -> Vec<C64> {
        self.real.iter().zip(&self.imag).map(|(&re, &im)| C64::new(re, im)).collect()
    }

    pub fn magnitude(&self) -> Vec<f64> {
        self.real.iter().zip(&self.imag).map(|(re, im)| re.hypot(*im)).collect()
    }

    pub fn power(&self) -> Vec<f64> {
        self.real.iter().zip(&self.imag).map(|(re, im)| re * re + im * im).collect()
    }

    pub fn phase(&self) -> Vec<f64> {
        self.real.iter().zip(&self.imag).map(|(re, im)| im.atan2(*re)).collect()
    }

    // phase with 2pi jumps removed
    pub fn phase_unwrapped(&self) -> Vec<f64> {
        utils::unwrap_phase(&self.phase(), std::f64::consts::PI)
    }

    // real part as a regular signal (lossy: f64 -> f32)
    pub fn to_real(&self) -> DiscreteSignal {
        DiscreteSignal {
            samples: self.real.iter().map(|&x| x as Float).collect(),
            fs: self.fs,
        }
    }
}
