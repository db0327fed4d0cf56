//!
//! Streaming FFT convolution with long kernels.
//!
//! Both convolvers take one sample at a time, run an FFT block every
//! `hop_size` samples and have a constant latency of `hop_size` samples.
//!
use rustfft::num_complex::Complex;

use crate::error::{DspError, Result};
use crate::fft::RealFft;
use crate::filters::{filter_with_kernel, Filter, FilteringMethod, LtiFilter};
use crate::signal::DiscreteSignal;
use crate::transfer_function::TransferFunction;
use crate::utils::Float;

/* Kernel spectrum plus the scratch needed to convolve one block with it.
 *
 * conv = IFFT( FFT(block) H ) / N
 */
#[derive(Debug, Clone)]
struct BlockKernel {
    kernel: Vec<Float>,
    tf: TransferFunction,
    fft: RealFft<Float>,
    h_re: Vec<Float>,
    h_im: Vec<Float>,
    re: Vec<Float>,
    im: Vec<Float>,
    conv: Vec<Float>,
}

impl BlockKernel {
    fn new(kernel: Vec<Float>, fft_size: Option<usize>) -> Result<Self> {
        let m = kernel.len();
        if m == 0 {
            return Err(DspError::config("block convolution kernel can't be empty"));
        }
        let fft_size = fft_size.unwrap_or_else(|| (4 * m).max(8).next_power_of_two());
        // hop = fft_size - m + 1 must cover the m - 1 tail samples
        if fft_size + 2 < 2 * m {
            return Err(DspError::config(format!(
                "fft size {fft_size} is too small for a kernel of {m} taps (needs at least {})",
                2 * m - 2
            )));
        }
        let tf = TransferFunction::fir(kernel.iter().map(|&b| b as f64).collect())?;
        let mut fft = RealFft::new(fft_size)?;
        let bins = fft.bins();
        let mut h_re = vec![0.0; bins];
        let mut h_im = vec![0.0; bins];
        fft.direct(&kernel, &mut h_re, &mut h_im);
        Ok(Self {
            kernel,
            tf,
            fft,
            h_re,
            h_im,
            re: vec![0.0; bins],
            im: vec![0.0; bins],
            conv: vec![0.0; fft_size],
        })
    }

    fn fft_size(&self) -> usize {
        self.fft.size()
    }

    fn hop_size(&self) -> usize {
        self.fft.size() - self.kernel.len() + 1
    }

    // circular convolution of `block` (zero-padded) with the kernel, into self.conv
    fn convolve(&mut self, block: &[Float]) {
        self.fft.direct(block, &mut self.re, &mut self.im);
        for k in 0..self.re.len() {
            let z = Complex::new(self.re[k], self.im[k]) * Complex::new(self.h_re[k], self.h_im[k]);
            self.re[k] = z.re;
            self.im[k] = z.im;
        }
        self.fft.inverse(&self.re, &self.im, &mut self.conv);
        let scale = 1.0 / self.fft.size() as Float;
        for v in self.conv.iter_mut() {
            *v *= scale;
        }
    }
}

// feed the signal plus `latency` zeros through a fresh filter, drop the latency
fn run_offline<F: Filter>(filter: &mut F, input: &[Float], latency: usize) -> Vec<Float> {
    filter.reset();
    let mut out = Vec::with_capacity(input.len());
    for (i, &x) in input.iter().chain(std::iter::repeat(&0.0).take(latency)).enumerate() {
        let y = filter.process(x);
        if i >= latency {
            out.push(y);
        }
    }
    out
}

/* OlaBlockConvolver: overlap-add
 *
 * Input is cut into non-overlapping blocks of `hop` samples. Each block is
 * zero-padded to the FFT size and convolved with the kernel; the first `hop`
 * samples of the result (plus the tail saved from the previous block) are the
 * next `hop` output samples, the remaining `M - 1` samples become the new tail.
 */
#[derive(Debug, Clone)]
pub struct OlaBlockConvolver {
    core: BlockKernel,
    block: Vec<Float>,
    output: Vec<Float>,
    tail: Vec<Float>,
    pos: usize,
}

impl OlaBlockConvolver {
    /// `fft_size` defaults to the power of two above 4x the kernel length,
    /// and must be at least `2 (M - 1)`.
    pub fn new(kernel: Vec<Float>, fft_size: Option<usize>) -> Result<Self> {
        let core = BlockKernel::new(kernel, fft_size)?;
        let hop = core.hop_size();
        let tail_len = core.kernel.len() - 1;
        Ok(Self {
            core,
            block: vec![0.0; hop],
            output: vec![0.0; hop],
            tail: vec![0.0; tail_len],
            pos: 0,
        })
    }

    pub fn fft_size(&self) -> usize {
        self.core.fft_size()
    }

    pub fn hop_size(&self) -> usize {
        self.core.hop_size()
    }

    // samples between an input and its filtered output
    pub fn latency(&self) -> usize {
        self.hop_size()
    }

    pub fn kernel(&self) -> &[Float] {
        &self.core.kernel
    }

    fn process_block(&mut self) {
        let hop = self.block.len();
        self.core.convolve(&self.block);
        for (i, out) in self.output.iter_mut().enumerate() {
            *out = self.core.conv[i] + self.tail.get(i).copied().unwrap_or(0.0);
        }
        // tail is never longer than hop
        let tail_len = self.tail.len();
        self.tail.copy_from_slice(&self.core.conv[hop..hop + tail_len]);
    }

    /// Filter a whole buffer from a fresh state, latency removed
    pub fn filter_offline(&self, input: &[Float]) -> Vec<Float> {
        let mut fresh = self.clone();
        run_offline(&mut fresh, input, self.latency())
    }
}

impl Filter for OlaBlockConvolver {
    fn process(&mut self, sample: Float) -> Float {
        self.block[self.pos] = sample;
        let y = self.output[self.pos];
        self.pos += 1;
        if self.pos == self.block.len() {
            self.process_block();
            self.pos = 0;
        }
        y
    }

    fn reset(&mut self) {
        self.block.fill(0.0);
        self.output.fill(0.0);
        self.tail.fill(0.0);
        self.pos = 0;
    }

    fn apply_to(&self, signal: &DiscreteSignal, method: FilteringMethod) -> Result<DiscreteSignal> {
        match method {
            FilteringMethod::Auto | FilteringMethod::OverlapAdd => {
                DiscreteSignal::new(signal.sampling_rate(), self.filter_offline(signal.samples()))
            }
            _ => filter_with_kernel(&self.core.kernel, signal, method),
        }
    }
}

impl LtiFilter for OlaBlockConvolver {
    fn transfer_function(&self) -> TransferFunction {
        self.core.tf.clone()
    }
}

/* OlsBlockConvolver: overlap-save
 *
 * A window of the last `fft_size` inputs (the M - 1 newest ones from the
 * previous block followed by `hop` new samples) is circularly convolved with
 * the kernel; the last `hop` samples of the result are free of wrap-around
 * and become the next output block.
 */
#[derive(Debug, Clone)]
pub struct OlsBlockConvolver {
    core: BlockKernel,
    frame: Vec<Float>,
    output: Vec<Float>,
    pos: usize,
}

impl OlsBlockConvolver {
    pub fn new(kernel: Vec<Float>, fft_size: Option<usize>) -> Result<Self> {
        let core = BlockKernel::new(kernel, fft_size)?;
        let hop = core.hop_size();
        let size = core.fft_size();
        Ok(Self { core, frame: vec![0.0; size], output: vec![0.0; hop], pos: 0 })
    }

    pub fn fft_size(&self) -> usize {
        self.core.fft_size()
    }

    pub fn hop_size(&self) -> usize {
        self.core.hop_size()
    }

    pub fn latency(&self) -> usize {
        self.hop_size()
    }

    pub fn kernel(&self) -> &[Float] {
        &self.core.kernel
    }

    fn process_block(&mut self) {
        let overlap = self.core.kernel.len() - 1;
        self.core.convolve(&self.frame);
        self.output.copy_from_slice(&self.core.conv[overlap..]);
        // keep the newest M - 1 inputs at the front
        let size = self.frame.len();
        self.frame.copy_within(size - overlap.., 0);
    }

    /// Filter a whole buffer from a fresh state, latency removed
    pub fn filter_offline(&self, input: &[Float]) -> Vec<Float> {
        let mut fresh = self.clone();
        run_offline(&mut fresh, input, self.latency())
    }
}

impl Filter for OlsBlockConvolver {
    fn process(&mut self, sample: Float) -> Float {
        let overlap = self.core.kernel.len() - 1;
        self.frame[overlap + self.pos] = sample;
        let y = self.output[self.pos];
        self.pos += 1;
        if self.pos == self.output.len() {
            self.process_block();
            self.pos = 0;
        }
        y
    }

    fn reset(&mut self) {
        self.frame.fill(0.0);
        self.output.fill(0.0);
        self.pos = 0;
    }

    fn apply_to(&self, signal: &DiscreteSignal, method: FilteringMethod) -> Result<DiscreteSignal> {
        match method {
            FilteringMethod::Auto | FilteringMethod::OverlapSave => {
                DiscreteSignal::new(signal.sampling_rate(), self.filter_offline(signal.samples()))
            }
            _ => filter_with_kernel(&self.core.kernel, signal, method),
        }
    }
}

impl LtiFilter for OlsBlockConvolver {
    fn transfer_function(&self) -> TransferFunction {
        self.core.tf.clone()
    }
}
