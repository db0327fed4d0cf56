//!
//! Streaming STFT analysis / processing / synthesis.
//!
use crate::error::{DspError, Result};
use crate::fft::RealFft;
use crate::filters::{Filter, FilteringMethod};
use crate::signal::DiscreteSignal;
use crate::utils::Float;
use crate::windows::WindowType;

/// The spectral part of an overlap-add effect.
///
/// All four slices hold `fft_size/2 + 1` bins. Output starts zeroed.
pub trait SpectralProcessor {
    fn process_spectrum(&mut self, re: &[Float], im: &[Float], out_re: &mut [Float], out_im: &mut [Float]);

    // drop any state carried between frames
    fn reset(&mut self) {}
}

/* OverlapAddFilter: analysis-process-synthesis loop around a SpectralProcessor
 *
 * Every hop_size input samples, the newest fft_size samples are windowed
 * (periodic Hann), transformed, handed to the processor, transformed back,
 * windowed again and overlap-added into the output accumulator.
 *
 * BORING MATH:
 * With an unnormalized inverse FFT, an untouched spectrum comes back as
 *   sum{frames}( fft_size w^2 x ) = fft_size (sum(w^2) / hop) x
 * for windows whose squares overlap-add to a constant, hence
 *   gain = 1 / (fft_size sum(w^2) / hop)
 *
 * Latency is fft_size samples, not hop_size: an output sample is released
 * only once every frame that covers it has been added, so the first
 * samples are never emitted half-summed. apply_to() removes it.
 */
#[derive(Debug, Clone)]
pub struct OverlapAddFilter<P> {
    processor: P,
    fft_size: usize,
    hop_size: usize,
    fft: RealFft<Float>,
    window: Vec<Float>,
    gain: Float,
    delay_line: Vec<Float>,
    accumulator: Vec<Float>,
    ready: Vec<Float>,
    frame: Vec<Float>,
    re: Vec<Float>,
    im: Vec<Float>,
    out_re: Vec<Float>,
    out_im: Vec<Float>,
    pos: usize,
}

impl<P: SpectralProcessor> OverlapAddFilter<P> {
    pub fn new(processor: P, fft_size: usize, hop_size: usize) -> Result<Self> {
        Self::with_window(processor, fft_size, hop_size, WindowType::Hann)
    }

    pub fn with_window(processor: P, fft_size: usize, hop_size: usize, window: WindowType) -> Result<Self> {
        let fft = RealFft::new(fft_size)?;
        if hop_size == 0 || hop_size >= fft_size {
            return Err(DspError::config(format!(
                "hop size must be in 1..{fft_size}, got {hop_size}"
            )));
        }
        let window = window.periodic(fft_size);
        let energy: Float = window.iter().map(|w| w * w).sum();
        if energy <= 0.0 {
            return Err(DspError::degenerate("analysis window has no energy"));
        }
        let gain = 1.0 / (fft_size as Float * energy / hop_size as Float);
        let bins = fft.bins();
        Ok(Self {
            processor,
            fft_size,
            hop_size,
            fft,
            window,
            gain,
            delay_line: vec![0.0; fft_size],
            accumulator: vec![0.0; fft_size],
            ready: vec![0.0; hop_size],
            frame: vec![0.0; fft_size],
            re: vec![0.0; bins],
            im: vec![0.0; bins],
            out_re: vec![0.0; bins],
            out_im: vec![0.0; bins],
            pos: 0,
        })
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    pub fn latency(&self) -> usize {
        self.fft_size
    }

    pub fn gain(&self) -> Float {
        self.gain
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }

    pub fn processor_mut(&mut self) -> &mut P {
        &mut self.processor
    }

    fn process_frame(&mut self) {
        for ((f, &x), &w) in self.frame.iter_mut().zip(self.delay_line.iter()).zip(self.window.iter()) {
            *f = x * w;
        }
        self.fft.direct(&self.frame, &mut self.re, &mut self.im);

        self.out_re.fill(0.0);
        self.out_im.fill(0.0);
        self.processor.process_spectrum(&self.re, &self.im, &mut self.out_re, &mut self.out_im);

        self.fft.inverse(&self.out_re, &self.out_im, &mut self.frame);
        for ((acc, &y), &w) in self.accumulator.iter_mut().zip(self.frame.iter()).zip(self.window.iter()) {
            *acc += y * w * self.gain;
        }

        // first hop samples are complete, release them and shift
        let hop = self.hop_size;
        self.ready.copy_from_slice(&self.accumulator[..hop]);
        self.accumulator.copy_within(hop.., 0);
        let len = self.accumulator.len();
        self.accumulator[len - hop..].fill(0.0);
        self.delay_line.copy_within(hop.., 0);
    }
}

impl<P: SpectralProcessor + Clone> Filter for OverlapAddFilter<P> {
    fn process(&mut self, sample: Float) -> Float {
        let write = self.fft_size - self.hop_size + self.pos;
        self.delay_line[write] = sample;
        let y = self.ready[self.pos];
        self.pos += 1;
        if self.pos == self.hop_size {
            self.process_frame();
            self.pos = 0;
        }
        y
    }

    fn reset(&mut self) {
        self.delay_line.fill(0.0);
        self.accumulator.fill(0.0);
        self.ready.fill(0.0);
        self.pos = 0;
        self.processor.reset();
    }

    // every method means the same here: the latency-compensated online result
    fn apply_to(&self, signal: &DiscreteSignal, _method: FilteringMethod) -> Result<DiscreteSignal> {
        let mut fresh = self.clone();
        fresh.reset();
        let latency = self.latency();
        let mut out = Vec::with_capacity(signal.len());
        let padded = signal.samples().iter().copied().chain(std::iter::repeat(0.0).take(latency));
        for (i, x) in padded.enumerate() {
            let y = fresh.process(x);
            if i >= latency {
                out.push(y);
            }
        }
        DiscreteSignal::new(signal.sampling_rate(), out)
    }
}
