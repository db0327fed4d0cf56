// local crates
use crate::convolution::Convolver;
use crate::error::{DspError, Result};
use crate::signal::DiscreteSignal;
use crate::tsm::{check_stretch, TimeStretcher, TsmParameters};
use crate::utils::Float;
use crate::windows::WindowType;

/// Above this many multiply-adds per frame the alignment search runs through the FFT
pub const DIRECT_SEARCH_LIMIT: usize = 1 << 16;

/* Wsola: waveform-similarity overlap-add
 *
 * Synthesis frame t lands at t hop_synthesis. Its nominal input position is
 * round(t hop_synthesis / stretch); the frame actually taken is shifted by
 * delta in [-max_delta, max_delta] to look most like the natural continuation
 * of the previous frame (the input that followed it by hop_synthesis).
 *
 * BORING MATH:
 * similarity is the normalized cross-correlation
 *   c(delta) = sum{i}( x[a + delta + i] r[i] ) / sqrt( sum{i}( x[a + delta + i]^2 ) )
 * Frames are Hann windowed and overlap-added; every output sample is then
 * divided by the sum of the windows that covered it.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct Wsola {
    stretch: f64,
    window_size: usize,
    hop_synthesis: usize,
    max_delta: usize,
}

impl Wsola {
    pub fn new(stretch: f64, window_size: usize, hop_synthesis: usize, max_delta: usize) -> Result<Self> {
        check_stretch(stretch)?;
        if window_size < 2 {
            return Err(DspError::config(format!("wsola window too short: {window_size}")));
        }
        if hop_synthesis == 0 || hop_synthesis >= window_size {
            return Err(DspError::config(format!(
                "synthesis hop must be in 1..{window_size}, got {hop_synthesis}"
            )));
        }
        Ok(Self { stretch, window_size, hop_synthesis, max_delta })
    }

    pub fn from_parameters(stretch: f64, params: &TsmParameters) -> Result<Self> {
        params.validate()?;
        Self::new(stretch, params.window_size, params.hop_synthesis, params.max_delta)
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn hop_synthesis(&self) -> usize {
        self.hop_synthesis
    }

    pub fn max_delta(&self) -> usize {
        self.max_delta
    }

    fn nominal_position(&self, t: usize) -> isize {
        (t as f64 * self.hop_synthesis as f64 / self.stretch).round() as isize
    }
}

impl TimeStretcher for Wsola {
    fn stretch(&self) -> f64 {
        self.stretch
    }

    fn time_stretch(&self, signal: &DiscreteSignal) -> Result<DiscreteSignal> {
        let size = self.window_size;
        let hop = self.hop_synthesis;
        let delta = self.max_delta;
        let pad = size / 2;
        let x = signal.samples();
        let out_len = (x.len() as f64 * self.stretch).round() as usize;
        let n_frames = 1 + (out_len.saturating_sub(1) + pad).div_ceil(hop);

        let window = WindowType::Hann.periodic(size);
        let mut search = Search::new(size, delta)?;
        let mut frame = vec![0.0; size];

        let total = (n_frames - 1) * hop + size;
        let mut acc = vec![0.0f64; total];
        let mut norm = vec![0.0f64; total];
        // input start (in padded coordinates) of the previously placed frame
        let mut prev_start = 0isize;

        for t in 0..n_frames {
            let nominal = self.nominal_position(t);
            let start = if t == 0 || delta == 0 {
                nominal
            } else {
                search.best_start(x, pad, prev_start + hop as isize, nominal)?
            };
            fill(x, start - pad as isize, &mut frame);
            let offset = t * hop;
            for (i, (&v, &w)) in frame.iter().zip(window.iter()).enumerate() {
                acc[offset + i] += (v * w) as f64;
                norm[offset + i] += w as f64;
            }
            prev_start = start;
        }

        let samples = (0..out_len)
            .map(|n| {
                let i = n + pad;
                if norm[i] > 1e-6 { (acc[i] / norm[i]) as Float } else { 0.0 }
            })
            .collect();
        DiscreteSignal::new(signal.sampling_rate(), samples)
    }
}

// copy x[start..start + out.len()] with zeros outside the signal
fn fill(x: &[Float], start: isize, out: &mut [Float]) {
    for (i, o) in out.iter_mut().enumerate() {
        let idx = start + i as isize;
        *o = if idx >= 0 { x.get(idx as usize).copied().unwrap_or(0.0) } else { 0.0 };
    }
}

/* Search: scratch buffers for the alignment search of one frame
 *
 * region holds the 2 delta + size input samples around the nominal position,
 * reference the natural continuation of the previous frame.
 */
struct Search {
    size: usize,
    delta: usize,
    region: Vec<Float>,
    reference: Vec<Float>,
    correlation: Vec<Float>,
    convolver: Option<Convolver>,
}

impl Search {
    fn new(size: usize, delta: usize) -> Result<Self> {
        let region_len = size + 2 * delta;
        let convolver = if size * (2 * delta + 1) > DIRECT_SEARCH_LIMIT {
            Some(Convolver::for_lengths(region_len, size)?)
        } else {
            None
        };
        Ok(Self {
            size,
            delta,
            region: vec![0.0; region_len],
            reference: vec![0.0; size],
            correlation: vec![0.0; region_len + size - 1],
            convolver,
        })
    }

    // input start (padded coordinates) of the best-aligned frame near `nominal`
    fn best_start(&mut self, x: &[Float], pad: usize, natural: isize, nominal: isize) -> Result<isize> {
        let lo = nominal - self.delta as isize;
        fill(x, natural - pad as isize, &mut self.reference);
        if self.reference.iter().all(|&v| v == 0.0) {
            // nothing to align with
            return Ok(nominal);
        }
        fill(x, lo - pad as isize, &mut self.region);

        // correlation[d + size - 1] = sum{i}( region[d + i] reference[i] )
        let lag0 = self.size - 1;
        match self.convolver.as_mut() {
            Some(conv) => conv.cross_correlate(&self.region, &self.reference, &mut self.correlation)?,
            None => {
                for d in 0..=2 * self.delta {
                    self.correlation[d + lag0] = self.region[d..d + self.size]
                        .iter()
                        .zip(self.reference.iter())
                        .map(|(a, b)| a * b)
                        .sum();
                }
            }
        }

        // running energy of each candidate
        let mut energy: f64 = self.region[..self.size].iter().map(|&v| (v * v) as f64).sum();
        let mut best = (self.delta, Float::NEG_INFINITY);
        for d in 0..=2 * self.delta {
            if d > 0 {
                let gone = self.region[d - 1] as f64;
                let new = self.region[d + self.size - 1] as f64;
                energy = (energy - gone * gone + new * new).max(0.0);
            }
            let score = if energy > 1e-12 {
                (self.correlation[d + lag0] as f64 / energy.sqrt()) as Float
            } else {
                0.0
            };
            if score > best.1 {
                best = (d, score);
            }
        }
        Ok(lo + best.0 as isize)
    }
}
