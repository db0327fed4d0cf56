//!
//! Frame-wise feature extraction.
//!
//! An extractor turns `[start, end)` of a sample buffer into one fixed-length
//! feature vector per hop. Long recordings can be split across threads with
//! `parallel_compute_from`.
//!
// external crates
#[cfg(feature = "rayon")]
use rayon::prelude::*;
// local crates
use crate::error::{DspError, Result};
use crate::fft::RealFft;
use crate::signal::SampleRate;
use crate::utils::Float;
use crate::windows::WindowType;

/// Fraction of spectral energy below the roll-off frequency
pub const ROLLOFF_FRACTION: Float = 0.85;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FrameOptions {
    pub frame_size: usize,
    pub hop_size: usize,
}

impl Default for FrameOptions {
    fn default() -> Self {
        Self { frame_size: 512, hop_size: 256 }
    }
}

impl FrameOptions {
    pub fn validate(&self) -> Result<()> {
        if self.frame_size == 0 || self.hop_size == 0 {
            return Err(DspError::config(format!(
                "frame size and hop must be positive, got {} / {}", self.frame_size, self.hop_size
            )));
        }
        Ok(())
    }

    // frames that fit entirely in `len` samples
    pub fn frame_count(&self, len: usize) -> usize {
        if len < self.frame_size {
            0
        } else {
            (len - self.frame_size) / self.hop_size + 1
        }
    }
}

pub trait FeatureExtractor: Send {
    fn feature_names(&self) -> Vec<&'static str>;

    fn feature_count(&self) -> usize {
        self.feature_names().len()
    }

    fn options(&self) -> FrameOptions;

    /// Features of a single frame of `frame_size` samples
    fn process_frame(&mut self, _frame: &[Float], _features: &mut [Float]) -> Result<()> {
        Err(DspError::unsupported("this extractor only works on whole buffers"))
    }

    /// One feature vector per hop, for every frame inside `samples[start..end]`
    fn compute_from(&mut self, samples: &[Float], start: usize, end: usize) -> Result<Vec<Vec<Float>>> {
        check_range(samples.len(), start, end)?;
        let opts = self.options();
        let count = opts.frame_count(end - start);
        let width = self.feature_count();
        let mut vectors = Vec::with_capacity(count);
        for i in 0..count {
            let pos = start + i * opts.hop_size;
            let mut features = vec![0.0; width];
            self.process_frame(&samples[pos..pos + opts.frame_size], &mut features)?;
            vectors.push(features);
        }
        Ok(vectors)
    }

    // frames of history a result depends on (besides its own)
    fn context_frames(&self) -> usize {
        0
    }

    fn reset(&mut self) {}

    /// Independent copy of the configuration with fresh buffers
    fn snapshot(&self) -> Box<dyn FeatureExtractor>;
}

fn check_range(len: usize, start: usize, end: usize) -> Result<()> {
    if start > end || end > len {
        return Err(DspError::config(format!(
            "range {start}..{end} is outside a buffer of {len} samples"
        )));
    }
    Ok(())
}

/* TimeDomainFeatureExtractor: [energy, rms, zcr] per frame
 *   energy = sum(x^2) / N,  rms = sqrt(energy),
 *   zcr = sign changes / (N - 1)
 */
#[derive(Debug, Clone)]
pub struct TimeDomainFeatureExtractor {
    options: FrameOptions,
}

impl TimeDomainFeatureExtractor {
    pub fn new(options: FrameOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { options })
    }
}

impl FeatureExtractor for TimeDomainFeatureExtractor {
    fn feature_names(&self) -> Vec<&'static str> {
        vec!["energy", "rms", "zcr"]
    }

    fn options(&self) -> FrameOptions {
        self.options
    }

    fn process_frame(&mut self, frame: &[Float], features: &mut [Float]) -> Result<()> {
        if frame.is_empty() || features.len() < 3 {
            return Err(DspError::config("empty frame or short feature vector"));
        }
        let energy = frame.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>() / frame.len() as f64;
        let crossings = frame.windows(2).filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0)).count();
        features[0] = energy as Float;
        features[1] = energy.sqrt() as Float;
        features[2] = if frame.len() > 1 { crossings as Float / (frame.len() - 1) as Float } else { 0.0 };
        Ok(())
    }

    fn snapshot(&self) -> Box<dyn FeatureExtractor> {
        Box::new(self.clone())
    }
}

/* SpectralFeatureExtractor: [centroid, spread, flatness, rolloff] per frame
 *
 * BORING MATH:
 * over the power spectrum p_k of the Hann-windowed frame (bin freqs f_k, Hz)
 *   centroid = sum(f_k p_k) / sum(p_k)
 *   spread   = sqrt( sum((f_k - centroid)^2 p_k) / sum(p_k) )
 *   flatness = geometric mean(p) / arithmetic mean(p)
 *   rolloff  = lowest f_k with sum{j<=k}(p_j) >= 0.85 sum(p)
 */
#[derive(Debug, Clone)]
pub struct SpectralFeatureExtractor {
    options: FrameOptions,
    sampling_rate: SampleRate,
    fft: RealFft<Float>,
    window: Vec<Float>,
    frame: Vec<Float>,
    re: Vec<Float>,
    im: Vec<Float>,
    power: Vec<f64>,
}

impl SpectralFeatureExtractor {
    /// Frames are zero-padded up to the next power of two
    pub fn new(sampling_rate: SampleRate, options: FrameOptions) -> Result<Self> {
        options.validate()?;
        if sampling_rate == 0 {
            return Err(DspError::config("sampling rate must be positive"));
        }
        let fft = RealFft::new(options.frame_size.next_power_of_two())?;
        let bins = fft.bins();
        Ok(Self {
            options,
            sampling_rate,
            window: WindowType::Hann.periodic(options.frame_size),
            frame: vec![0.0; fft.size()],
            re: vec![0.0; bins],
            im: vec![0.0; bins],
            power: vec![0.0; bins],
            fft,
        })
    }
}

impl FeatureExtractor for SpectralFeatureExtractor {
    fn feature_names(&self) -> Vec<&'static str> {
        vec!["centroid", "spread", "flatness", "rolloff"]
    }

    fn options(&self) -> FrameOptions {
        self.options
    }

    fn process_frame(&mut self, frame: &[Float], features: &mut [Float]) -> Result<()> {
        if frame.len() != self.options.frame_size || features.len() < 4 {
            return Err(DspError::config(format!(
                "expected a frame of {} samples", self.options.frame_size
            )));
        }
        for (i, f) in self.frame.iter_mut().enumerate() {
            *f = match (frame.get(i), self.window.get(i)) {
                (Some(&x), Some(&w)) => x * w,
                _ => 0.0,
            };
        }
        self.fft.direct(&self.frame, &mut self.re, &mut self.im);
        for (p, (&r, &i)) in self.power.iter_mut().zip(self.re.iter().zip(self.im.iter())) {
            *p = (r as f64) * (r as f64) + (i as f64) * (i as f64);
        }

        features[..4].fill(0.0);
        let total: f64 = self.power.iter().sum();
        if total <= 1e-20 {
            return Ok(());
        }
        let resolution = self.sampling_rate as f64 / self.fft.size() as f64;
        let centroid = self.power.iter().enumerate().map(|(k, &p)| k as f64 * resolution * p).sum::<f64>() / total;
        let spread = (self
            .power
            .iter()
            .enumerate()
            .map(|(k, &p)| (k as f64 * resolution - centroid).powi(2) * p)
            .sum::<f64>()
            / total)
            .sqrt();

        let n = self.power.len() as f64;
        let log_mean = self.power.iter().map(|&p| (p + 1e-20).ln()).sum::<f64>() / n;
        let flatness = log_mean.exp() / (total / n);

        let threshold = ROLLOFF_FRACTION as f64 * total;
        let mut cumulative = 0.0;
        let mut rolloff = 0;
        for (k, &p) in self.power.iter().enumerate() {
            cumulative += p;
            if cumulative >= threshold {
                rolloff = k;
                break;
            }
        }

        features[0] = centroid as Float;
        features[1] = spread as Float;
        features[2] = flatness as Float;
        features[3] = (rolloff as f64 * resolution) as Float;
        Ok(())
    }

    fn snapshot(&self) -> Box<dyn FeatureExtractor> {
        Box::new(self.clone())
    }
}

/* SpectralFluxExtractor: [flux] per frame
 *   flux_t = sum{k}( max(|X_t[k]| - |X_{t-1}[k]|, 0)^2 )
 * The first frame of a buffer is compared with silence, so results
 * depend on the previous frame: whole buffers only.
 */
#[derive(Debug, Clone)]
pub struct SpectralFluxExtractor {
    options: FrameOptions,
    fft: RealFft<Float>,
    window: Vec<Float>,
    frame: Vec<Float>,
    re: Vec<Float>,
    im: Vec<Float>,
    magnitude: Vec<Float>,
    previous: Vec<Float>,
}

impl SpectralFluxExtractor {
    pub fn new(options: FrameOptions) -> Result<Self> {
        options.validate()?;
        let fft = RealFft::new(options.frame_size.next_power_of_two())?;
        let bins = fft.bins();
        Ok(Self {
            options,
            window: WindowType::Hann.periodic(options.frame_size),
            frame: vec![0.0; fft.size()],
            re: vec![0.0; bins],
            im: vec![0.0; bins],
            magnitude: vec![0.0; bins],
            previous: vec![0.0; bins],
            fft,
        })
    }
}

impl FeatureExtractor for SpectralFluxExtractor {
    fn feature_names(&self) -> Vec<&'static str> {
        vec!["flux"]
    }

    fn options(&self) -> FrameOptions {
        self.options
    }

    fn compute_from(&mut self, samples: &[Float], start: usize, end: usize) -> Result<Vec<Vec<Float>>> {
        check_range(samples.len(), start, end)?;
        self.reset();
        let count = self.options.frame_count(end - start);
        let mut vectors = Vec::with_capacity(count);
        for i in 0..count {
            let pos = start + i * self.options.hop_size;
            let frame = &samples[pos..pos + self.options.frame_size];
            for (j, f) in self.frame.iter_mut().enumerate() {
                *f = match (frame.get(j), self.window.get(j)) {
                    (Some(&x), Some(&w)) => x * w,
                    _ => 0.0,
                };
            }
            self.fft.direct(&self.frame, &mut self.re, &mut self.im);
            let mut flux = 0.0;
            for k in 0..self.magnitude.len() {
                self.magnitude[k] = self.re[k].hypot(self.im[k]);
                let rise = (self.magnitude[k] - self.previous[k]).max(0.0);
                flux += rise * rise;
            }
            std::mem::swap(&mut self.magnitude, &mut self.previous);
            vectors.push(vec![flux]);
        }
        Ok(vectors)
    }

    fn context_frames(&self) -> usize {
        1
    }

    fn reset(&mut self) {
        self.previous.fill(0.0);
    }

    fn snapshot(&self) -> Box<dyn FeatureExtractor> {
        let mut copy = self.clone();
        copy.reset();
        Box::new(copy)
    }
}

// frame ranges [f0, f1) of roughly equal size, in order
fn chunk_frames(frames: usize, chunks: usize) -> Vec<(usize, usize)> {
    if frames == 0 {
        return vec![];
    }
    let per = frames.div_ceil(chunks.clamp(1, frames));
    (0..frames).step_by(per).map(|f0| (f0, (f0 + per).min(frames))).collect()
}

// features of frames [f0, f1) computed on a snapshot, with leading context dropped
fn compute_chunk(
    mut extractor: Box<dyn FeatureExtractor>,
    samples: &[Float],
    start: usize,
    (f0, f1): (usize, usize),
) -> Result<Vec<Vec<Float>>> {
    let opts = extractor.options();
    let lead = extractor.context_frames().min(f0);
    let from = start + (f0 - lead) * opts.hop_size;
    let to = start + (f1 - 1) * opts.hop_size + opts.frame_size;
    let mut vectors = extractor.compute_from(samples, from, to)?;
    vectors.drain(..lead.min(vectors.len()));
    Ok(vectors)
}

/// Same result as `compute_from`, with the frames split into `chunks`
/// hop-aligned pieces (one per worker thread if None) computed in parallel
/// on independent snapshots of `extractor`.
#[cfg(feature = "rayon")]
pub fn parallel_compute_from(
    extractor: &dyn FeatureExtractor,
    samples: &[Float],
    start: usize,
    end: usize,
    chunks: Option<usize>,
) -> Result<Vec<Vec<Float>>> {
    check_range(samples.len(), start, end)?;
    let frames = extractor.options().frame_count(end - start);
    let ranges = chunk_frames(frames, chunks.unwrap_or_else(rayon::current_num_threads));
    let workers: Vec<Box<dyn FeatureExtractor>> = ranges.iter().map(|_| extractor.snapshot()).collect();

    let parts: Vec<Vec<Vec<Float>>> = workers
        .into_par_iter()
        .zip(ranges.into_par_iter())
        .map(|(worker, range)| compute_chunk(worker, samples, start, range))
        .collect::<Result<_>>()?;
    Ok(parts.into_iter().flatten().collect())
}

/// Sequential fallback when the `rayon` feature is off
#[cfg(not(feature = "rayon"))]
pub fn parallel_compute_from(
    extractor: &dyn FeatureExtractor,
    samples: &[Float],
    start: usize,
    end: usize,
    chunks: Option<usize>,
) -> Result<Vec<Vec<Float>>> {
    check_range(samples.len(), start, end)?;
    let frames = extractor.options().frame_count(end - start);
    let mut vectors = Vec::with_capacity(frames);
    for range in chunk_frames(frames, chunks.unwrap_or(1)) {
        vectors.extend(compute_chunk(extractor.snapshot(), samples, start, range)?);
    }
    Ok(vectors)
}
