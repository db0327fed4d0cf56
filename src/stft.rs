// external crates
use ndarray::{s, Array2, Axis};
use rustfft::num_complex::Complex32;
// local crates
use crate::error::{DspError, Result};
use crate::fft::RealFft;
use crate::utils::Float;
use crate::windows::WindowType;

/* Stft: short-time Fourier transform of a whole signal.
 *
 * Frames are centered: the signal is padded with window_size/2 zeros in
 * front, frame t starts at t * hop_size of the padded signal, and frames
 * keep coming until one starts at or after the last sample, so every
 * sample sees all the frames that overlap it.
 *
 * The transform array has shape (n_frames, window_size/2 + 1).
 * `inverse` is a weighted overlap-add:
 *   x[n] = sum{t}( w[n - t hop] y_t[n - t hop] ) / sum{t}( w[n - t hop]^2 )
 * which undoes `direct` exactly wherever the squared windows don't vanish.
 */
#[derive(Debug, Clone)]
pub struct Stft {
    window_size: usize,
    hop_size: usize,
    window: Vec<Float>,
    fft: RealFft<Float>,
    frame: Vec<Float>,
    re: Vec<Float>,
    im: Vec<Float>,
}

impl Stft {
    pub fn new(window_size: usize, hop_size: usize, window: WindowType) -> Result<Self> {
        let fft = RealFft::new(window_size)?;
        if hop_size == 0 || hop_size > window_size {
            return Err(DspError::config(format!(
                "stft hop size must be in 1..={window_size}, got {hop_size}"
            )));
        }
        let bins = fft.bins();
        Ok(Self {
            window_size,
            hop_size,
            window: window.periodic(window_size),
            fft,
            frame: vec![0.0; window_size],
            re: vec![0.0; bins],
            im: vec![0.0; bins],
        })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    pub fn bins(&self) -> usize {
        self.fft.bins()
    }

    // number of frames needed to cover `len` samples
    pub fn frame_count(&self, len: usize) -> usize {
        if len == 0 {
            return 1;
        }
        let last = len - 1 + self.window_size / 2;
        1 + last.div_ceil(self.hop_size)
    }

    pub fn direct(&mut self, samples: &[Float]) -> Array2<Complex32> {
        let n_frames = self.frame_count(samples.len());
        let pad = self.window_size / 2;
        let mut data = Array2::<Complex32>::zeros((n_frames, self.bins()));

        for (t, mut row) in data.axis_iter_mut(Axis(0)).enumerate() {
            let start = (t * self.hop_size) as isize - pad as isize;
            for (i, f) in self.frame.iter_mut().enumerate() {
                let idx = start + i as isize;
                let x = if idx >= 0 { samples.get(idx as usize).copied().unwrap_or(0.0) } else { 0.0 };
                *f = x * self.window[i];
            }
            self.fft.direct(&self.frame, &mut self.re, &mut self.im);
            for (k, z) in row.iter_mut().enumerate() {
                *z = Complex32::new(self.re[k], self.im[k]);
            }
        }
        data
    }

    /// Invert `stft` back into `length` samples
    pub fn inverse(&mut self, stft: &Array2<Complex32>, length: usize) -> Result<Vec<Float>> {
        let (n_frames, bins) = stft.dim();
        if bins != self.bins() {
            return Err(DspError::config(format!(
                "stft has {bins} bins, expected {}", self.bins()
            )));
        }
        let pad = self.window_size / 2;
        let total = (n_frames.saturating_sub(1)) * self.hop_size + self.window_size;
        let mut acc = vec![0.0f64; total];
        let mut norm = vec![0.0f64; total];
        let scale = 1.0 / self.window_size as Float;

        for t in 0..n_frames {
            let row = stft.slice(s![t, ..]);
            for (k, z) in row.iter().enumerate() {
                self.re[k] = z.re;
                self.im[k] = z.im;
            }
            self.fft.inverse(&self.re, &self.im, &mut self.frame);
            let offset = t * self.hop_size;
            for (i, (&y, &w)) in self.frame.iter().zip(self.window.iter()).enumerate() {
                acc[offset + i] += (y * scale * w) as f64;
                norm[offset + i] += (w * w) as f64;
            }
        }

        Ok((0..length)
            .map(|n| {
                let i = n + pad;
                match (acc.get(i), norm.get(i)) {
                    (Some(&a), Some(&w)) if w > 1e-10 => (a / w) as Float,
                    _ => 0.0,
                }
            })
            .collect())
    }

    // power spectrogram |X|^2, shape (n_frames, bins)
    pub fn spectrogram(&mut self, samples: &[Float]) -> Array2<Float> {
        self.direct(samples).mapv(|z| z.norm_sqr())
    }
}
