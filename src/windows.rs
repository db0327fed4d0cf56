//! Window functions for spectral analysis and FIR design.

use std::f64::consts::PI;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::utils::{bessel_i0, Float};

/// Supported window shapes.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum WindowType {
    Rectangular,
    Triangular,
    Hamming,
    Blackman,
    #[default]
    Hann,
    Kaiser { beta: f64 },
}

impl WindowType {
    /// Symmetric window of `size` points (first and last samples mirror each other).
    ///
    /// This is what FIR design wants.
    pub fn symmetric(self, size: usize) -> Vec<Float> {
        if size == 1 {
            return vec![1.0];
        }
        self.generate(size, size.saturating_sub(1) as f64)
    }

    /// Periodic window of `size` points: one period of a `size + 1` symmetric
    /// window with the last point dropped.
    ///
    /// Hann and Hamming windows in this form overlap-add to a constant, which is
    /// what the STFT framework relies on.
    pub fn periodic(self, size: usize) -> Vec<Float> {
        self.generate(size, size as f64)
    }

    fn generate(self, size: usize, denom: f64) -> Vec<Float> {
        (0..size)
            .map(|i| {
                let x = i as f64 / denom;
                let w = match self {
                    WindowType::Rectangular => 1.0,
                    WindowType::Triangular => 1.0 - (2.0 * x - 1.0).abs(),
                    WindowType::Hamming => 0.54 - 0.46 * (2.0 * PI * x).cos(),
                    WindowType::Blackman => {
                        0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()
                    }
                    WindowType::Hann => 0.5 - 0.5 * (2.0 * PI * x).cos(),
                    WindowType::Kaiser { beta } => {
                        let r = 2.0 * x - 1.0;
                        bessel_i0(beta * (1.0 - r * r).max(0.0).sqrt()) / bessel_i0(beta)
                    }
                };
                w as Float
            })
            .collect()
    }
}

/// Multiply `samples` by `window` element-wise (in place).
pub fn apply_window(samples: &mut [Float], window: &[Float]) {
    for (s, w) in samples.iter_mut().zip(window) {
        *s *= w;
    }
}
