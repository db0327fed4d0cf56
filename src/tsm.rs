//!
//! Time-scale modification: change duration, keep pitch.
//!
// local crates
use crate::error::{DspError, Result};
use crate::phase_vocoder::PhaseVocoder;
use crate::signal::{DiscreteSignal, SampleRate};
use crate::wsola::Wsola;

/// Sampling rate the banded defaults were tuned at
pub const TUNING_SAMPLING_RATE: SampleRate = 22050;

/// Anything that stretches a whole signal by a fixed factor
pub trait TimeStretcher {
    /// output duration / input duration
    fn stretch(&self) -> f64;

    /// Output has `round(input.len() * stretch)` samples at the input's rate
    fn time_stretch(&self, signal: &DiscreteSignal) -> Result<DiscreteSignal>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TsmAlgorithm {
    #[default]
    PhaseVocoder,
    PhaseLockedVocoder,
    Wsola,
}

/* TsmParameters: frame geometry shared by every algorithm
 *
 * hop_analysis is informative: stretchers derive it as hop_synthesis / stretch.
 * max_delta only matters to WSOLA (half-width of the alignment search).
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TsmParameters {
    pub window_size: usize,
    pub hop_analysis: usize,
    pub hop_synthesis: usize,
    pub max_delta: usize,
}

impl Default for TsmParameters {
    fn default() -> Self {
        Self { window_size: 1024, hop_analysis: 256, hop_synthesis: 256, max_delta: 256 }
    }
}

impl TsmParameters {
    /// Banded defaults for `stretch`, tuned at 22050 Hz and scaled
    /// linearly for other sampling rates
    pub fn tuned(algorithm: TsmAlgorithm, stretch: f64, sampling_rate: SampleRate) -> Result<Self> {
        check_stretch(stretch)?;
        if sampling_rate == 0 {
            return Err(DspError::config("sampling rate must be positive"));
        }

        // (window, hop_synthesis, max_delta) at the tuning rate
        let (window, hop, delta) = match algorithm {
            TsmAlgorithm::PhaseVocoder | TsmAlgorithm::PhaseLockedVocoder => {
                if stretch < 0.8 {
                    (1024, 256, 0)
                } else if stretch < 1.5 {
                    (2048, 512, 0)
                } else {
                    (2048, 256, 0)
                }
            }
            TsmAlgorithm::Wsola => {
                if stretch < 0.8 {
                    (1024, 512, 256)
                } else if stretch < 1.5 {
                    (1024, 512, 512)
                } else {
                    (1536, 768, 768)
                }
            }
        };

        let (mut window, mut hop, mut delta) = (window, hop, delta);
        if sampling_rate != TUNING_SAMPLING_RATE {
            let scale = sampling_rate as f64 / TUNING_SAMPLING_RATE as f64;
            let rescale = |v: usize| ((v as f64 * scale).round() as usize).max(1);
            let ratio = window / hop;
            window = rescale(window);
            if algorithm != TsmAlgorithm::Wsola {
                // fft frames must stay powers of two
                window = window.next_power_of_two();
            }
            window = window.max(2 * ratio);
            hop = (window / ratio).max(1);
            delta = if delta == 0 { 0 } else { rescale(delta) };
            log::debug!(
                "tsm parameters rescaled for {sampling_rate} Hz: window {window}, hop {hop}, delta {delta}"
            );
        }

        let params = Self {
            window_size: window,
            hop_analysis: ((hop as f64 / stretch).round() as usize).max(1),
            hop_synthesis: hop,
            max_delta: delta,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if self.window_size < 2 {
            return Err(DspError::config(format!("tsm window too short: {}", self.window_size)));
        }
        if self.hop_synthesis == 0 || self.hop_synthesis >= self.window_size {
            return Err(DspError::config(format!(
                "synthesis hop must be in 1..{}, got {}", self.window_size, self.hop_synthesis
            )));
        }
        if self.hop_analysis == 0 {
            return Err(DspError::config("analysis hop must be positive"));
        }
        Ok(())
    }
}

pub(crate) fn check_stretch(stretch: f64) -> Result<()> {
    if !(stretch > 0.0) || !stretch.is_finite() {
        return Err(DspError::config(format!("stretch must be a positive number, got {stretch}")));
    }
    Ok(())
}

/// Build a stretcher for `algorithm` from explicit parameters
pub fn stretcher(algorithm: TsmAlgorithm, stretch: f64, params: &TsmParameters) -> Result<Box<dyn TimeStretcher>> {
    Ok(match algorithm {
        TsmAlgorithm::PhaseVocoder => Box::new(PhaseVocoder::from_parameters(stretch, params, false)?),
        TsmAlgorithm::PhaseLockedVocoder => Box::new(PhaseVocoder::from_parameters(stretch, params, true)?),
        TsmAlgorithm::Wsola => Box::new(Wsola::from_parameters(stretch, params)?),
    })
}

/// Stretch `signal` by `stretch` with tuned parameters for its sampling rate
pub fn time_stretch(signal: &DiscreteSignal, stretch: f64, algorithm: TsmAlgorithm) -> Result<DiscreteSignal> {
    let params = TsmParameters::tuned(algorithm, stretch, signal.sampling_rate())?;
    stretcher(algorithm, stretch, &params)?.time_stretch(signal)
}
