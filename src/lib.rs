pub mod error;
pub mod utils;
pub mod signal;
pub mod windows;
pub mod fft;
pub mod dct;
pub mod hilbert;
pub mod polynomial;
pub mod transfer_function;
pub mod filters;
pub mod design;
pub mod convolution;
pub mod block_convolution;
pub mod stft;
pub mod overlap_add;
pub mod effects;
pub mod resampler;
pub mod phase_vocoder;
pub mod wsola;
pub mod tsm;
pub mod features;
pub mod wave_file;

pub use crate::block_convolution::{OlaBlockConvolver, OlsBlockConvolver};
pub use crate::error::{DspError, Result};
pub use crate::filters::{Filter, FilterChain, FilteringMethod, FirFilter, IirFilter, LtiFilter};
pub use crate::overlap_add::{OverlapAddFilter, SpectralProcessor};
pub use crate::resampler::Resampler;
pub use crate::signal::{ComplexDiscreteSignal, DiscreteSignal, SampleRate};
pub use crate::transfer_function::TransferFunction;
pub use crate::tsm::{time_stretch, TimeStretcher, TsmAlgorithm, TsmParameters};
pub use crate::utils::Float;
pub use crate::wave_file::{Channel, WaveFile};
pub use crate::windows::WindowType;
