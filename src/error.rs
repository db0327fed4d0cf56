//! Error type shared by every public operation of the crate.

use thiserror::Error;

/// Errors raised by construction or by a public call entry.
///
/// Nothing in the crate retries: every variant reports a caller contract
/// violation, not a transient condition.
#[derive(Debug, Error)]
pub enum DspError {
    /// Invalid frame/hop/FFT-size relationships, bad factors, mismatched lengths.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A computation would otherwise divide by (almost) zero.
    #[error("numerical degeneracy: {0}")]
    NumericalDegeneracy(String),

    /// The object can't perform the requested operation.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Failure while reading or writing a RIFF/WAVE container.
    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),
}

impl DspError {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }

    pub(crate) fn degenerate(reason: impl Into<String>) -> Self {
        Self::NumericalDegeneracy(reason.into())
    }

    pub(crate) fn unsupported(reason: impl Into<String>) -> Self {
        Self::UnsupportedOperation(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, DspError>;
