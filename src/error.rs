//! Error types for chirpgram.
//!
//! Every failure of the spectrogram pipeline is one of a small set of kinds so
//! that a hosting HTTP layer can map it to a status code without inspecting
//! messages.

use thiserror::Error;

use crate::audio::AudioError;

/// Main error type for the spectrogram pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// The recording's audio file is missing or unreadable.
    #[error("Recording unavailable: {0}")]
    RecordingUnavailable(String),

    /// The requested time window lies outside the recording.
    #[error("Requested window [{start:.4}s, {end:.4}s] is out of bounds; valid range is [0s, {duration:.4}s]")]
    OutOfBounds { start: f64, end: f64, duration: f64 },

    /// Container or codec not supported by the decoder.
    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    /// Unknown window/scale/colormap name or a parameter outside its domain.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// PNG encoding failed.
    #[error("Render error: {0}")]
    Render(String),

    /// The caller abandoned the request while audio was being read.
    #[error("Operation cancelled")]
    Cancelled,

    /// Internal invariant violation (e.g. resampler construction failure).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// HTTP status code a hosting server should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::RecordingUnavailable(_) => 404,
            Error::OutOfBounds { .. } => 400,
            Error::UnsupportedFormat(_) => 415,
            Error::InvalidParameter(_) => 422,
            Error::Render(_) | Error::Cancelled | Error::Internal(_) => 500,
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidParameter(msg.into())
    }
}

impl From<AudioError> for Error {
    fn from(e: AudioError) -> Self {
        match e {
            AudioError::NotFound { path, source } => {
                Error::RecordingUnavailable(format!("{}: {}", path.display(), source))
            }
            AudioError::OutOfRange {
                start,
                end,
                duration,
            } => Error::OutOfBounds {
                start,
                end,
                duration,
            },
            AudioError::Format(msg) => Error::UnsupportedFormat(msg),
            AudioError::Parameter(msg) => Error::InvalidParameter(msg),
            AudioError::Resample(msg) => Error::Internal(msg),
            AudioError::Cancelled => Error::Cancelled,
        }
    }
}

/// Convenience Result type using the chirpgram Error
pub type Result<T> = std::result::Result<T, Error>;
