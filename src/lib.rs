//! Spectrogram images of bioacoustic recordings.
//!
//! A request names a recording, an optional time window and two parameter
//! sets. [`compute_spectrogram`] reads just that window, optionally
//! resamples and band-limits it, takes a short-time Fourier transform, runs
//! the post-processing chain and returns a colour-mapped PNG.

pub mod audio;
pub mod cache;
pub mod error;
pub mod params;
pub mod render;
pub mod service;

pub use audio::{CancelToken, RecordingDescriptor};
pub use cache::SpectrogramCache;
pub use error::{Error, Result};
pub use params::{AudioParameters, NormalizeMode, PcenParameters, Scale, SpectrogramParameters, WindowType};
pub use service::{compute_array, compute_spectrogram, compute_spectrogram_cancellable};
