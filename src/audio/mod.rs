//! Audio access: partial decoding of a recording window followed by the
//! optional resample and filter stages.

pub mod analysis;
pub mod decode;
pub mod filter;
pub mod resample;
pub mod window;

use ndarray::Array2;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

use crate::params::AudioParameters;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("cannot open {}: {source}", path.display())]
    NotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("window [{start}, {end}] outside [0, {duration}]")]
    OutOfRange { start: f64, end: f64, duration: f64 },

    #[error("{0}")]
    Format(String),

    #[error("{0}")]
    Parameter(String),

    #[error("resampling failed: {0}")]
    Resample(String),

    #[error("read cancelled")]
    Cancelled,
}

/// Shared flag a caller flips to abandon an in-flight read.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// What the caller knows about a stored recording.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordingDescriptor {
    /// Stable identifier used for cache keys; the path is used when absent.
    pub id: Option<String>,
    pub path: PathBuf,
    /// Real-world duration in seconds.
    pub duration: f64,
    /// Effective sample rate, i.e. the header rate times `time_expansion`.
    pub samplerate: u32,
    pub channels: usize,
    pub time_expansion: f64,
}

impl RecordingDescriptor {
    pub fn cache_identity(&self) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Decoded samples of one time window, `samples × channels`.
#[derive(Debug, Clone)]
pub struct WaveformSlice {
    pub samples: Array2<f32>,
    pub samplerate: u32,
    pub start_time: f64,
    pub end_time: f64,
}

impl WaveformSlice {
    pub fn num_samples(&self) -> usize {
        self.samples.nrows()
    }

    pub fn num_channels(&self) -> usize {
        self.samples.ncols()
    }

    pub fn duration(&self) -> f64 {
        self.num_samples() as f64 / self.samplerate as f64
    }
}

/// Load `[start, end]` seconds of a recording, then resample and filter as
/// requested. Resampling always runs first so the filter is designed at the
/// rate it is applied at.
pub fn load(
    recording: &RecordingDescriptor,
    start: Option<f64>,
    end: Option<f64>,
    params: &AudioParameters,
    cancel: &CancelToken,
) -> Result<WaveformSlice, AudioError> {
    let start = start.unwrap_or(0.0);
    let end = end.unwrap_or(recording.duration);
    check_window(start, end, recording)?;

    let mut slice = decode::read_window(recording, start, end, cancel)?;
    log::debug!(
        "Loaded {} samples x {} channels at {}Hz for [{:.3}s, {:.3}s]",
        slice.num_samples(),
        slice.num_channels(),
        slice.samplerate,
        start,
        end
    );

    if params.resample && params.target_samplerate != slice.samplerate {
        slice.samples =
            resample::resample(slice.samples, slice.samplerate, params.target_samplerate)?;
        slice.samplerate = params.target_samplerate;
        log::debug!(
            "Resampled to {}Hz ({} samples, {:.3}s)",
            slice.samplerate,
            slice.num_samples(),
            slice.duration()
        );
    }

    if params.has_filter() {
        let filter = filter::Butterworth::design(
            params.filter_order,
            params.low_freq,
            params.high_freq,
            slice.samplerate as f64,
        )?;
        filter.apply(&mut slice.samples);
        log::debug!("Applied {}", filter);
    }

    Ok(slice)
}

fn check_window(start: f64, end: f64, recording: &RecordingDescriptor) -> Result<(), AudioError> {
    let tolerance = 0.5 / recording.samplerate.max(1) as f64;
    let out_of_range = !start.is_finite()
        || !end.is_finite()
        || start < 0.0
        || start > recording.duration + tolerance
        || end > recording.duration + tolerance;
    if out_of_range {
        return Err(AudioError::OutOfRange {
            start,
            end,
            duration: recording.duration,
        });
    }
    if end <= start {
        return Err(AudioError::Parameter(format!(
            "end_time ({end}) must be greater than start_time ({start})"
        )));
    }
    Ok(())
}
