//! Request orchestration: audio window in, PNG bytes out.

use ndarray::{s, Array2};
use std::time::Instant;

use crate::audio::analysis;
use crate::audio::{self, CancelToken, RecordingDescriptor, WaveformSlice};
use crate::error::{Error, Result};
use crate::params::{AudioParameters, SpectrogramParameters};
use crate::render::image;
use crate::render::postprocess::PostProcessChain;

/// Render the spectrogram of `[start, end]` seconds of `recording` as PNG.
///
/// Missing bounds default to the start and end of the recording. Nothing
/// is cached here; see [`crate::cache::SpectrogramCache`].
pub fn compute_spectrogram(
    recording: &RecordingDescriptor,
    start: Option<f64>,
    end: Option<f64>,
    audio_params: &AudioParameters,
    spec_params: &SpectrogramParameters,
) -> Result<Vec<u8>> {
    compute_spectrogram_cancellable(
        recording,
        start,
        end,
        audio_params,
        spec_params,
        &CancelToken::new(),
    )
}

pub fn compute_spectrogram_cancellable(
    recording: &RecordingDescriptor,
    start: Option<f64>,
    end: Option<f64>,
    audio_params: &AudioParameters,
    spec_params: &SpectrogramParameters,
    cancel: &CancelToken,
) -> Result<Vec<u8>> {
    let data = compute_array_cancellable(recording, start, end, audio_params, spec_params, cancel)?;

    let t = Instant::now();
    let png = image::render(&data, &spec_params.cmap)?;
    log::debug!("render: {} bytes in {:.1?}", png.len(), t.elapsed());
    Ok(png)
}

/// The processed `frequency × time` array in `[0, 1]`, just before colouring.
pub fn compute_array(
    recording: &RecordingDescriptor,
    start: Option<f64>,
    end: Option<f64>,
    audio_params: &AudioParameters,
    spec_params: &SpectrogramParameters,
) -> Result<Array2<f32>> {
    compute_array_cancellable(
        recording,
        start,
        end,
        audio_params,
        spec_params,
        &CancelToken::new(),
    )
}

fn compute_array_cancellable(
    recording: &RecordingDescriptor,
    start: Option<f64>,
    end: Option<f64>,
    audio_params: &AudioParameters,
    spec_params: &SpectrogramParameters,
    cancel: &CancelToken,
) -> Result<Array2<f32>> {
    audio_params.validate()?;
    spec_params.validate()?;
    let chain = PostProcessChain::from_parameters(spec_params)?;

    log::info!(
        "Spectrogram of {} [{}, {}] channel {} ({:?})",
        recording.cache_identity(),
        fmt_bound(start),
        fmt_bound(end),
        spec_params.channel,
        chain.kinds()
    );

    let t = Instant::now();
    let slice = audio::load(recording, start, end, audio_params, cancel)?;
    log::debug!("load: {} samples in {:.1?}", slice.num_samples(), t.elapsed());

    let slice = select_channel(slice, spec_params.channel)?;

    let t = Instant::now();
    let spectrogram = analysis::transform(
        slice,
        spec_params.window_size,
        spec_params.hop_size,
        spec_params.window_type,
    )?;
    log::debug!(
        "transform: {}x{} in {:.1?}",
        spectrogram.num_bins(),
        spectrogram.num_frames(),
        t.elapsed()
    );

    let t = Instant::now();
    let data = chain.run(spectrogram)?;
    log::debug!("postprocess: {:.1?}", t.elapsed());
    Ok(data)
}

/// Keep only column `channel` of a multi-channel slice.
pub fn select_channel(slice: WaveformSlice, channel: usize) -> Result<WaveformSlice> {
    let channels = slice.num_channels();
    if channel >= channels {
        return Err(Error::invalid(format!(
            "channel {channel} requested but the recording has {channels} channel(s)"
        )));
    }
    if channels == 1 {
        return Ok(slice);
    }
    Ok(WaveformSlice {
        samples: slice.samples.slice(s![.., channel..channel + 1]).to_owned(),
        ..slice
    })
}

fn fmt_bound(bound: Option<f64>) -> String {
    bound.map_or_else(|| "-".to_string(), |v| format!("{v:.3}s"))
}
