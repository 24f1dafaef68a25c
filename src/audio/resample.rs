use ndarray::Array2;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use super::AudioError;

/// Resample every channel of `samples` (`samples × channels`) from
/// `from_rate` to `to_rate` with band-limited sinc interpolation.
///
/// The output is trimmed of the resampler's delay so sample 0 stays aligned
/// with the window start, and has `round(n * to_rate / from_rate)` rows.
pub fn resample(samples: Array2<f32>, from_rate: u32, to_rate: u32) -> Result<Array2<f32>, AudioError> {
    if from_rate == to_rate || samples.nrows() == 0 {
        return Ok(samples);
    }

    let n = samples.nrows();
    let channels = samples.ncols();
    let ratio = to_rate as f64 / from_rate as f64;
    let expected = ((n as f64 * ratio).round() as usize).max(1);

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, n, channels)
        .map_err(|e| AudioError::Resample(format!("failed to create resampler: {}", e)))?;
    let delay = resampler.output_delay();

    let input: Vec<Vec<f32>> = samples.columns().into_iter().map(|c| c.to_vec()).collect();
    let mut output = resampler
        .process(&input, None)
        .map_err(|e| AudioError::Resample(e.to_string()))?;

    // Flush the delay line; one partial call normally suffices.
    for _ in 0..4 {
        if output.first().map_or(0, |c| c.len()) >= delay + expected {
            break;
        }
        let tail = resampler
            .process_partial(None::<&[Vec<f32>]>, None)
            .map_err(|e| AudioError::Resample(e.to_string()))?;
        if tail.first().map_or(true, |c| c.is_empty()) {
            break;
        }
        for (chan, extra) in output.iter_mut().zip(tail) {
            chan.extend_from_slice(&extra);
        }
    }

    let mut resampled = Array2::<f32>::zeros((expected, channels));
    for (c, chan) in output.iter().enumerate() {
        for (i, &v) in chan.iter().skip(delay).take(expected).enumerate() {
            resampled[[i, c]] = v;
        }
    }

    Ok(resampled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(freq: f32, rate: u32, seconds: f32) -> Array2<f32> {
        let n = (rate as f32 * seconds) as usize;
        Array2::from_shape_fn((n, 1), |(i, _)| (2.0 * PI * freq * i as f32 / rate as f32).sin())
    }

    #[test]
    fn same_rate_is_identity() {
        let input = sine(440.0, 8000, 0.1);
        let out = resample(input.clone(), 8000, 8000).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn output_length_follows_ratio() {
        let out = resample(sine(440.0, 22050, 0.5), 22050, 44100).unwrap();
        assert_eq!(out.nrows(), 22050);
        assert_eq!(out.ncols(), 1);
    }

    #[test]
    fn keeps_channels_separate() {
        let n = 4000;
        let input = Array2::from_shape_fn((n, 2), |(i, c)| {
            if c == 0 {
                0.0
            } else {
                (2.0 * PI * 200.0 * i as f32 / 8000.0).sin()
            }
        });
        let out = resample(input, 8000, 16000).unwrap();
        let silent_peak = out.column(0).iter().fold(0.0f32, |m, v| m.max(v.abs()));
        let tone_peak = out.column(1).iter().fold(0.0f32, |m, v| m.max(v.abs()));
        assert!(silent_peak < 1e-6, "channel 0 leaked: {silent_peak}");
        assert!(tone_peak > 0.5, "channel 1 lost: {tone_peak}");
    }

    #[test]
    fn downsampling_suppresses_content_above_new_nyquist() {
        // 7 kHz tone at 32 kHz, downsampled to 8 kHz (Nyquist 4 kHz).
        let out = resample(sine(7000.0, 32000, 0.5), 32000, 8000).unwrap();
        let interior = out.slice(ndarray::s![200..out.nrows() - 200, 0]);
        let rms = (interior.iter().map(|v| v * v).sum::<f32>() / interior.len() as f32).sqrt();
        assert!(rms < 0.05, "aliased energy survived: rms={rms}");
    }
}
