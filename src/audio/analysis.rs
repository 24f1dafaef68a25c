use ndarray::{Array3, Axis};
use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};

use super::window::window;
use super::WaveformSlice;
use crate::error::{Error, Result};
use crate::params::WindowType;

/// Magnitude spectrogram, `channel × frequency × time`.
#[derive(Debug, Clone)]
pub struct Spectrogram {
    pub data: Array3<f32>,
    pub samplerate: u32,
    pub window_length: usize,
    pub hop_length: usize,
    pub start_time: f64,
    /// Known value range of `data`, used by absolute normalization. Absent
    /// straight out of the transform.
    pub bounds: Option<(f32, f32)>,
}

impl Spectrogram {
    pub fn num_channels(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn num_bins(&self) -> usize {
        self.data.len_of(Axis(1))
    }

    pub fn num_frames(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    /// Frames per second.
    pub fn frame_rate(&self) -> f64 {
        self.samplerate as f64 / self.hop_length as f64
    }

    pub fn bin_frequency(&self, bin: usize) -> f64 {
        bin as f64 * self.samplerate as f64 / self.window_length as f64
    }

    pub fn frame_time(&self, frame: usize) -> f64 {
        self.start_time + (frame * self.hop_length) as f64 / self.samplerate as f64
    }
}

/// Largest FFT frame, in samples.
pub const MAX_WINDOW_LENGTH: usize = 1 << 20;

/// Frame and hop lengths in samples for a window of `window_size` seconds
/// and a hop of `hop_size` windows.
pub fn frame_geometry(window_size: f64, hop_size: f64, samplerate: u32) -> (usize, usize) {
    let window_length = ((window_size * samplerate as f64).round() as usize).max(1);
    let hop_length = ((hop_size * window_length as f64).round() as usize).max(1);
    (window_length, hop_length)
}

/// Short-time Fourier magnitude of every channel in `slice`.
///
/// Frames start at multiples of the hop; the last frame is zero-padded so
/// every sample is covered, and a slice shorter than one window yields a
/// single padded frame. Magnitudes are divided by the window sum so a
/// full-scale sinusoid peaks near 0.5.
pub fn transform(
    slice: WaveformSlice,
    window_size: f64,
    hop_size: f64,
    window_type: WindowType,
) -> Result<Spectrogram> {
    if !window_size.is_finite() || window_size <= 0.0 {
        return Err(Error::invalid(format!("window_size must be positive, got {window_size}")));
    }
    if !hop_size.is_finite() || hop_size <= 0.0 || hop_size > 1.0 {
        return Err(Error::invalid(format!("hop_size must be in (0, 1], got {hop_size}")));
    }

    let requested = window_size * slice.samplerate as f64;
    if requested > MAX_WINDOW_LENGTH as f64 {
        return Err(Error::invalid(format!(
            "window of {window_size}s at {}Hz is {requested:.0} samples, more than {MAX_WINDOW_LENGTH}",
            slice.samplerate
        )));
    }

    let (window_length, hop_length) = frame_geometry(window_size, hop_size, slice.samplerate);
    let n = slice.num_samples();
    let num_frames = 1 + n.saturating_sub(window_length).div_ceil(hop_length);
    let num_bins = window_length / 2 + 1;

    let taper = window(window_type, window_length);
    let window_sum: f32 = taper.iter().sum();
    let norm = if window_sum > 0.0 { 1.0 / window_sum } else { 1.0 };

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(window_length);

    let mut data = Array3::<f32>::zeros((slice.num_channels(), num_bins, num_frames));

    for (channel, samples) in slice.samples.columns().into_iter().enumerate() {
        let samples = samples.to_vec();
        let columns: Vec<Vec<f32>> = (0..num_frames)
            .into_par_iter()
            .map(|frame| {
                let start = frame * hop_length;
                let end = (start + window_length).min(n);

                let mut buffer = vec![Complex::new(0.0f32, 0.0); window_length];
                if start < end {
                    for (i, &s) in samples[start..end].iter().enumerate() {
                        buffer[i] = Complex::new(s * taper[i], 0.0);
                    }
                }
                fft.process(&mut buffer);

                buffer[..num_bins].iter().map(|c| c.norm() * norm).collect()
            })
            .collect();

        let mut plane = data.index_axis_mut(Axis(0), channel);
        for (frame, magnitudes) in columns.into_iter().enumerate() {
            for (bin, mag) in magnitudes.into_iter().enumerate() {
                plane[[bin, frame]] = mag;
            }
        }
    }

    log::debug!(
        "STFT: window={} hop={} ({}), {} bins x {} frames",
        window_length,
        hop_length,
        window_type,
        num_bins,
        num_frames
    );

    Ok(Spectrogram {
        data,
        samplerate: slice.samplerate,
        window_length,
        hop_length,
        start_time: slice.start_time,
        bounds: None,
    })
}
