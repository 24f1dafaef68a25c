//! Request parameters for audio loading and spectrogram computation.
//!
//! Both structs carry serde defaults so they can be deserialized from a
//! partially filled config table or query string, and both validate their
//! domain before any pipeline stage runs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::render::colormap::Colormap;

/// Highest accepted resampling target.
pub const MAX_TARGET_SAMPLERATE: u32 = 1_000_000;

/// Highest accepted Butterworth order.
pub const MAX_FILTER_ORDER: u32 = 32;

/// Longest accepted analysis window, in seconds.
pub const MAX_WINDOW_SIZE: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioParameters {
    /// Resample the loaded slice to `target_samplerate`.
    pub resample: bool,
    pub target_samplerate: u32,
    /// High-pass cutoff in Hz.
    pub low_freq: Option<f64>,
    /// Low-pass cutoff in Hz.
    pub high_freq: Option<f64>,
    /// Butterworth filter order.
    pub filter_order: u32,
}

impl Default for AudioParameters {
    fn default() -> Self {
        Self {
            resample: false,
            target_samplerate: 44100,
            low_freq: None,
            high_freq: None,
            filter_order: 5,
        }
    }
}

impl AudioParameters {
    pub fn validate(&self) -> Result<()> {
        if self.target_samplerate == 0 || self.target_samplerate > MAX_TARGET_SAMPLERATE {
            return Err(Error::invalid(format!(
                "target_samplerate must be in 1..={MAX_TARGET_SAMPLERATE} Hz, got {}",
                self.target_samplerate
            )));
        }
        if self.filter_order == 0 || self.filter_order > MAX_FILTER_ORDER {
            return Err(Error::invalid(format!(
                "filter_order must be in 1..={MAX_FILTER_ORDER}, got {}",
                self.filter_order
            )));
        }
        for (name, freq) in [("low_freq", self.low_freq), ("high_freq", self.high_freq)] {
            if let Some(f) = freq {
                if !f.is_finite() || f <= 0.0 {
                    return Err(Error::invalid(format!("{name} must be a positive frequency, got {f}")));
                }
            }
        }
        if let (Some(low), Some(high)) = (self.low_freq, self.high_freq) {
            if low >= high {
                return Err(Error::invalid(format!(
                    "low_freq ({low} Hz) must be below high_freq ({high} Hz)"
                )));
            }
        }
        Ok(())
    }

    pub fn has_filter(&self) -> bool {
        self.low_freq.is_some() || self.high_freq.is_some()
    }
}

/// Window function applied to each frame before the FFT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowType {
    Hann,
    Hamming,
    Boxcar,
    Blackman,
    BlackmanHarris,
    Bartlett,
    Triang,
    Flattop,
    Nuttall,
}

impl WindowType {
    pub const ALL: [WindowType; 9] = [
        WindowType::Hann,
        WindowType::Hamming,
        WindowType::Boxcar,
        WindowType::Blackman,
        WindowType::BlackmanHarris,
        WindowType::Bartlett,
        WindowType::Triang,
        WindowType::Flattop,
        WindowType::Nuttall,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            WindowType::Hann => "hann",
            WindowType::Hamming => "hamming",
            WindowType::Boxcar => "boxcar",
            WindowType::Blackman => "blackman",
            WindowType::BlackmanHarris => "blackmanharris",
            WindowType::Bartlett => "bartlett",
            WindowType::Triang => "triang",
            WindowType::Flattop => "flattop",
            WindowType::Nuttall => "nuttall",
        }
    }
}

impl fmt::Display for WindowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WindowType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "hanning" => return Ok(WindowType::Hann),
            "rectangular" | "boxcar" | "rect" => return Ok(WindowType::Boxcar),
            _ => {}
        }
        WindowType::ALL
            .iter()
            .copied()
            .find(|w| w.name() == lower)
            .ok_or_else(|| {
                Error::invalid(format!(
                    "unknown window type '{}'. Valid names: {}",
                    s,
                    WindowType::ALL.iter().map(|w| w.name()).collect::<Vec<_>>().join(", ")
                ))
            })
    }
}

/// Amplitude scale of the output spectrogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scale {
    #[serde(rename = "amplitude")]
    Amplitude,
    #[serde(rename = "power")]
    Power,
    #[serde(rename = "dB", alias = "db")]
    Decibel,
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Scale::Amplitude => "amplitude",
            Scale::Power => "power",
            Scale::Decibel => "dB",
        })
    }
}

impl FromStr for Scale {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "amplitude" => Ok(Scale::Amplitude),
            "power" => Ok(Scale::Power),
            "db" => Ok(Scale::Decibel),
            _ => Err(Error::invalid(format!(
                "unknown scale '{s}'. Valid names: amplitude, power, dB"
            ))),
        }
    }
}

/// How the normalization stage chooses its min/max.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizeMode {
    /// Recompute extrema from the current array.
    #[default]
    Relative,
    /// Use the spectrogram's attached bounds, falling back to relative.
    Absolute,
}

impl FromStr for NormalizeMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "relative" => Ok(NormalizeMode::Relative),
            "absolute" => Ok(NormalizeMode::Absolute),
            _ => Err(Error::invalid(format!(
                "unknown normalize mode '{s}'. Valid names: relative, absolute"
            ))),
        }
    }
}

/// Per-channel energy normalization constants (librosa defaults).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PcenParameters {
    /// Smoother time constant in seconds.
    pub time_constant: f64,
    pub gain: f64,
    pub bias: f64,
    pub power: f64,
    pub eps: f64,
}

impl Default for PcenParameters {
    fn default() -> Self {
        Self {
            time_constant: 0.4,
            gain: 0.98,
            bias: 2.0,
            power: 0.5,
            eps: 1e-6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[allow(non_snake_case)]
pub struct SpectrogramParameters {
    /// Frame length in seconds.
    pub window_size: f64,
    /// Hop as a fraction of the window, in (0, 1].
    pub hop_size: f64,
    pub window_type: WindowType,
    pub scale: Scale,
    pub normalize: bool,
    pub normalize_mode: NormalizeMode,
    pub pcen: bool,
    pub pcen_parameters: PcenParameters,
    pub clamp: bool,
    pub min_dB: f64,
    pub max_dB: f64,
    pub cmap: String,
    pub channel: usize,
}

impl Default for SpectrogramParameters {
    fn default() -> Self {
        Self {
            window_size: 0.025,
            hop_size: 0.5,
            window_type: WindowType::Hann,
            scale: Scale::Decibel,
            normalize: true,
            normalize_mode: NormalizeMode::Relative,
            pcen: false,
            pcen_parameters: PcenParameters::default(),
            clamp: false,
            min_dB: -100.0,
            max_dB: 0.0,
            cmap: "viridis".into(),
            channel: 0,
        }
    }
}

impl SpectrogramParameters {
    pub fn validate(&self) -> Result<()> {
        if !(self.window_size > 0.0 && self.window_size <= MAX_WINDOW_SIZE) {
            return Err(Error::invalid(format!(
                "window_size must be in (0, {MAX_WINDOW_SIZE}] seconds, got {}",
                self.window_size
            )));
        }
        if !self.hop_size.is_finite() || self.hop_size <= 0.0 || self.hop_size > 1.0 {
            return Err(Error::invalid(format!(
                "hop_size must be a fraction of the window in (0, 1], got {}",
                self.hop_size
            )));
        }
        if !self.min_dB.is_finite() || !self.max_dB.is_finite() {
            return Err(Error::invalid("min_dB and max_dB must be finite"));
        }
        if self.clamp && self.min_dB > self.max_dB {
            return Err(Error::invalid(format!(
                "min_dB ({}) must not exceed max_dB ({})",
                self.min_dB, self.max_dB
            )));
        }
        let pcen = &self.pcen_parameters;
        let positive = |x: f64| x > 0.0 && x.is_finite();
        let pcen_ok = positive(pcen.time_constant)
            && positive(pcen.eps)
            && positive(pcen.power)
            && pcen.gain.is_finite()
            && pcen.bias.is_finite();
        if self.pcen && !pcen_ok {
            return Err(Error::invalid(
                "pcen time_constant, eps and power must be positive and finite",
            ));
        }
        Colormap::from_name(&self.cmap)?;
        Ok(())
    }
}
