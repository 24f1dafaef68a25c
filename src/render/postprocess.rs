//! Ordered numeric stages applied to a raw magnitude spectrogram.
//!
//! The chain only accepts stages in rank order (denoise, normalize, scale,
//! clamp), so PCEN can never see dB-scaled data. After the stages run the
//! chain squeezes the channel axis and fits the result to `[0, 1]` for the
//! colormap.

use ndarray::{Array, Array2, Axis, Dimension, Zip};
use std::fmt;

use crate::audio::analysis::Spectrogram;
use crate::error::{Error, Result};
use crate::params::{NormalizeMode, PcenParameters, Scale, SpectrogramParameters};

/// Smallest amplitude fed to the logarithm; 1e-10 is -200 dB.
pub const AMPLITUDE_FLOOR: f32 = 1e-10;

/// Stage identity, ordered by the position it must occupy in a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StageKind {
    Denoise,
    Normalize,
    Scale,
    Clamp,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StageKind::Denoise => "denoise",
            StageKind::Normalize => "normalize",
            StageKind::Scale => "scale",
            StageKind::Clamp => "clamp",
        })
    }
}

/// A shape-preserving transformation of a spectrogram.
pub trait Stage: Send + Sync {
    fn kind(&self) -> StageKind;
    fn apply(&self, spectrogram: Spectrogram) -> Result<Spectrogram>;
}

/// Per-channel energy normalization, run on amplitude data.
#[derive(Debug, Clone)]
pub struct Pcen {
    pub params: PcenParameters,
}

impl Stage for Pcen {
    fn kind(&self) -> StageKind {
        StageKind::Denoise
    }

    fn apply(&self, mut spectrogram: Spectrogram) -> Result<Spectrogram> {
        let p = self.params;
        let t_frames = p.time_constant * spectrogram.frame_rate();
        let b = ((1.0 + 4.0 * t_frames * t_frames).sqrt() - 1.0) / (2.0 * t_frames * t_frames);
        let offset = p.bias.powf(p.power);

        for mut plane in spectrogram.data.outer_iter_mut() {
            for mut row in plane.rows_mut() {
                let mut smooth = row.get(0).map_or(0.0, |&v| v as f64);
                for v in row.iter_mut() {
                    let s = *v as f64;
                    smooth = (1.0 - b) * smooth + b * s;
                    let agc = (p.eps + smooth).powf(p.gain);
                    *v = ((s / agc + p.bias).powf(p.power) - offset) as f32;
                }
            }
        }

        spectrogram.bounds = None;
        Ok(spectrogram)
    }
}

#[derive(Debug, Clone)]
pub struct Normalize {
    pub mode: NormalizeMode,
}

impl Stage for Normalize {
    fn kind(&self) -> StageKind {
        StageKind::Normalize
    }

    fn apply(&self, mut spectrogram: Spectrogram) -> Result<Spectrogram> {
        let range = match (self.mode, spectrogram.bounds) {
            (NormalizeMode::Absolute, Some(bounds)) => Some(bounds),
            _ => extrema(&spectrogram.data),
        };
        normalize_in_place(&mut spectrogram.data, range);
        spectrogram.bounds = Some((0.0, 1.0));
        Ok(spectrogram)
    }
}

#[derive(Debug, Clone)]
pub struct Rescale {
    pub scale: Scale,
}

impl Stage for Rescale {
    fn kind(&self) -> StageKind {
        StageKind::Scale
    }

    fn apply(&self, mut spectrogram: Spectrogram) -> Result<Spectrogram> {
        let f = scale_fn(self.scale);
        spectrogram.data.mapv_inplace(f);
        spectrogram.bounds = spectrogram.bounds.map(|(lo, hi)| {
            let (a, b) = (f(lo), f(hi));
            (a.min(b), a.max(b))
        });
        Ok(spectrogram)
    }
}

#[derive(Debug, Clone)]
pub struct Clamp {
    pub min: f32,
    pub max: f32,
}

impl Stage for Clamp {
    fn kind(&self) -> StageKind {
        StageKind::Clamp
    }

    fn apply(&self, mut spectrogram: Spectrogram) -> Result<Spectrogram> {
        clamp_in_place(&mut spectrogram.data, self.min, self.max);
        spectrogram.bounds = Some((self.min, self.max));
        Ok(spectrogram)
    }
}

#[derive(Default)]
pub struct PostProcessChain {
    stages: Vec<Box<dyn Stage>>,
}

impl PostProcessChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain for one request. The scale stage is always present; the
    /// others follow their flags.
    pub fn from_parameters(params: &SpectrogramParameters) -> Result<Self> {
        let mut chain = Self::new();
        if params.pcen {
            chain.push(Box::new(Pcen {
                params: params.pcen_parameters,
            }))?;
        }
        if params.normalize {
            chain.push(Box::new(Normalize {
                mode: params.normalize_mode,
            }))?;
        }
        chain.push(Box::new(Rescale {
            scale: params.scale,
        }))?;
        if params.clamp {
            chain.push(Box::new(Clamp {
                min: params.min_dB as f32,
                max: params.max_dB as f32,
            }))?;
        }
        Ok(chain)
    }

    /// Append a stage. Fails if the stage ranks at or before the last one.
    pub fn push(&mut self, stage: Box<dyn Stage>) -> Result<()> {
        if let Some(last) = self.stages.last() {
            if stage.kind() <= last.kind() {
                return Err(Error::invalid(format!(
                    "stage '{}' cannot run after '{}'",
                    stage.kind(),
                    last.kind()
                )));
            }
        }
        self.stages.push(stage);
        Ok(())
    }

    pub fn kinds(&self) -> Vec<StageKind> {
        self.stages.iter().map(|s| s.kind()).collect()
    }

    pub fn run(&self, spectrogram: Spectrogram) -> Result<Array2<f32>> {
        self.run_traced(spectrogram, |_, _| {})
    }

    /// Like [`run`](Self::run), calling `trace` after each stage.
    pub fn run_traced<F>(&self, mut spectrogram: Spectrogram, mut trace: F) -> Result<Array2<f32>>
    where
        F: FnMut(StageKind, &Spectrogram),
    {
        for stage in &self.stages {
            spectrogram = stage.apply(spectrogram)?;
            log::trace!("Stage {} done, bounds={:?}", stage.kind(), spectrogram.bounds);
            trace(stage.kind(), &spectrogram);
        }
        finalize(spectrogram)
    }
}

/// Drop the (single) channel axis and fit values to `[0, 1]`, using the
/// attached bounds when known.
pub fn finalize(spectrogram: Spectrogram) -> Result<Array2<f32>> {
    if spectrogram.num_channels() != 1 {
        return Err(Error::Internal(format!(
            "expected a single channel before rendering, got {}",
            spectrogram.num_channels()
        )));
    }
    let range = spectrogram.bounds.or_else(|| extrema(&spectrogram.data));
    let mut data = spectrogram.data.index_axis_move(Axis(0), 0);
    normalize_in_place(&mut data, range);
    Ok(data)
}

/// Finite min and max of `data`, or `None` when nothing is finite.
pub fn extrema<D: Dimension>(data: &Array<f32, D>) -> Option<(f32, f32)> {
    data.iter()
        .filter(|v| v.is_finite())
        .fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// Map `[lo, hi]` onto `[0, 1]`, clipping values outside the range. A flat
/// or missing range gives all zeros, as do non-finite values.
pub fn normalize_in_place<D: Dimension>(data: &mut Array<f32, D>, range: Option<(f32, f32)>) {
    match range {
        Some((lo, hi)) if hi > lo && (hi - lo).is_finite() => {
            let span = hi - lo;
            data.mapv_inplace(|v| {
                if v.is_finite() {
                    ((v - lo) / span).clamp(0.0, 1.0)
                } else {
                    0.0
                }
            });
        }
        _ => data.fill(0.0),
    }
}

pub fn normalize<D: Dimension>(data: &Array<f32, D>) -> Array<f32, D> {
    let mut out = data.clone();
    normalize_in_place(&mut out, extrema(data));
    out
}

pub fn clamp_in_place<D: Dimension>(data: &mut Array<f32, D>, lo: f32, hi: f32) {
    Zip::from(data).for_each(|v| *v = v.max(lo).min(hi));
}

pub fn clamp<D: Dimension>(data: &Array<f32, D>, lo: f32, hi: f32) -> Array<f32, D> {
    let mut out = data.clone();
    clamp_in_place(&mut out, lo, hi);
    out
}

fn scale_fn(scale: Scale) -> fn(f32) -> f32 {
    match scale {
        Scale::Amplitude => amplitude,
        Scale::Power => power,
        Scale::Decibel => decibel,
    }
}

fn amplitude(v: f32) -> f32 {
    v
}

fn power(v: f32) -> f32 {
    v * v
}

fn decibel(v: f32) -> f32 {
    20.0 * v.max(AMPLITUDE_FLOOR).log10()
}
