//! Named colour palettes as 256-entry RGBA lookup tables.
//!
//! Each palette is sampled from the matplotlib colormap of the same name at
//! evenly spaced stops and linearly interpolated between them. Appending
//! `_r` to any name reverses it.

use crate::error::{Error, Result};

type Rgb = [u8; 3];

const VIRIDIS: &[Rgb] = &[
    [68, 1, 84],
    [72, 36, 117],
    [65, 68, 135],
    [53, 95, 141],
    [42, 120, 142],
    [33, 145, 140],
    [34, 168, 132],
    [68, 191, 112],
    [122, 209, 81],
    [189, 223, 38],
    [253, 231, 37],
];

const MAGMA: &[Rgb] = &[
    [0, 0, 4],
    [20, 14, 54],
    [59, 15, 112],
    [100, 26, 128],
    [140, 41, 129],
    [183, 55, 121],
    [222, 73, 104],
    [247, 112, 92],
    [254, 159, 109],
    [254, 207, 146],
    [252, 253, 191],
];

const INFERNO: &[Rgb] = &[
    [0, 0, 4],
    [22, 11, 57],
    [66, 10, 104],
    [106, 23, 110],
    [147, 38, 103],
    [188, 55, 84],
    [221, 81, 58],
    [243, 118, 27],
    [252, 165, 10],
    [246, 215, 70],
    [252, 255, 164],
];

const PLASMA: &[Rgb] = &[
    [13, 8, 135],
    [65, 4, 157],
    [106, 0, 168],
    [143, 13, 164],
    [177, 42, 144],
    [204, 71, 120],
    [225, 100, 98],
    [242, 132, 75],
    [252, 166, 54],
    [252, 206, 37],
    [240, 249, 33],
];

const CIVIDIS: &[Rgb] = &[
    [0, 34, 78],
    [18, 53, 112],
    [59, 73, 108],
    [87, 93, 109],
    [112, 113, 115],
    [138, 134, 120],
    [165, 156, 116],
    [195, 179, 105],
    [225, 204, 85],
    [254, 232, 56],
    [255, 234, 70],
];

const GRAY: &[Rgb] = &[[0, 0, 0], [255, 255, 255]];

const PALETTES: &[(&str, &[Rgb])] = &[
    ("viridis", VIRIDIS),
    ("magma", MAGMA),
    ("inferno", INFERNO),
    ("plasma", PLASMA),
    ("cividis", CIVIDIS),
    ("gray", GRAY),
];

/// Names accepted by [`Colormap::from_name`], excluding `_r` variants and aliases.
pub fn palette_names() -> Vec<&'static str> {
    PALETTES.iter().map(|(name, _)| *name).collect()
}

#[derive(Debug, Clone)]
pub struct Colormap {
    name: String,
    lut: Vec<[u8; 4]>,
}

impl Colormap {
    pub fn from_name(name: &str) -> Result<Self> {
        let lower = name.trim().to_ascii_lowercase();
        let (base, reversed) = match lower.strip_suffix("_r") {
            Some(base) => (base, true),
            None => (lower.as_str(), false),
        };
        let base = match base {
            "grey" | "greys" | "grays" => "gray",
            other => other,
        };

        let stops = PALETTES
            .iter()
            .find(|(n, _)| *n == base)
            .map(|(_, stops)| *stops)
            .ok_or_else(|| {
                Error::invalid(format!(
                    "unknown colormap '{}'. Valid names: {} (append _r to reverse)",
                    name,
                    palette_names().join(", ")
                ))
            })?;

        let mut lut = build_lut(stops);
        if reversed {
            lut.reverse();
        }

        Ok(Self {
            name: lower,
            lut,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Colour for `value` in `[0, 1]`; out-of-range values saturate and NaN
    /// maps to the lowest entry.
    pub fn lookup(&self, value: f32) -> [u8; 4] {
        let v = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
        let idx = (v * (self.lut.len() - 1) as f32).round() as usize;
        self.lut[idx.min(self.lut.len() - 1)]
    }
}

fn build_lut(stops: &[Rgb]) -> Vec<[u8; 4]> {
    let segments = (stops.len() - 1) as f32;
    (0..256)
        .map(|i| {
            let t = i as f32 / 255.0 * segments;
            let lo = (t.floor() as usize).min(stops.len() - 2);
            let frac = t - lo as f32;
            let (a, b) = (stops[lo], stops[lo + 1]);
            let mix = |k: usize| (a[k] as f32 + (b[k] as f32 - a[k] as f32) * frac).round() as u8;
            [mix(0), mix(1), mix(2), 255]
        })
        .collect()
}
