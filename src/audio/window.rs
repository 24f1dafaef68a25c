use std::f32::consts::PI;

use crate::params::WindowType;

/// Periodic (FFT-friendly) window of length `size`.
pub fn window(kind: WindowType, size: usize) -> Vec<f32> {
    if size == 0 {
        return Vec::new();
    }
    if size == 1 {
        return vec![1.0];
    }

    match kind {
        WindowType::Hann => cosine_sum(size, &[0.5, 0.5]),
        WindowType::Hamming => cosine_sum(size, &[0.54, 0.46]),
        WindowType::Boxcar => vec![1.0; size],
        WindowType::Blackman => cosine_sum(size, &[0.42, 0.5, 0.08]),
        WindowType::BlackmanHarris => cosine_sum(size, &[0.35875, 0.48829, 0.14128, 0.01168]),
        WindowType::Nuttall => cosine_sum(size, &[0.3635819, 0.4891775, 0.1365995, 0.0106411]),
        WindowType::Flattop => cosine_sum(
            size,
            &[0.21557895, 0.41663158, 0.277263158, 0.083578947, 0.006947368],
        ),
        WindowType::Bartlett => (0..size)
            .map(|i| 1.0 - (2.0 * i as f32 / size as f32 - 1.0).abs())
            .collect(),
        WindowType::Triang => {
            let half = (size + 2) as f32 / 2.0;
            let centre = size as f32 / 2.0;
            (0..size)
                .map(|i| 1.0 - ((i as f32 - centre) / half).abs())
                .collect()
        }
    }
}

/// `w[i] = a0 - a1 cos(2πi/N) + a2 cos(4πi/N) - ...`
fn cosine_sum(size: usize, coeffs: &[f32]) -> Vec<f32> {
    (0..size)
        .map(|i| {
            let phase = 2.0 * PI * i as f32 / size as f32;
            coeffs
                .iter()
                .enumerate()
                .map(|(k, &a)| {
                    let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
                    sign * a * (k as f32 * phase).cos()
                })
                .sum()
        })
        .collect()
}
