//! Butterworth filter design as second-order sections, applied zero-phase.
//!
//! Design follows the classic analog-prototype route: Butterworth poles on
//! the unit circle, frequency transform to the requested band, then the
//! bilinear transform with pre-warped cutoffs.
//!
//! Signals are padded by odd reflection before the forward-backward pass, so
//! each output endpoint equals the input sample there. A stopband tone is
//! therefore only suppressed away from the edges; the last few frames of a
//! filtered spectrogram still show it.

use ndarray::Array2;
use rustfft::num_complex::Complex64;
use std::f64::consts::PI;
use std::fmt;

use super::AudioError;
use crate::params::MAX_FILTER_ORDER;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Band {
    Lowpass(f64),
    Highpass(f64),
    Bandpass(f64, f64),
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Band::Lowpass(hz) => write!(f, "lowpass {hz}Hz"),
            Band::Highpass(hz) => write!(f, "highpass {hz}Hz"),
            Band::Bandpass(lo, hi) => write!(f, "bandpass {lo}-{hi}Hz"),
        }
    }
}

/// Direct-form II transposed biquad, `a[0]` normalized to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Section {
    b: [f64; 3],
    a: [f64; 3],
}

impl Section {
    fn response(&self, z: Complex64) -> Complex64 {
        let zi = z.inv();
        let num = self.b[0] + zi * (self.b[1] + zi * self.b[2]);
        let den = self.a[0] + zi * (self.a[1] + zi * self.a[2]);
        num / den
    }

    fn dc_gain(&self) -> f64 {
        let den: f64 = self.a.iter().sum();
        if den.abs() < f64::EPSILON {
            0.0
        } else {
            self.b.iter().sum::<f64>() / den
        }
    }
}

#[derive(Debug, Clone)]
pub struct Butterworth {
    order: u32,
    band: Band,
    sections: Vec<Section>,
}

impl fmt::Display for Butterworth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "order-{} Butterworth {} ({} sections)",
            self.order,
            self.band,
            self.sections.len()
        )
    }
}

impl Butterworth {
    /// Bandpass if both cutoffs are set, highpass for `low` only, lowpass
    /// for `high` only.
    pub fn design(
        order: u32,
        low: Option<f64>,
        high: Option<f64>,
        samplerate: f64,
    ) -> Result<Self, AudioError> {
        let band = match (low, high) {
            (Some(lo), Some(hi)) => Band::Bandpass(lo, hi),
            (Some(lo), None) => Band::Highpass(lo),
            (None, Some(hi)) => Band::Lowpass(hi),
            (None, None) => {
                return Err(AudioError::Parameter(
                    "a filter needs low_freq, high_freq or both".into(),
                ))
            }
        };
        if order == 0 || order > MAX_FILTER_ORDER {
            return Err(AudioError::Parameter(format!(
                "filter_order must be in 1..={MAX_FILTER_ORDER}, got {order}"
            )));
        }

        let nyquist = samplerate / 2.0;
        let check = |hz: f64| {
            if hz.is_finite() && hz > 0.0 && hz < nyquist {
                Ok(())
            } else {
                Err(AudioError::Parameter(format!(
                    "cutoff {hz}Hz must lie strictly between 0 and the Nyquist frequency {nyquist}Hz"
                )))
            }
        };

        let fs2 = 2.0 * samplerate;
        let warp = |hz: f64| fs2 * (PI * hz / samplerate).tan();
        let prototype = prototype_poles(order);

        let (analog_poles, zero_kind, reference) = match band {
            Band::Lowpass(hz) => {
                check(hz)?;
                let wo = warp(hz);
                let poles = prototype.iter().map(|&p| p * wo).collect::<Vec<_>>();
                (poles, Zeros::AtMinusOne, Complex64::new(1.0, 0.0))
            }
            Band::Highpass(hz) => {
                check(hz)?;
                let wo = warp(hz);
                let poles = prototype.iter().map(|&p| wo / p).collect::<Vec<_>>();
                (poles, Zeros::AtPlusOne, Complex64::new(-1.0, 0.0))
            }
            Band::Bandpass(lo, hi) => {
                check(lo)?;
                check(hi)?;
                if lo >= hi {
                    return Err(AudioError::Parameter(format!(
                        "bandpass low cutoff {lo}Hz must be below high cutoff {hi}Hz"
                    )));
                }
                let (w1, w2) = (warp(lo), warp(hi));
                let wo = (w1 * w2).sqrt();
                let bw = w2 - w1;
                let mut poles = Vec::with_capacity(prototype.len() * 2);
                for &p in &prototype {
                    let p_lp = p * (bw / 2.0);
                    let disc = (p_lp * p_lp - wo * wo).sqrt();
                    poles.push(p_lp + disc);
                    poles.push(p_lp - disc);
                }
                let centre = 2.0 * (wo / fs2).atan();
                (poles, Zeros::Both, Complex64::from_polar(1.0, centre))
            }
        };

        let digital_poles: Vec<Complex64> = analog_poles
            .iter()
            .map(|&p| (fs2 + p) / (fs2 - p))
            .collect();

        let mut sections = pair_sections(&digital_poles, zero_kind);
        for section in &mut sections {
            let gain = section.response(reference).norm();
            if gain > 0.0 && gain.is_finite() {
                section.b.iter_mut().for_each(|b| *b /= gain);
            }
        }

        Ok(Self {
            order,
            band,
            sections,
        })
    }

    pub fn band(&self) -> Band {
        self.band
    }

    /// Magnitude response at `hz`.
    pub fn gain_at(&self, hz: f64, samplerate: f64) -> f64 {
        let z = Complex64::from_polar(1.0, 2.0 * PI * hz / samplerate);
        self.sections
            .iter()
            .map(|s| s.response(z))
            .fold(Complex64::new(1.0, 0.0), |acc, h| acc * h)
            .norm()
    }

    /// Filter each column of `samples` forward and backward (zero phase).
    pub fn apply(&self, samples: &mut Array2<f32>) {
        for mut column in samples.columns_mut() {
            let mut signal: Vec<f64> = column.iter().map(|&v| v as f64).collect();
            self.filtfilt(&mut signal);
            column
                .iter_mut()
                .zip(signal)
                .for_each(|(dst, v)| *dst = v as f32);
        }
    }

    fn filtfilt(&self, signal: &mut [f64]) {
        let n = signal.len();
        if n == 0 {
            return;
        }
        let pad = (3 * (2 * self.sections.len() + 1)).min(n - 1);
        let mut padded = odd_extend(signal, pad);

        self.run_sections(&mut padded);
        padded.reverse();
        self.run_sections(&mut padded);
        padded.reverse();

        signal.copy_from_slice(&padded[pad..pad + n]);
    }

    /// Cascade through all sections, each starting in the steady state for
    /// the first input sample to avoid an onset transient.
    fn run_sections(&self, x: &mut [f64]) {
        let Some(&first) = x.first() else {
            return;
        };
        let mut level = first;
        for s in &self.sections {
            let settled = s.dc_gain() * level;
            let mut z2 = s.b[2] * level - s.a[2] * settled;
            let mut z1 = s.b[1] * level - s.a[1] * settled + z2;
            for v in x.iter_mut() {
                let input = *v;
                let out = s.b[0] * input + z1;
                z1 = s.b[1] * input - s.a[1] * out + z2;
                z2 = s.b[2] * input - s.a[2] * out;
                *v = out;
            }
            level = settled;
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Zeros {
    AtMinusOne,
    AtPlusOne,
    Both,
}

/// Left-half-plane poles of the order-`n` analog Butterworth prototype.
fn prototype_poles(n: u32) -> Vec<Complex64> {
    let n = n as i64;
    (0..n)
        .map(|k| {
            let m = (-n + 1 + 2 * k) as f64;
            -Complex64::from_polar(1.0, PI * m / (2 * n) as f64)
        })
        .collect()
}

fn pair_sections(poles: &[Complex64], zeros: Zeros) -> Vec<Section> {
    const IMAG_EPS: f64 = 1e-10;

    let mut sections = Vec::new();
    let mut real: Vec<f64> = Vec::new();

    for p in poles {
        if p.im > IMAG_EPS {
            sections.push(Section {
                b: second_order_zeros(zeros),
                a: [1.0, -2.0 * p.re, p.norm_sqr()],
            });
        } else if p.im.abs() <= IMAG_EPS {
            real.push(p.re);
        }
    }

    for pair in real.chunks(2) {
        match pair {
            &[r1, r2] => sections.push(Section {
                b: second_order_zeros(zeros),
                a: [1.0, -(r1 + r2), r1 * r2],
            }),
            &[r] => {
                let b = match zeros {
                    Zeros::AtMinusOne => [1.0, 1.0, 0.0],
                    Zeros::AtPlusOne => [1.0, -1.0, 0.0],
                    // Bandpass poles always come in pairs.
                    Zeros::Both => [1.0, 0.0, 0.0],
                };
                sections.push(Section {
                    b,
                    a: [1.0, -r, 0.0],
                });
            }
            _ => {}
        }
    }

    sections
}

fn second_order_zeros(zeros: Zeros) -> [f64; 3] {
    match zeros {
        Zeros::AtMinusOne => [1.0, 2.0, 1.0],
        Zeros::AtPlusOne => [1.0, -2.0, 1.0],
        Zeros::Both => [1.0, 0.0, -1.0],
    }
}

/// Point-reflect `pad` samples about each end of the signal.
fn odd_extend(signal: &[f64], pad: usize) -> Vec<f64> {
    let n = signal.len();
    let mut out = Vec::with_capacity(n + 2 * pad);
    let head = signal[0];
    let tail = signal[n - 1];
    for i in (1..=pad).rev() {
        out.push(2.0 * head - signal[i]);
    }
    out.extend_from_slice(signal);
    for i in 1..=pad {
        out.push(2.0 * tail - signal[n - 1 - i]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: f64 = 8000.0;

    fn tone(freq: f64, n: usize) -> Array2<f32> {
        Array2::from_shape_fn((n, 1), |(i, _)| (2.0 * PI * freq * i as f64 / RATE).sin() as f32)
    }

    fn rms(samples: &Array2<f32>) -> f32 {
        let n = samples.len() as f32;
        (samples.iter().map(|v| v * v).sum::<f32>() / n).sqrt()
    }

    #[test]
    fn lowpass_has_unity_dc_and_half_power_at_cutoff() {
        let f = Butterworth::design(5, None, Some(1000.0), RATE).unwrap();
        assert!((f.gain_at(0.0, RATE) - 1.0).abs() < 1e-9);
        let cutoff = f.gain_at(1000.0, RATE);
        assert!((cutoff - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-6, "{cutoff}");
        assert!(f.gain_at(3000.0, RATE) < 1e-3);
    }

    #[test]
    fn highpass_blocks_dc() {
        let f = Butterworth::design(4, Some(500.0), None, RATE).unwrap();
        assert!(f.gain_at(0.0, RATE) < 1e-9);
        assert!((f.gain_at(RATE / 2.0 - 1.0, RATE) - 1.0).abs() < 1e-3);
    }

    #[test]
    fn bandpass_passes_centre_and_rejects_edges() {
        let f = Butterworth::design(3, Some(1000.0), Some(2000.0), RATE).unwrap();
        assert_eq!(f.band(), Band::Bandpass(1000.0, 2000.0));
        let mid = f.gain_at(1450.0, RATE);
        assert!(mid > 0.95, "{mid}");
        assert!(f.gain_at(100.0, RATE) < 0.01);
        assert!(f.gain_at(3800.0, RATE) < 0.01);
    }

    #[test]
    fn odd_order_lowpass_has_first_order_section() {
        let f = Butterworth::design(3, None, Some(1000.0), RATE).unwrap();
        assert_eq!(f.sections.len(), 2);
    }

    #[test]
    fn filtering_attenuates_stopband_tone() {
        let f = Butterworth::design(5, None, Some(500.0), RATE).unwrap();
        let mut passed = tone(100.0, 4000);
        let mut blocked = tone(2500.0, 4000);
        f.apply(&mut passed);
        f.apply(&mut blocked);
        // Edges follow the input; see `edges_are_pinned_to_input`.
        let interior = |a: &Array2<f32>| rms(&a.slice(ndarray::s![400..3600, ..]).to_owned());
        assert!(interior(&passed) > 0.65, "passband lost: {}", interior(&passed));
        assert!(interior(&blocked) < 1e-4, "stopband leaked: {}", interior(&blocked));
    }

    #[test]
    fn edges_are_pinned_to_input() {
        let f = Butterworth::design(5, None, Some(500.0), RATE).unwrap();
        let input = tone(2500.0, 4000);
        let mut output = input.clone();
        f.apply(&mut output);
        let (last_in, last_out) = (input[[3999, 0]], output[[3999, 0]]);
        assert!(last_in.abs() > 0.5);
        assert!((last_out - last_in).abs() < 0.05, "last sample {last_out} vs {last_in}");
        let tail = rms(&output.slice(ndarray::s![3800.., ..]).to_owned());
        assert!(tail > 0.01, "tail rms {tail}");
    }

    #[test]
    fn rejects_excessive_order() {
        let err = Butterworth::design(MAX_FILTER_ORDER + 1, None, Some(500.0), RATE).unwrap_err();
        assert!(matches!(err, AudioError::Parameter(_)));
        assert!(Butterworth::design(MAX_FILTER_ORDER, None, Some(500.0), RATE).is_ok());
    }

    #[test]
    fn rejects_cutoff_above_nyquist() {
        let err = Butterworth::design(5, None, Some(5000.0), RATE).unwrap_err();
        assert!(matches!(err, AudioError::Parameter(_)));
    }

    #[test]
    fn tiny_signals_do_not_panic() {
        let f = Butterworth::design(2, Some(100.0), None, RATE).unwrap();
        let mut one = Array2::from_elem((1, 1), 0.5f32);
        f.apply(&mut one);
        let mut empty = Array2::<f32>::zeros((0, 1));
        f.apply(&mut empty);
    }

    #[test]
    fn odd_extend_reflects_about_endpoints() {
        let out = odd_extend(&[1.0, 2.0, 4.0], 2);
        assert_eq!(out, vec![-2.0, 0.0, 1.0, 2.0, 4.0, 6.0, 7.0]);
    }
}
