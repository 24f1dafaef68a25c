use chirpgram::audio::{self, CancelToken, RecordingDescriptor};
use chirpgram::render::postprocess::extrema;
use chirpgram::{
    compute_array, compute_spectrogram, compute_spectrogram_cancellable, AudioParameters, Error,
    Scale, SpectrogramParameters, WindowType,
};
use std::f32::consts::PI;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

/// Write a 16-bit PCM WAV where `signal(frame, channel)` gives each sample.
fn write_wav(
    dir: &TempDir,
    name: &str,
    samplerate: u32,
    channels: u16,
    frames: usize,
    signal: impl Fn(usize, u16) -> f32,
) -> PathBuf {
    let path = dir.path().join(name);
    let spec = hound::WavSpec {
        channels,
        sample_rate: samplerate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for i in 0..frames {
        for c in 0..channels {
            let v = signal(i, c).clamp(-1.0, 1.0);
            writer.write_sample((v * i16::MAX as f32) as i16).unwrap();
        }
    }
    writer.finalize().unwrap();
    path
}

fn sine(freq: f32, samplerate: u32) -> impl Fn(usize, u16) -> f32 {
    move |i, _| 0.5 * (2.0 * PI * freq * i as f32 / samplerate as f32).sin()
}

fn probe(path: &Path) -> RecordingDescriptor {
    RecordingDescriptor::probe(path, 1.0).unwrap()
}

fn decode_png(bytes: &[u8]) -> (u32, u32, Vec<u8>) {
    let decoder = png::Decoder::new(bytes);
    let mut reader = decoder.read_info().unwrap();
    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buf).unwrap();
    buf.truncate(info.buffer_size());
    (info.width, info.height, buf)
}

#[test]
fn one_second_sine_in_decibels_spans_unit_range() {
    let dir = TempDir::new().unwrap();
    let path = write_wav(&dir, "sine.wav", 22050, 1, 22050, sine(3000.0, 22050));
    let recording = probe(&path);
    assert!((recording.duration - 1.0).abs() < 1e-9);

    let params = SpectrogramParameters {
        window_size: 0.025,
        hop_size: 0.5,
        window_type: WindowType::Hann,
        scale: Scale::Decibel,
        normalize: true,
        clamp: false,
        ..Default::default()
    };
    let data = compute_array(&recording, None, None, &AudioParameters::default(), &params).unwrap();

    let (bins, frames) = data.dim();
    assert_eq!(bins, 551 / 2 + 1);
    let expected = 1.0 / (0.025 * 0.5);
    assert!((frames as f64 - expected).abs() <= 1.0, "{frames} frames");
    assert!(data.iter().all(|v| v.is_finite()));
    assert_eq!(extrema(&data), Some((0.0, 1.0)));
}

#[test]
fn window_past_end_of_short_recording_is_out_of_bounds() {
    let dir = TempDir::new().unwrap();
    // 0.005 s at 8 kHz
    let path = write_wav(&dir, "short.wav", 8000, 1, 40, sine(1000.0, 8000));
    let recording = probe(&path);
    assert!((recording.duration - 0.005).abs() < 1e-9);

    let err = compute_spectrogram(
        &recording,
        Some(0.0),
        Some(0.01),
        &AudioParameters::default(),
        &SpectrogramParameters::default(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::OutOfBounds { .. }), "{err}");
    assert_eq!(err.status_code(), 400);
}

#[test]
fn png_dimensions_follow_spectrogram_shape() {
    let dir = TempDir::new().unwrap();
    let path = write_wav(&dir, "tone.wav", 8000, 1, 8000, sine(1000.0, 8000));
    let recording = probe(&path);
    let params = SpectrogramParameters::default();

    let data = compute_array(&recording, Some(0.25), Some(0.75), &AudioParameters::default(), &params)
        .unwrap();
    let png = compute_spectrogram(&recording, Some(0.25), Some(0.75), &AudioParameters::default(), &params)
        .unwrap();

    assert_eq!(&png[..8], &PNG_SIGNATURE);
    let (width, height, _) = decode_png(&png);
    assert_eq!(width as usize, data.ncols());
    assert_eq!(height as usize, data.nrows());
}

#[test]
fn silence_renders_in_a_single_colour() {
    let dir = TempDir::new().unwrap();
    let path = write_wav(&dir, "silence.wav", 8000, 1, 4000, |_, _| 0.0);
    let recording = probe(&path);
    let params = SpectrogramParameters {
        cmap: "viridis".into(),
        ..Default::default()
    };

    let data = compute_array(&recording, None, None, &AudioParameters::default(), &params).unwrap();
    assert!(data.iter().all(|&v| v == 0.0));

    let png = compute_spectrogram(&recording, None, None, &AudioParameters::default(), &params)
        .unwrap();
    let (_, _, pixels) = decode_png(&png);
    for px in pixels.chunks_exact(4) {
        assert_eq!(px, &[68, 1, 84, 255]);
    }
}

#[test]
fn channel_selects_the_requested_signal() {
    let dir = TempDir::new().unwrap();
    // Left carries a tone, right is silent.
    let tone = sine(1000.0, 8000);
    let path = write_wav(&dir, "stereo.wav", 8000, 2, 8000, move |i, c| {
        if c == 0 { tone(i, c) } else { 0.0 }
    });
    let recording = probe(&path);
    assert_eq!(recording.channels, 2);
    let audio_params = AudioParameters::default();

    let left = SpectrogramParameters { channel: 0, ..Default::default() };
    let data = compute_array(&recording, None, None, &audio_params, &left).unwrap();
    assert_eq!(extrema(&data), Some((0.0, 1.0)));

    let right = SpectrogramParameters { channel: 1, ..Default::default() };
    let data = compute_array(&recording, None, None, &audio_params, &right).unwrap();
    assert!(data.iter().all(|&v| v == 0.0));

    let missing = SpectrogramParameters { channel: 2, ..Default::default() };
    let err = compute_array(&recording, None, None, &audio_params, &missing).unwrap_err();
    assert!(matches!(err, Error::InvalidParameter(_)));
}

#[test]
fn partial_read_matches_full_read() {
    let dir = TempDir::new().unwrap();
    let path = write_wav(&dir, "chirp.wav", 8000, 1, 16000, |i, _| {
        let t = i as f32 / 8000.0;
        0.8 * (2.0 * PI * (200.0 + 400.0 * t) * t).sin()
    });
    let recording = probe(&path);
    let params = AudioParameters::default();
    let cancel = CancelToken::new();

    let full = audio::load(&recording, None, None, &params, &cancel).unwrap();
    let part = audio::load(&recording, Some(0.75), Some(1.25), &params, &cancel).unwrap();

    assert_eq!(full.num_samples(), 16000);
    assert_eq!(part.num_samples(), 4000);
    assert_eq!(part.samplerate, 8000);
    let expected = full.samples.slice(ndarray::s![6000..10000, ..]);
    assert_eq!(part.samples.view(), expected);
}

#[test]
fn time_expansion_scales_rate_and_duration() {
    let dir = TempDir::new().unwrap();
    // A 40 kHz call recorded 10x slowed at 8 kHz lands at 4 kHz in the file.
    let path = write_wav(&dir, "bat.wav", 8000, 1, 8000, sine(400.0, 8000));
    let recording = RecordingDescriptor::probe(&path, 10.0).unwrap();
    assert_eq!(recording.samplerate, 80000);
    assert!((recording.duration - 0.1).abs() < 1e-9);

    let slice = audio::load(
        &recording,
        Some(0.0),
        Some(0.05),
        &AudioParameters::default(),
        &CancelToken::new(),
    )
    .unwrap();
    assert_eq!(slice.samplerate, 80000);
    assert_eq!(slice.num_samples(), 4000);
    assert!((slice.duration() - 0.05).abs() < 1e-9);
}

#[test]
fn low_pass_removes_tone_above_cutoff() {
    let dir = TempDir::new().unwrap();
    let path = write_wav(&dir, "high.wav", 8000, 1, 8000, sine(3000.0, 8000));
    let recording = probe(&path);
    let cancel = CancelToken::new();

    let raw = audio::load(&recording, None, None, &AudioParameters::default(), &cancel).unwrap();
    let filtered_params = AudioParameters {
        high_freq: Some(500.0),
        ..Default::default()
    };
    let filtered = audio::load(&recording, None, None, &filtered_params, &cancel).unwrap();

    // Zero-phase filtering leaves each edge pinned to the input sample, so
    // only the interior is expected to be clean.
    let interior_rms = |s: &ndarray::Array2<f32>| {
        let view = s.slice(ndarray::s![500..7500, ..]);
        (view.iter().map(|v| v * v).sum::<f32>() / view.len() as f32).sqrt()
    };
    assert!(interior_rms(&filtered.samples) < interior_rms(&raw.samples) * 0.01);
}

#[test]
fn resampling_changes_rate_and_length() {
    let dir = TempDir::new().unwrap();
    let path = write_wav(&dir, "resample.wav", 16000, 1, 16000, sine(1000.0, 16000));
    let recording = probe(&path);
    let params = AudioParameters {
        resample: true,
        target_samplerate: 8000,
        ..Default::default()
    };
    let slice = audio::load(&recording, None, None, &params, &CancelToken::new()).unwrap();
    assert_eq!(slice.samplerate, 8000);
    assert_eq!(slice.num_samples(), 8000);
    assert!((slice.duration() - 1.0).abs() < 1e-9);
}

#[test]
fn missing_file_is_unavailable() {
    let dir = TempDir::new().unwrap();
    let err = RecordingDescriptor::probe(&dir.path().join("gone.wav"), 1.0).unwrap_err();
    let err = Error::from(err);
    assert!(matches!(err, Error::RecordingUnavailable(_)));
    assert_eq!(err.status_code(), 404);
}

#[test]
fn garbage_file_is_unsupported_format() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("notes.wav");
    std::fs::write(&path, b"this is not audio at all").unwrap();
    let err = Error::from(RecordingDescriptor::probe(&path, 1.0).unwrap_err());
    assert!(matches!(err, Error::UnsupportedFormat(_)));
    assert_eq!(err.status_code(), 415);
}

#[test]
fn cancelled_request_stops_reading() {
    let dir = TempDir::new().unwrap();
    let path = write_wav(&dir, "long.wav", 8000, 1, 8000, sine(1000.0, 8000));
    let recording = probe(&path);
    let cancel = CancelToken::new();
    cancel.cancel();

    let err = compute_spectrogram_cancellable(
        &recording,
        None,
        None,
        &AudioParameters::default(),
        &SpectrogramParameters::default(),
        &cancel,
    )
    .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
}

#[test]
fn invalid_parameters_fail_before_reading() {
    let dir = TempDir::new().unwrap();
    let path = write_wav(&dir, "tone.wav", 8000, 1, 800, sine(1000.0, 8000));
    let recording = probe(&path);

    let bad_cmap = SpectrogramParameters {
        cmap: "rainbow-unicorn".into(),
        ..Default::default()
    };
    let err = compute_spectrogram(&recording, None, None, &AudioParameters::default(), &bad_cmap)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidParameter(_)));
    assert_eq!(err.status_code(), 422);
}
