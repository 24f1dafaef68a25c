use ndarray::Array2;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::{AudioError, CancelToken, RecordingDescriptor, WaveformSlice};

struct OpenedTrack {
    format: Box<dyn FormatReader>,
    track_id: u32,
    codec_params: CodecParameters,
    sample_rate: u32,
    channels: usize,
}

fn open_track(path: &Path) -> Result<OpenedTrack, AudioError> {
    let file = std::fs::File::open(path).map_err(|source| AudioError::NotFound {
        path: path.to_path_buf(),
        source,
    })?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| AudioError::Format(format!("failed to probe {}: {}", path.display(), e)))?;

    let format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AudioError::Format(format!("no audio tracks in {}", path.display())))?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let channels = codec_params.channels.map_or(1, |c| c.count());
    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| AudioError::Format(format!("unknown sample rate in {}", path.display())))?;

    Ok(OpenedTrack {
        format,
        track_id,
        codec_params,
        sample_rate,
        channels,
    })
}

impl RecordingDescriptor {
    /// Build a descriptor from the container header without decoding audio.
    pub fn probe(path: &Path, time_expansion: f64) -> Result<Self, AudioError> {
        if !time_expansion.is_finite() || time_expansion <= 0.0 {
            return Err(AudioError::Parameter(format!(
                "time expansion must be positive, got {time_expansion}"
            )));
        }
        let opened = open_track(path)?;
        let n_frames = opened.codec_params.n_frames.ok_or_else(|| {
            AudioError::Format(format!("unknown stream length in {}", path.display()))
        })?;

        let effective_rate = opened.sample_rate as f64 * time_expansion;
        let recording = RecordingDescriptor {
            id: None,
            path: path.to_path_buf(),
            duration: n_frames as f64 / effective_rate,
            samplerate: effective_rate.round() as u32,
            channels: opened.channels,
            time_expansion,
        };

        log::info!(
            "Probed {}: {:.3}s, {}Hz (x{} time expansion), {} channel(s)",
            path.display(),
            recording.duration,
            recording.samplerate,
            time_expansion,
            recording.channels
        );
        Ok(recording)
    }
}

/// Decode only the frames covering `[start, end]` seconds (real-world time).
///
/// The reader seeks to the first needed frame and stops decoding once the
/// last needed frame is reached.
pub fn read_window(
    recording: &RecordingDescriptor,
    start: f64,
    end: f64,
    cancel: &CancelToken,
) -> Result<WaveformSlice, AudioError> {
    let mut opened = open_track(&recording.path)?;
    let channels = opened.channels;
    let frames_per_second = opened.sample_rate as f64 * recording.time_expansion;

    let first = (start * frames_per_second).round() as u64;
    let last = ((end * frames_per_second).round() as u64).max(first + 1);
    let wanted = (last - first) as usize;

    if (frames_per_second - recording.samplerate as f64).abs() > 1.0 {
        log::warn!(
            "Descriptor sample rate {}Hz disagrees with file header {}Hz x{}; trusting the file",
            recording.samplerate,
            opened.sample_rate,
            recording.time_expansion
        );
    }

    let mut decoder = symphonia::default::get_codecs()
        .make(&opened.codec_params, &DecoderOptions::default())
        .map_err(|e| AudioError::Format(format!("failed to create audio decoder: {}", e)))?;

    if first > 0 {
        let seeked = opened
            .format
            .seek(
                SeekMode::Accurate,
                SeekTo::TimeStamp {
                    ts: first,
                    track_id: opened.track_id,
                },
            )
            .map_err(|e| AudioError::Format(format!("failed to seek to frame {}: {}", first, e)))?;
        log::trace!("Seeked to ts={} (requested {})", seeked.actual_ts, seeked.required_ts);
        decoder.reset();
    }

    // Interleaved, so rows of the final array are frames.
    let mut interleaved: Vec<f32> = Vec::with_capacity(wanted * channels);

    loop {
        if cancel.is_cancelled() {
            return Err(AudioError::Cancelled);
        }

        let packet = match opened.format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(AudioError::Format(format!("failed to read packet: {}", e))),
        };

        if packet.track_id() != opened.track_id {
            continue;
        }

        let packet_start = packet.ts();
        if packet_start >= last {
            break;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("Skipping undecodable packet at ts={}: {}", packet_start, e);
                continue;
            }
            Err(e) => return Err(AudioError::Format(format!("decode failed: {}", e))),
        };

        let spec = *decoded.spec();
        if spec.channels.count() != channels {
            return Err(AudioError::Format(format!(
                "channel count changed mid-stream ({} -> {})",
                channels,
                spec.channels.count()
            )));
        }
        let num_frames = decoded.frames() as u64;
        let packet_end = packet_start + num_frames;
        if packet_end <= first {
            continue;
        }

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        let samples = sample_buf.samples();

        let skip = first.saturating_sub(packet_start) as usize;
        let take = (last.min(packet_end) - packet_start) as usize;
        interleaved.extend_from_slice(&samples[skip * channels..take * channels]);

        if packet_end >= last {
            break;
        }
    }

    let decoded_frames = interleaved.len() / channels;
    if decoded_frames < wanted {
        log::warn!(
            "Stream ended {} frames short of the requested window; padding with silence",
            wanted - decoded_frames
        );
        interleaved.resize(wanted * channels, 0.0);
    }

    let samples = Array2::from_shape_vec((wanted, channels), interleaved)
        .map_err(|e| AudioError::Format(format!("unexpected sample layout: {}", e)))?;

    Ok(WaveformSlice {
        samples,
        samplerate: frames_per_second.round() as u32,
        start_time: start,
        end_time: end,
    })
}
