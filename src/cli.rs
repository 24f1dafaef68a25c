use clap::Parser;
use std::path::PathBuf;

use chirpgram::{AudioParameters, NormalizeMode, Scale, SpectrogramParameters, WindowType};

use crate::config::Config;

/// Flags left unset fall back to the config file, then to built-in defaults.
#[derive(Parser, Debug)]
#[command(name = "chirpgram", about = "Render spectrogram images of audio recordings")]
pub struct Cli {
    /// Input audio file (WAV, FLAC, MP3, OGG)
    pub input: Option<PathBuf>,

    /// Output PNG file (tiles get a _NNNN suffix)
    #[arg(short, long, default_value = "spectrogram.png")]
    pub output: PathBuf,

    /// Window start in seconds
    #[arg(long)]
    pub start: Option<f64>,

    /// Window end in seconds
    #[arg(long)]
    pub end: Option<f64>,

    /// Time expansion factor the recording was made with
    #[arg(long)]
    pub time_expansion: Option<f64>,

    /// Resample to --target-samplerate before analysis
    #[arg(long)]
    pub resample: bool,

    #[arg(long)]
    pub target_samplerate: Option<u32>,

    /// High-pass cutoff in Hz
    #[arg(long)]
    pub low_freq: Option<f64>,

    /// Low-pass cutoff in Hz
    #[arg(long)]
    pub high_freq: Option<f64>,

    /// Butterworth filter order
    #[arg(long)]
    pub filter_order: Option<u32>,

    /// STFT window length in seconds
    #[arg(long)]
    pub window_size: Option<f64>,

    /// Hop as a fraction of the window length
    #[arg(long)]
    pub hop_size: Option<f64>,

    /// Window function (hann, hamming, blackman, ...)
    #[arg(long)]
    pub window_type: Option<WindowType>,

    /// Output scale: amplitude, power or dB
    #[arg(long)]
    pub scale: Option<Scale>,

    /// Skip the normalization stage
    #[arg(long)]
    pub no_normalize: bool,

    /// relative or absolute
    #[arg(long)]
    pub normalize_mode: Option<NormalizeMode>,

    /// Apply per-channel energy normalization
    #[arg(long)]
    pub pcen: bool,

    /// Clamp to [--min-db, --max-db]
    #[arg(long)]
    pub clamp: bool,

    #[arg(long, allow_hyphen_values = true)]
    pub min_db: Option<f64>,

    #[arg(long, allow_hyphen_values = true)]
    pub max_db: Option<f64>,

    /// Colormap name, append _r to reverse
    #[arg(long)]
    pub cmap: Option<String>,

    /// Channel to analyse
    #[arg(long)]
    pub channel: Option<usize>,

    /// Render consecutive tiles of this many seconds
    #[arg(long)]
    pub tile_duration: Option<f64>,

    /// Config file (defaults to chirpgram.toml or the user config dir)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print the recording descriptor as JSON and exit
    #[arg(long)]
    pub probe: bool,

    /// List available colormaps and exit
    #[arg(long)]
    pub list_colormaps: bool,
}

/// Everything one run needs after merging flags over the config file.
#[derive(Debug)]
pub struct Settings {
    pub audio: AudioParameters,
    pub spectrogram: SpectrogramParameters,
    pub time_expansion: f64,
    pub tile_duration: Option<f64>,
}

impl Cli {
    pub fn merge(&self, config: Config) -> Settings {
        let Config {
            output,
            mut audio,
            spectrogram: mut spec,
        } = config;

        audio.resample |= self.resample;
        if let Some(rate) = self.target_samplerate {
            audio.target_samplerate = rate;
        }
        if self.low_freq.is_some() {
            audio.low_freq = self.low_freq;
        }
        if self.high_freq.is_some() {
            audio.high_freq = self.high_freq;
        }
        if let Some(order) = self.filter_order {
            audio.filter_order = order;
        }

        if let Some(v) = self.window_size { spec.window_size = v; }
        if let Some(v) = self.hop_size { spec.hop_size = v; }
        if let Some(v) = self.window_type { spec.window_type = v; }
        if let Some(v) = self.scale { spec.scale = v; }
        if self.no_normalize {
            spec.normalize = false;
        }
        if let Some(v) = self.normalize_mode { spec.normalize_mode = v; }
        spec.pcen |= self.pcen;
        spec.clamp |= self.clamp;
        if let Some(v) = self.min_db { spec.min_dB = v; }
        if let Some(v) = self.max_db { spec.max_dB = v; }
        if let Some(ref v) = self.cmap { spec.cmap = v.clone(); }
        if let Some(v) = self.channel { spec.channel = v; }

        Settings {
            audio,
            spectrogram: spec,
            time_expansion: self.time_expansion.unwrap_or(output.time_expansion),
            tile_duration: self.tile_duration.or(output.tile_duration),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("chirpgram").chain(args.iter().copied()))
    }

    #[test]
    fn flags_override_config() {
        let mut config = Config::default();
        config.spectrogram.cmap = "magma".into();
        config.spectrogram.window_size = 0.05;
        config.audio.high_freq = Some(8000.0);

        let cli = parse(&["rec.wav", "--cmap", "gray", "--scale", "power", "--min-db", "-80"]);
        let settings = cli.merge(config);
        assert_eq!(settings.spectrogram.cmap, "gray");
        assert_eq!(settings.spectrogram.scale, Scale::Power);
        assert_eq!(settings.spectrogram.min_dB, -80.0);
        // Untouched by flags
        assert_eq!(settings.spectrogram.window_size, 0.05);
        assert_eq!(settings.audio.high_freq, Some(8000.0));
    }

    #[test]
    fn switches_only_turn_features_on() {
        let mut config = Config::default();
        config.spectrogram.pcen = true;
        let settings = parse(&["rec.wav"]).merge(config);
        assert!(settings.spectrogram.pcen);
        assert!(settings.spectrogram.normalize);

        let settings = parse(&["rec.wav", "--no-normalize", "--clamp"]).merge(Config::default());
        assert!(!settings.spectrogram.normalize);
        assert!(settings.spectrogram.clamp);
    }

    #[test]
    fn output_settings_fall_back_to_config() {
        let mut config = Config::default();
        config.output.time_expansion = 10.0;
        config.output.tile_duration = Some(1.0);
        let settings = parse(&["rec.wav", "--tile-duration", "0.5"]).merge(config);
        assert_eq!(settings.time_expansion, 10.0);
        assert_eq!(settings.tile_duration, Some(0.5));
    }

    #[test]
    fn rejects_unknown_window_type() {
        let result = Cli::try_parse_from(["chirpgram", "rec.wav", "--window-type", "kaiser"]);
        assert!(result.is_err());
    }
}
