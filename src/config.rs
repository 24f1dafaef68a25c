use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use chirpgram::{AudioParameters, SpectrogramParameters};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub audio: AudioParameters,
    #[serde(default)]
    pub spectrogram: SpectrogramParameters,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    /// Split the requested window into tiles of this many seconds.
    #[serde(default)]
    pub tile_duration: Option<f64>,
    #[serde(default = "default_time_expansion")]
    pub time_expansion: f64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            tile_duration: None,
            time_expansion: default_time_expansion(),
        }
    }
}

fn default_time_expansion() -> f64 { 1.0 }

/// Explicit `--config` path, or the first of `chirpgram.toml` in the working
/// directory, `~/.config/chirpgram/config.toml` and the platform config dir.
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("chirpgram.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("chirpgram").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("chirpgram").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    parse_config(&content).with_context(|| format!("Invalid config {}", path.display()))
}

fn parse_config(content: &str) -> Result<Config> {
    Ok(toml::from_str(content)?)
}
