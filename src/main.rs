mod cli;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

use chirpgram::render::colormap::palette_names;
use chirpgram::{compute_spectrogram, RecordingDescriptor};
use cli::{Cli, Settings};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    if cli.list_colormaps {
        println!("Available colormaps (append _r to reverse):");
        for name in palette_names() {
            println!("  {}", name);
        }
        return Ok(());
    }

    let config = match config::find_config(cli.config.as_deref()) {
        Some(path) => {
            let cfg = config::load_config(&path)?;
            log::info!("Loaded config from {}", path.display());
            cfg
        }
        None => config::Config::default(),
    };
    let settings = cli.merge(config);

    let input = cli.input.as_ref().context("Input audio file is required")?;
    if !input.exists() {
        anyhow::bail!("Input file not found: {}", input.display());
    }

    let recording = RecordingDescriptor::probe(input, settings.time_expansion)
        .with_context(|| format!("Failed to open {}", input.display()))?;

    if cli.probe {
        println!("{}", serde_json::to_string_pretty(&recording)?);
        return Ok(());
    }

    let start = cli.start.unwrap_or(0.0);
    let end = cli.end.unwrap_or(recording.duration);

    match settings.tile_duration {
        Some(tile) => render_tiles(&recording, start, end, tile, &settings, &cli.output),
        None => {
            let png = compute_spectrogram(
                &recording,
                cli.start,
                cli.end,
                &settings.audio,
                &settings.spectrogram,
            )
            .with_context(|| format!("Failed to render {}", input.display()))?;
            std::fs::write(&cli.output, &png)
                .with_context(|| format!("Failed to write {}", cli.output.display()))?;
            log::info!("Wrote {} ({} bytes)", cli.output.display(), png.len());
            Ok(())
        }
    }
}

fn render_tiles(
    recording: &RecordingDescriptor,
    start: f64,
    end: f64,
    tile: f64,
    settings: &Settings,
    output: &Path,
) -> Result<()> {
    if !tile.is_finite() || tile <= 0.0 {
        anyhow::bail!("Tile duration must be positive, got {}", tile);
    }
    let windows = tile_windows(start, end, tile);
    log::info!(
        "Rendering {} tiles of {:.3}s over [{:.3}s, {:.3}s]",
        windows.len(),
        tile,
        start,
        end
    );

    let pb = ProgressBar::new(windows.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} tiles ({eta} remaining)")?
            .progress_chars("=>-"),
    );

    windows
        .par_iter()
        .enumerate()
        .try_for_each(|(i, &(tile_start, tile_end))| -> Result<()> {
            let png = compute_spectrogram(
                recording,
                Some(tile_start),
                Some(tile_end),
                &settings.audio,
                &settings.spectrogram,
            )
            .with_context(|| format!("Tile {} [{:.3}s, {:.3}s] failed", i, tile_start, tile_end))?;
            let path = tile_path(output, i);
            std::fs::write(&path, png)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            pb.inc(1);
            Ok(())
        })?;

    pb.finish_with_message("done");
    log::info!("Wrote {} tiles next to {}", windows.len(), output.display());
    Ok(())
}

/// Consecutive `[start, end)` windows of `tile` seconds; the last one is cut
/// short at `end`.
fn tile_windows(start: f64, end: f64, tile: f64) -> Vec<(f64, f64)> {
    let count = ((end - start) / tile).ceil().max(0.0) as usize;
    (0..count)
        .map(|i| {
            let a = start + i as f64 * tile;
            (a, (a + tile).min(end))
        })
        .filter(|(a, b)| b > a)
        .collect()
}

/// `out.png` becomes `out_0003.png` for tile 3.
fn tile_path(output: &Path, index: usize) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "spectrogram".into());
    let ext = output
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "png".into());
    output.with_file_name(format!("{}_{:04}.{}", stem, index, ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiles_cover_window_without_overlap() {
        let tiles = tile_windows(1.0, 3.5, 1.0);
        assert_eq!(tiles, vec![(1.0, 2.0), (2.0, 3.0), (3.0, 3.5)]);
    }

    #[test]
    fn empty_window_has_no_tiles() {
        assert!(tile_windows(2.0, 2.0, 0.5).is_empty());
    }

    #[test]
    fn tile_paths_are_numbered() {
        let path = tile_path(Path::new("/tmp/out/bat.png"), 12);
        assert_eq!(path, PathBuf::from("/tmp/out/bat_0012.png"));
        assert_eq!(tile_path(Path::new("x"), 0), PathBuf::from("x_0000.png"));
    }
}
