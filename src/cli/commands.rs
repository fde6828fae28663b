//! CLI Command Implementations
//!
//! Each command builds a [`WavRenderer`] from the loaded configuration and
//! drives the library controllers the way a host application would.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use log::{info, warn};

use crate::cli::{MixArgs, TrackArgs};
use crate::config::PreviewConfig;
use crate::engine::{probe_audio, WavRenderer};
use crate::export::{default_output_file, ExportConfiguration, ExportController};
use crate::player::PlaybackController;

/// Load `path`, or the defaults when no file is given
pub fn load_config(path: Option<&Path>) -> Result<PreviewConfig> {
    match path {
        Some(path) => {
            info!("Loading configuration: {}", path.display());
            PreviewConfig::load(path)
                .with_context(|| format!("cannot load configuration {}", path.display()))
        }
        None => Ok(PreviewConfig::default()),
    }
}

/// Print source metadata and the aligned timeline.
pub fn inspect(tracks: &TrackArgs, config: &PreviewConfig) -> Result<()> {
    let info = tracks.track_info();

    println!("Sources:");
    println!("{:-<60}", "");
    let sources = [
        ("original vocal", Some(info.original_vocal_track())),
        ("processed vocal", info.processed_vocal_track()),
        ("background", info.background_track()),
    ];
    for (label, path) in sources {
        let Some(path) = path else {
            println!("{:>16}: (none)", label);
            continue;
        };
        match probe_audio(path) {
            Ok(source) => println!(
                "{:>16}: {} ({:.3}s, {} Hz, {} ch)",
                label,
                path.display(),
                source.duration_secs,
                source.sample_rate,
                source.channels
            ),
            Err(e) => println!("{:>16}: {} (unreadable: {})", label, path.display(), e),
        }
    }

    let engine = Arc::new(WavRenderer::new(&config.engine));
    let player = PlaybackController::with_config(engine, config.playback.clone());
    let should_mix = info.background_track().is_some();
    player.prepare(&info, should_mix)?;

    println!("{:-<60}", "");
    println!(
        "Mode: {}",
        if should_mix { "mixed" } else { "vocal only" }
    );
    println!("Recording start: {:.3}s", info.recording_start_time());
    if let Some(timeline) = player.timeline_duration() {
        println!("Timeline: {:.3}s", timeline);
    }

    Ok(())
}

/// Run a preview to completion, printing the playhead.
pub fn play(tracks: &TrackArgs, mix: &MixArgs, config: &PreviewConfig) -> Result<()> {
    let info = tracks.track_info();
    let engine = Arc::new(WavRenderer::new(&config.engine));
    let player = PlaybackController::with_config(engine, config.playback.clone());

    player.set_should_use_processed_vocal_track(mix.processed)?;
    player.prepare(&info, mix.should_mix_audio())?;
    player.set_volumes(
        mix.vocal_volume.unwrap_or(config.playback.vocal_volume),
        mix.background_volume
            .unwrap_or(config.playback.background_volume),
    );
    player.set_preview_window(mix.start, mix.duration);

    let (done_tx, done_rx) = mpsc::channel();
    player.set_progress_handler(|position| {
        print!("\r{:>8.2}s", position);
        let _ = std::io::stdout().flush();
    });
    player.set_playback_finished_handler(move |background| {
        let _ = done_tx.send(background.map(Path::to_path_buf));
    });

    if let Some(vocal) = player.selected_vocal_track() {
        info!("Previewing {}", vocal.display());
    }
    player.start()?;

    let timeline = player.timeline_duration().unwrap_or(0.0);
    let limit = Duration::from_secs_f64(timeline.max(0.0) + 5.0);
    match done_rx.recv_timeout(limit) {
        Ok(_) => println!("\nPreview finished"),
        Err(_) => {
            warn!("Preview did not finish in {:.1}s, stopping", limit.as_secs_f64());
            player.stop();
        }
    }

    Ok(())
}

/// Bounce a window to a WAV file and wait for the result.
pub fn export(
    tracks: &TrackArgs,
    mix: &MixArgs,
    output: Option<&Path>,
    config: &PreviewConfig,
) -> Result<()> {
    let info = tracks.track_info();
    let engine = Arc::new(WavRenderer::new(&config.engine));
    let exporter = ExportController::with_config(engine, config.export.clone());

    exporter.set_should_use_processed_vocal_track(mix.processed)?;
    exporter.prepare(&info, mix.should_mix_audio())?;

    let output: PathBuf = match output {
        Some(path) => path.to_path_buf(),
        None => default_output_file(std::env::current_dir()?),
    };

    // A zero duration means "to the end", as for the player.
    let duration = if mix.duration > 0.0 {
        mix.duration
    } else {
        f64::MAX
    };
    let vocal_volume = mix.vocal_volume.unwrap_or(config.playback.vocal_volume);
    let configuration = match mix.background_volume {
        Some(background) => {
            ExportConfiguration::with_background_volume(mix.start, duration, vocal_volume, background)
        }
        None => ExportConfiguration::new(mix.start, duration, vocal_volume),
    };

    let (tx, rx) = mpsc::channel();
    let job_id = exporter.export_using_configuration(
        &configuration,
        output,
        mix.should_mix_audio(),
        move |completion| {
            let _ = tx.send(completion);
        },
    );
    info!("Export job {} queued", job_id);

    let completion = rx
        .recv()
        .map_err(|_| anyhow!("export job {} ended without a result", job_id))?;
    let report = completion.result?;

    println!("Exported: {}", completion.output_file.display());
    println!(
        "  {} frames, {} ch, {} Hz, {:.3}s",
        report.frames_written, report.channels, report.sample_rate, report.duration_secs
    );

    Ok(())
}
