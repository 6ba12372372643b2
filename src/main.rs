//! Media Player - Main Entry Point
//!
//! Usage: `media-player <file>`

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use media_player::telemetry::{init_logging, LogConfig};
use media_player::{Player, PlayerSettings};

fn run(path: PathBuf, settings: PlayerSettings) -> anyhow::Result<()> {
    let mut player = Player::new(&path, settings);
    let summary = player
        .run()
        .with_context(|| format!("Failed to play {}", path.display()))?;

    tracing::info!(
        video_frames = summary.video_frames,
        audio_frames = summary.audio_frames,
        loops = summary.loops,
        "Done"
    );
    Ok(())
}

fn main() -> ExitCode {
    let Some(path) = std::env::args_os().nth(1).map(PathBuf::from) else {
        eprintln!("Usage: media-player <file>");
        return ExitCode::from(2);
    };

    let settings = PlayerSettings::load();

    // Keep the guard alive for the program duration
    let _log_guard = match init_logging(&LogConfig::with_level(&settings.log_level)) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            None
        }
    };

    tracing::info!("Media Player v{}", env!("CARGO_PKG_VERSION"));

    match run(path, settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
