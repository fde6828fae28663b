//! Preview CLI
//!
//! Command-line front end for previewing and exporting vocal recordings.

use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use log::info;

use preview_audio::cli::commands;
use preview_audio::cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    info!("Preview Audio v{}", env!("CARGO_PKG_VERSION"));

    let config = commands::load_config(cli.config.as_deref())?;
    config.validate()?;

    match cli.command {
        Some(cmd) => handle_command(cmd, &config),
        None => {
            println!("Preview Audio v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

fn handle_command(cmd: Commands, config: &preview_audio::PreviewConfig) -> Result<()> {
    match cmd {
        Commands::Inspect { tracks } => commands::inspect(&tracks, config),
        Commands::Play { tracks, mix } => commands::play(&tracks, &mix, config),
        Commands::Export {
            tracks,
            mix,
            output,
        } => commands::export(&tracks, &mix, output.as_deref(), config),
    }
}
