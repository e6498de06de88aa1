//! AMV - console for downloads, conversion and vocal separation.
//!
//! This binary is the only place that prints. Work runs on background tasks
//! and reports back over channels drained here.

mod handlers;

use amv_core::{AmvError, SetupType, Toolkit};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "amv")]
#[command(about = "Download, convert and separate audio with hardware-aware settings")]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Data directory (defaults to AMV_HOME or the platform data dir)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show detected hardware, stored mode and the model that would be used
    Status,
    /// Switch the installed runtime to cpu or gpu
    Switch {
        #[arg(value_parser = parse_mode)]
        mode: SetupType,
    },
    /// Check dependencies
    Doctor {
        /// Install whatever is missing
        #[arg(long)]
        install: bool,
    },
    /// Download audio (default) or video from a URL
    Download {
        url: String,
        #[arg(long)]
        video: bool,
    },
    /// Split a file into vocals and instrumental
    Separate { file: PathBuf },
    /// Convert a media file to WAV
    Convert { file: PathBuf },
    /// List candidate files under a directory
    Scan {
        dir: Option<PathBuf>,
        /// List convertible media instead of audio
        #[arg(long)]
        media: bool,
    },
    /// Show recently used files
    Recent,
}

fn parse_mode(value: &str) -> std::result::Result<SetupType, String> {
    value.parse::<SetupType>().map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries results.
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let toolkit = Arc::new(Toolkit::discover(args.root)?);
    debug!("Data root: {}", toolkit.paths().root.display());

    let result = match args.command {
        Command::Status => handlers::status(toolkit).await,
        Command::Switch { mode } => handlers::switch(toolkit, mode).await,
        Command::Doctor { install } => handlers::doctor(toolkit, install).await,
        Command::Download { url, video } => handlers::download(toolkit, &url, video).await,
        Command::Separate { file } => handlers::separate(toolkit, file).await,
        Command::Convert { file } => handlers::convert(toolkit, file).await,
        Command::Scan { dir, media } => handlers::scan(toolkit, dir, media).await,
        Command::Recent => handlers::recent(toolkit),
    };

    if let Err(e) = result {
        match e.downcast_ref::<AmvError>() {
            Some(err) => eprintln!("Error: {}", err.user_message()),
            None => eprintln!("Error: {:#}", e),
        }
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_switch_mode_is_case_insensitive() {
        let args = Args::try_parse_from(["amv", "switch", "GPU"]).unwrap();
        assert!(matches!(args.command, Command::Switch { mode: SetupType::Gpu }));
        assert!(Args::try_parse_from(["amv", "switch", "tpu"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::try_parse_from(["amv", "download", "https://x", "--video", "--debug"]).unwrap();
        assert!(args.debug);
        assert!(matches!(args.command, Command::Download { video: true, .. }));
    }
}
