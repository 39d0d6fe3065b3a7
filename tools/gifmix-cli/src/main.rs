//! gifmix CLI - Compose animated GIF overlays onto a video and export it.
//!
//! Usage:
//!   gifmix export <VIDEO> [OPTIONS]   Render a video with an optional overlay
//!   gifmix duration <URI>             Show the playback length of a GIF
//!   gifmix search <QUERY>             Search the overlay catalog
//!   gifmix check                      Check system capabilities
//!   gifmix init                       Write a default config file

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "gifmix",
    about = "Put animated GIF overlays on videos",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a video, compositing an overlay during a time window
    Export {
        /// Host video file
        video: PathBuf,

        /// Overlay GIF (path, file:// or http(s) URL)
        #[arg(long)]
        overlay: Option<String>,

        /// Overlay start time (seconds)
        #[arg(long, requires = "overlay")]
        start: Option<f64>,

        /// Overlay end time (seconds); defaults to the end of the video
        #[arg(long, requires = "overlay")]
        end: Option<f64>,

        /// Overlay X position (pixels)
        #[arg(long, default_value = "100", requires = "overlay")]
        x: f64,

        /// Overlay Y position (pixels)
        #[arg(long, default_value = "100", requires = "overlay")]
        y: f64,

        /// Host video duration (seconds); probed with ffprobe when omitted
        #[arg(long)]
        duration: Option<f64>,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the ffmpeg arguments without rendering
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the playback duration of an animated GIF
    Duration {
        /// GIF location (path, file:// or http(s) URL)
        uri: String,
    },

    /// Search the overlay catalog
    Search {
        /// Search terms
        query: String,

        /// Result page (starting at 1)
        #[arg(long, default_value = "1")]
        page: u32,

        /// Search stickers instead of GIFs
        #[arg(long)]
        stickers: bool,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check system capabilities
    Check,

    /// Write a default config file
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = gifmix_common::config::AppConfig::load();

    // Initialize logging
    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    gifmix_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Export {
            video,
            overlay,
            start,
            end,
            x,
            y,
            duration,
            output,
            dry_run,
        } => {
            let options = commands::export::ExportOptions {
                video,
                overlay,
                start,
                end,
                x,
                y,
                duration,
                output,
                dry_run,
            };
            commands::export::run(options, &config).await
        }
        Commands::Duration { uri } => commands::duration::run(uri).await,
        Commands::Search {
            query,
            page,
            stickers,
            json,
        } => commands::search::run(query, page, stickers, json, &config).await,
        Commands::Check => commands::check::run(&config).await,
        Commands::Init { force } => commands::init::run(force),
    }
}
