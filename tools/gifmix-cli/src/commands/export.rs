//! Render a video with an optional GIF overlay.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use gifmix_common::config::AppConfig;
use gifmix_project_model::{EditSession, HostVideoEvent, Transform};
use gifmix_render_engine::command::OUTPUT_FILE;
use gifmix_render_engine::ffmpeg::probe_duration;
use gifmix_render_engine::{
    build_command_with, ExportOrchestrator, ExportOutcome, ExportSettings, ExportStatus,
};
use tokio::sync::watch;

pub struct ExportOptions {
    pub video: PathBuf,
    pub overlay: Option<String>,
    pub start: Option<f64>,
    pub end: Option<f64>,
    pub x: f64,
    pub y: f64,
    pub duration: Option<f64>,
    pub output: Option<PathBuf>,
    pub dry_run: bool,
}

pub async fn run(options: ExportOptions, config: &AppConfig) -> anyhow::Result<()> {
    let video = options.video;
    println!("Exporting video: {}", video.display());

    let host_duration = match options.duration {
        Some(secs) => secs,
        None => probe_duration(&config.engine.ffprobe_path, &video)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read video duration: {e}"))?,
    };

    let mut session = EditSession::new();
    session.load_host(video.display().to_string());
    session.apply(HostVideoEvent::DurationLoaded(host_duration));

    if let Some(uri) = options.overlay {
        let id = session.add_overlay(uri)?;
        let start = options.start.unwrap_or(0.0);
        let end = options.end.unwrap_or(host_duration);
        session.set_window(id, start, end)?;
        session.set_transform(id, Transform::new(options.x, options.y, 1.0, 0.0)?)?;
    }

    let request = session.export_request()?;
    let settings = ExportSettings::from(&config.engine);

    println!("  Duration: {host_duration:.2}s");
    for overlay in &request.overlays {
        println!(
            "  Overlay: {} ({:.2}s - {:.2}s at {},{})",
            overlay.source_uri(),
            overlay.start_secs(),
            overlay.end_secs(),
            overlay.transform().x(),
            overlay.transform().y(),
        );
    }

    if options.dry_run {
        let args = build_command_with(
            &settings.command,
            request.host_duration_secs,
            &request.overlays,
        );
        println!("{} {}", config.engine.ffmpeg_path.display(), args.join(" "));
        return Ok(());
    }

    let output_path = options.output.unwrap_or_else(|| {
        video
            .parent()
            .map(|dir| dir.join("exports"))
            .unwrap_or_else(|| PathBuf::from("exports"))
            .join(OUTPUT_FILE)
    });
    println!("  Output: {}", output_path.display());

    let orchestrator = Arc::new(ExportOrchestrator::ffmpeg(&config.engine));

    let printer = tokio::spawn(print_progress(orchestrator.subscribe()));

    let interrupt = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                orchestrator.cancel();
            }
        })
    };

    let outcome = orchestrator.run(request).await;
    interrupt.abort();
    // The printer stops by itself once it sees the terminal status; a request
    // rejected before starting never publishes one.
    if orchestrator.status().state.is_terminal() {
        let _ = printer.await;
    } else {
        printer.abort();
    }

    match outcome {
        Ok(ExportOutcome::Completed(artifact)) => {
            artifact.write_to(&output_path).await?;
            tracing::info!(path = %output_path.display(), bytes = artifact.len(), "Wrote export");
            println!(
                "\nExport complete: {} ({} bytes)",
                output_path.display(),
                artifact.len()
            );
        }
        Ok(ExportOutcome::Cancelled) => {
            println!("\nExport cancelled");
        }
        Err(e) => {
            println!("\nExport failed: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

/// Print status updates until the job reaches a terminal state, which is
/// returned.
async fn print_progress(mut updates: watch::Receiver<ExportStatus>) -> Option<ExportStatus> {
    while updates.changed().await.is_ok() {
        let status = *updates.borrow_and_update();
        print!(
            "\r  Progress: {:.1}% ({:.1}s elapsed)  ",
            status.progress_ratio * 100.0,
            status.elapsed_secs,
        );
        let _ = std::io::stdout().flush();
        if status.state.is_terminal() {
            return Some(status);
        }
    }
    None
}
