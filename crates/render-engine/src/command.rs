//! Engine argument construction.
//!
//! Pure translation of overlay state into an ffmpeg-style argument list. Only
//! the first overlay is composited; scale and rotation stay preview-only and
//! never reach the filter graph.

use gifmix_project_model::Overlay;

/// Name of the host video inside engine storage.
pub const HOST_INPUT_FILE: &str = "input.mp4";

/// Name of the staged overlay asset inside engine storage.
pub const OVERLAY_INPUT_FILE: &str = "overlay0.gif";

/// Name of the rendered artifact inside engine storage.
pub const OUTPUT_FILE: &str = "output.mp4";

/// MIME type of the rendered artifact.
pub const OUTPUT_MIME_TYPE: &str = "video/mp4";

/// How many overlays a single render composites.
pub const MAX_COMPOSITED_OVERLAYS: usize = 1;

/// Encoder preset used when none is configured.
pub const DEFAULT_PRESET: &str = "fast";

/// Tunables that do not come from the edit itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOptions {
    /// Value for `-preset`.
    pub preset: String,
}

impl Default for CommandOptions {
    fn default() -> Self {
        Self {
            preset: DEFAULT_PRESET.to_string(),
        }
    }
}

/// The overlay a render will actually composite, if any.
pub fn composited_overlay(overlays: &[Overlay]) -> Option<&Overlay> {
    overlays.iter().take(MAX_COMPOSITED_OVERLAYS).next()
}

/// Build engine arguments with default options.
pub fn build_command(host_duration_secs: f64, overlays: &[Overlay]) -> Vec<String> {
    build_command_with(&CommandOptions::default(), host_duration_secs, overlays)
}

/// Build engine arguments for rendering `overlays` onto the host video.
///
/// With no overlays this is a timestamp-preserving re-encode bounded to the
/// host duration. Otherwise the first overlay is looped and composited at its
/// pixel offset while `start <= t <= end` on the host timeline.
pub fn build_command_with(
    options: &CommandOptions,
    host_duration_secs: f64,
    overlays: &[Overlay],
) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(),
        "-i".to_string(),
        HOST_INPUT_FILE.to_string(),
    ];

    match composited_overlay(overlays) {
        None => {
            args.push("-preset".to_string());
            args.push(options.preset.clone());
            args.push("-t".to_string());
            args.push(format_secs(host_duration_secs));
            args.push("-copyts".to_string());
        }
        Some(overlay) => {
            if overlays.len() > MAX_COMPOSITED_OVERLAYS {
                tracing::warn!(
                    overlays = overlays.len(),
                    composited = MAX_COMPOSITED_OVERLAYS,
                    "Only the first overlay is rendered"
                );
            }

            args.push("-ignore_loop".to_string());
            args.push("0".to_string());
            args.push("-stream_loop".to_string());
            args.push("-1".to_string());
            args.push("-i".to_string());
            args.push(OVERLAY_INPUT_FILE.to_string());
            args.push("-filter_complex".to_string());
            args.push(overlay_filter(overlay));
            args.push("-map".to_string());
            args.push("[out]".to_string());
            args.push("-preset".to_string());
            args.push(options.preset.clone());
            args.push("-t".to_string());
            args.push(format_secs(host_duration_secs));
            args.push("-copyts".to_string());
            args.push("-vsync".to_string());
            args.push("vfr".to_string());
        }
    }

    args.push(OUTPUT_FILE.to_string());
    args
}

/// Filter graph compositing input 1 over input 0 during the overlay window.
pub fn overlay_filter(overlay: &Overlay) -> String {
    format!(
        "[0:v][1:v] overlay={}:{}:enable='{}' [out]",
        format_secs(overlay.transform().x()),
        format_secs(overlay.transform().y()),
        enable_predicate(overlay.start_secs(), overlay.end_secs()),
    )
}

/// `between(t,S,E)`, inclusive on both ends.
pub fn enable_predicate(start_secs: f64, end_secs: f64) -> String {
    format!(
        "between(t,{},{})",
        format_secs(start_secs),
        format_secs(end_secs)
    )
}

/// Shortest decimal form: `2`, `3.5`, `10`.
fn format_secs(value: f64) -> String {
    if value == 0.0 {
        // avoids "-0"
        return "0".to_string();
    }
    format!("{value}")
}
