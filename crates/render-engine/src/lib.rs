//! gifmix Render Engine
//!
//! Turns an edit session into a single composited video by driving an
//! external media engine (ffmpeg).
//!
//! # Pipeline Architecture
//!
//! ```text
//! input.mp4 ─────────────┐
//!                        ├── overlay=X:Y:enable='between(t,S,E)'
//! overlay0.gif (loop) ───┘         │
//!                                  ▼
//!                        Encode (-preset, -t, -copyts, -vsync vfr)
//!                                  │
//!                                  ▼
//!                             output.mp4
//! ```
//!
//! The [`export::ExportOrchestrator`] owns one engine per job, stages the
//! inputs, runs the command from [`command::build_command`], and reports
//! wall-clock based progress from [`progress`].

pub mod catalog;
pub mod command;
pub mod duration;
pub mod engine;
pub mod export;
pub mod fetch;
pub mod ffmpeg;
pub mod progress;

pub use command::{build_command, build_command_with, CommandOptions};
pub use duration::{gif_duration_secs, DurationResolver};
pub use engine::{EngineError, EngineFactory, EngineProgress, RenderEngine};
pub use export::*;
pub use fetch::{AssetFetcher, DefaultFetcher};
pub use progress::{estimate, ExportState, ExportStatus, ProgressTracker};
