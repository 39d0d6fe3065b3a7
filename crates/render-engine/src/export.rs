//! Export lifecycle and job management.
//!
//! One job runs at a time. A job acquires a fresh engine, stages its inputs,
//! invokes the engine, and reads back the rendered file. Progress is published
//! on a watch channel; cancellation is cooperative through a token handed to
//! the engine.

use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use gifmix_common::clock::JobClock;
use gifmix_common::config::EngineConfig;
use gifmix_project_model::ExportRequest;

use crate::command::{
    build_command_with, composited_overlay, CommandOptions, HOST_INPUT_FILE, OUTPUT_FILE,
    OUTPUT_MIME_TYPE, OVERLAY_INPUT_FILE,
};
use crate::duration::gif_duration_secs;
use crate::engine::{EngineError, EngineFactory, EngineProgress, RenderEngine};
use crate::fetch::{AssetFetcher, DefaultFetcher};
use crate::ffmpeg::FfmpegFactory;
use crate::progress::{ExportState, ExportStatus, ProgressTracker};

/// The rendered video, ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ExportArtifact {
    fn mp4(bytes: Vec<u8>) -> Self {
        Self {
            file_name: OUTPUT_FILE.to_string(),
            mime_type: OUTPUT_MIME_TYPE.to_string(),
            bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Write the artifact to `path`, creating parent directories.
    pub async fn write_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, &self.bytes).await
    }
}

/// How a job that did not fail ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Completed(ExportArtifact),
    Cancelled,
}

/// Orchestrator tunables.
#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub command: CommandOptions,

    /// Refresh interval for the elapsed time while a job runs.
    pub tick_interval: Duration,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for ExportSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            command: CommandOptions {
                preset: config.preset.clone(),
            },
            tick_interval: Duration::from_millis(config.progress_tick_ms.max(1)),
        }
    }
}

/// Drives exports, one at a time.
pub struct ExportOrchestrator {
    factory: Arc<dyn EngineFactory>,
    fetcher: Arc<dyn AssetFetcher>,
    settings: ExportSettings,
    status: Arc<watch::Sender<ExportStatus>>,
    active: Arc<Mutex<Option<CancellationToken>>>,
}

impl ExportOrchestrator {
    pub fn new(
        factory: Arc<dyn EngineFactory>,
        fetcher: Arc<dyn AssetFetcher>,
        settings: ExportSettings,
    ) -> Self {
        let (status, _) = watch::channel(ExportStatus::default());
        Self {
            factory,
            fetcher,
            settings,
            status: Arc::new(status),
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Orchestrator backed by the configured ffmpeg binary.
    pub fn ffmpeg(config: &EngineConfig) -> Self {
        Self::new(
            Arc::new(FfmpegFactory::new(config.ffmpeg_path.clone())),
            Arc::new(DefaultFetcher::new()),
            ExportSettings::from(config),
        )
    }

    /// Latest published status.
    pub fn status(&self) -> ExportStatus {
        *self.status.borrow()
    }

    /// Observe status changes. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> watch::Receiver<ExportStatus> {
        self.status.subscribe()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.active).is_some()
    }

    /// Request cancellation of the running job. Returns whether one was running.
    ///
    /// The job settles as [`ExportOutcome::Cancelled`] once the engine observes
    /// the request.
    pub fn cancel(&self) -> bool {
        match lock(&self.active).as_ref() {
            Some(token) => {
                tracing::info!("Export cancellation requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Run one export to completion, cancellation, or failure.
    pub async fn run(&self, request: ExportRequest) -> Result<ExportOutcome, ExportError> {
        validate_request(&request)?;
        let cancel = self.begin()?;

        let clock = JobClock::start();
        let mut guard = JobGuard::start(
            Arc::clone(&self.status),
            Arc::clone(&self.active),
            clock.clone(),
            request.host_duration_secs,
            self.settings.tick_interval,
        );

        tracing::info!(
            host = %request.host_uri,
            host_duration_secs = request.host_duration_secs,
            overlays = request.overlays.len(),
            started_at = clock.epoch_wall(),
            "Starting export"
        );

        let mut engine = self.factory.create();
        tracing::info!(engine = engine.name(), "Acquired render engine");

        let result = self
            .drive(&request, engine.as_mut(), &cancel, &mut guard)
            .await;

        let (state, outcome) = match result {
            Ok(Some(artifact)) => (ExportState::Completed, Ok(ExportOutcome::Completed(artifact))),
            Ok(None) => {
                if let Err(e) = engine.terminate() {
                    tracing::warn!(error = %e, "Engine termination failed");
                }
                (ExportState::Cancelled, Ok(ExportOutcome::Cancelled))
            }
            Err(e) => {
                tracing::error!(error = %e, "Export failed");
                (ExportState::Failed, Err(e))
            }
        };

        drop(engine);
        tracing::debug!("Released render engine");
        guard.finish(state);

        tracing::info!(
            state = ?state,
            elapsed_secs = clock.elapsed_secs(),
            "Export finished"
        );
        outcome
    }

    fn begin(&self) -> Result<CancellationToken, ExportError> {
        let mut active = lock(&self.active);
        if active.is_some() {
            return Err(ExportError::AlreadyRunning);
        }
        let token = CancellationToken::new();
        *active = Some(token.clone());
        Ok(token)
    }

    /// The job body. `Ok(None)` means the job was cancelled.
    async fn drive(
        &self,
        request: &ExportRequest,
        engine: &mut dyn RenderEngine,
        cancel: &CancellationToken,
        guard: &mut JobGuard,
    ) -> Result<Option<ExportArtifact>, ExportError> {
        let started = std::time::Instant::now();
        let Some(loaded) = cancellable(cancel, engine.load()).await else {
            return Ok(None);
        };
        loaded.map_err(ExportError::EngineLoad)?;
        tracing::info!(load_ms = started.elapsed().as_millis(), "Render engine loaded");

        guard.watch_engine(engine.subscribe_progress());

        let Some(staged) = cancellable(
            cancel,
            self.stage(engine, &request.host_uri, HOST_INPUT_FILE),
        )
        .await
        else {
            return Ok(None);
        };
        staged?;

        if let Some(overlay) = composited_overlay(&request.overlays) {
            let Some(staged) = cancellable(
                cancel,
                self.stage(engine, overlay.source_uri(), OVERLAY_INPUT_FILE),
            )
            .await
            else {
                return Ok(None);
            };
            let overlay_bytes = staged?;

            let overlay_duration = gif_duration_secs(&overlay_bytes);
            if overlay_duration <= 0.0 {
                return Err(ExportError::DurationUnavailable {
                    uri: overlay.source_uri().to_string(),
                });
            }
            tracing::info!(
                overlay = %overlay.id(),
                overlay_duration_secs = overlay_duration,
                start_secs = overlay.start_secs(),
                end_secs = overlay.end_secs(),
                "Overlay staged"
            );
        }

        let args = build_command_with(
            &self.settings.command,
            request.host_duration_secs,
            &request.overlays,
        );
        tracing::debug!(args = %args.join(" "), "Invoking render engine");

        if let Err(e) = engine.exec(&args, cancel.clone()).await {
            if e.is_termination() || cancel.is_cancelled() {
                tracing::info!(error = %e, "Render engine stopped by cancellation");
                return Ok(None);
            }
            return Err(ExportError::Invocation(e));
        }
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let Some(output) = cancellable(cancel, engine.read_file(OUTPUT_FILE)).await else {
            return Ok(None);
        };
        let bytes = output.map_err(|source| ExportError::OutputMissing {
            file: OUTPUT_FILE.to_string(),
            source,
        })?;
        tracing::info!(bytes = bytes.len(), "Read rendered output");

        Ok(Some(ExportArtifact::mp4(bytes)))
    }

    /// Fetch `uri` and write it into engine storage as `file`.
    async fn stage(
        &self,
        engine: &mut dyn RenderEngine,
        uri: &str,
        file: &str,
    ) -> Result<Vec<u8>, ExportError> {
        let staging_error = |message: String| ExportError::AssetStaging {
            file: file.to_string(),
            uri: uri.to_string(),
            message,
        };

        let bytes = self
            .fetcher
            .fetch(uri)
            .await
            .map_err(|e| staging_error(e.to_string()))?;
        engine
            .write_file(file, &bytes)
            .await
            .map_err(|e| staging_error(e.to_string()))?;

        tracing::info!(uri, file, bytes = bytes.len(), "Staged input");
        Ok(bytes)
    }
}

fn validate_request(request: &ExportRequest) -> Result<(), ExportError> {
    if request.host_uri.trim().is_empty() {
        return Err(ExportError::InvalidRequest {
            message: "no host video".to_string(),
        });
    }
    let duration = request.host_duration_secs;
    if !duration.is_finite() || duration <= 0.0 {
        return Err(ExportError::InvalidRequest {
            message: format!("host duration {duration} is not a positive number of seconds"),
        });
    }
    Ok(())
}

/// Await `fut` unless `cancel` fires first.
async fn cancellable<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        output = fut => Some(output),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Per-job resources that must be released on every exit path: the elapsed
/// refresher, the engine progress subscription, and the running gate.
struct JobGuard {
    status: Arc<watch::Sender<ExportStatus>>,
    active: Arc<Mutex<Option<CancellationToken>>>,
    tracker: Arc<Mutex<ProgressTracker>>,
    clock: JobClock,
    tasks: Vec<JoinHandle<()>>,
    settled: bool,
}

impl JobGuard {
    /// Enter Running and start the elapsed refresher.
    fn start(
        status: Arc<watch::Sender<ExportStatus>>,
        active: Arc<Mutex<Option<CancellationToken>>>,
        clock: JobClock,
        host_duration_secs: f64,
        tick_interval: Duration,
    ) -> Self {
        status.send_replace(ExportStatus {
            state: ExportState::Running,
            progress_ratio: 0.0,
            elapsed_secs: 0.0,
        });

        let ticker = {
            let status = Arc::clone(&status);
            let clock = clock.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(tick_interval);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    interval.tick().await;
                    let elapsed = clock.elapsed_secs();
                    status.send_if_modified(|s| {
                        if s.state != ExportState::Running || elapsed <= s.elapsed_secs {
                            return false;
                        }
                        s.elapsed_secs = elapsed;
                        true
                    });
                }
            })
        };

        Self {
            status,
            active,
            tracker: Arc::new(Mutex::new(ProgressTracker::new(host_duration_secs))),
            clock,
            tasks: vec![ticker],
            settled: false,
        }
    }

    /// Feed engine progress events into the estimator until the job ends.
    fn watch_engine(&mut self, mut events: broadcast::Receiver<EngineProgress>) {
        let status = Arc::clone(&self.status);
        let tracker = Arc::clone(&self.tracker);
        let clock = self.clock.clone();
        let task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(EngineProgress { time_secs }) => {
                        tracing::trace!(engine_time_secs = ?time_secs, "Engine progress");
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::trace!(skipped, "Engine progress lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
                let ratio = lock(&tracker).observe(clock.elapsed_secs());
                status.send_if_modified(|s| {
                    if s.state != ExportState::Running || ratio <= s.progress_ratio {
                        return false;
                    }
                    s.progress_ratio = ratio;
                    true
                });
            }
        });
        self.tasks.push(task);
    }

    fn finish(mut self, state: ExportState) {
        self.settle(state);
    }

    fn settle(&mut self, state: ExportState) {
        if self.settled {
            return;
        }
        self.settled = true;

        for task in self.tasks.drain(..) {
            task.abort();
        }

        let ratio = lock(&self.tracker).finish();
        let elapsed = self.clock.elapsed_secs();
        self.status.send_modify(|s| {
            s.state = state;
            s.progress_ratio = ratio;
            s.elapsed_secs = s.elapsed_secs.max(elapsed);
        });

        lock(&self.active).take();
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        // Reached without `finish` only when the run future is dropped mid-job.
        self.settle(ExportState::Cancelled);
    }
}

/// Why an export failed.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("An export is already running")]
    AlreadyRunning,

    #[error("Invalid export request: {message}")]
    InvalidRequest { message: String },

    #[error("Failed to load render engine: {0}")]
    EngineLoad(#[source] EngineError),

    #[error("Failed to stage {file} from {uri}: {message}")]
    AssetStaging {
        file: String,
        uri: String,
        message: String,
    },

    #[error("Could not determine the duration of overlay {uri}")]
    DurationUnavailable { uri: String },

    #[error("Render failed: {0}")]
    Invocation(#[source] EngineError),

    #[error("Output {file} was not produced: {source}")]
    OutputMissing {
        file: String,
        #[source]
        source: EngineError,
    },
}
