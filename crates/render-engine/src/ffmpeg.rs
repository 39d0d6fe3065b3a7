//! ffmpeg-backed [`RenderEngine`].
//!
//! Working storage is a private temporary directory. Each `exec` spawns one
//! ffmpeg process inside it, with `-progress pipe:1` feeding the progress
//! channel.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use gifmix_common::error::{GifmixError, GifmixResult};

use crate::engine::{EngineError, EngineFactory, EngineProgress, RenderEngine};

const PROGRESS_CHANNEL_CAPACITY: usize = 64;

/// Arguments prepended to every invocation.
const ENGINE_PREAMBLE: [&str; 4] = ["-hide_banner", "-nostats", "-progress", "pipe:1"];

/// One ffmpeg engine instance.
pub struct FfmpegEngine {
    binary: PathBuf,
    workdir: Option<tempfile::TempDir>,
    progress_tx: broadcast::Sender<EngineProgress>,
    terminated: CancellationToken,
}

impl FfmpegEngine {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        let (progress_tx, _) = broadcast::channel(PROGRESS_CHANNEL_CAPACITY);
        Self {
            binary: binary.into(),
            workdir: None,
            progress_tx,
            terminated: CancellationToken::new(),
        }
    }

    fn storage_path(&self, name: &str) -> Result<PathBuf, EngineError> {
        if self.terminated.is_cancelled() {
            return Err(EngineError::Terminated);
        }
        let dir = self.workdir.as_ref().ok_or(EngineError::NotLoaded)?;
        let is_plain_name = !name.is_empty()
            && Path::new(name).file_name().and_then(|n| n.to_str()) == Some(name);
        if !is_plain_name {
            return Err(EngineError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("storage names must be plain file names, got {name:?}"),
            )));
        }
        Ok(dir.path().join(name))
    }
}

#[async_trait]
impl RenderEngine for FfmpegEngine {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn load(&mut self) -> Result<(), EngineError> {
        if self.terminated.is_cancelled() {
            return Err(EngineError::Terminated);
        }
        if self.workdir.is_some() {
            return Ok(());
        }

        if !engine_available(&self.binary).await {
            return Err(EngineError::Unavailable {
                message: format!("{} could not be executed", self.binary.display()),
            });
        }

        let dir = tempfile::Builder::new().prefix("gifmix-engine-").tempdir()?;
        tracing::debug!(workdir = %dir.path().display(), "ffmpeg engine loaded");
        self.workdir = Some(dir);
        Ok(())
    }

    async fn write_file(&mut self, name: &str, data: &[u8]) -> Result<(), EngineError> {
        let path = self.storage_path(name)?;
        tokio::fs::write(&path, data).await?;
        tracing::debug!(name, bytes = data.len(), "Staged engine file");
        Ok(())
    }

    async fn read_file(&mut self, name: &str) -> Result<Vec<u8>, EngineError> {
        let path = self.storage_path(name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(EngineError::FileNotFound {
                name: name.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn subscribe_progress(&self) -> broadcast::Receiver<EngineProgress> {
        self.progress_tx.subscribe()
    }

    async fn exec(&mut self, args: &[String], cancel: CancellationToken) -> Result<(), EngineError> {
        if self.terminated.is_cancelled() {
            return Err(EngineError::Terminated);
        }
        let dir = self
            .workdir
            .as_ref()
            .ok_or(EngineError::NotLoaded)?
            .path()
            .to_path_buf();

        tracing::debug!(args = ?args, "Running ffmpeg");
        let mut child = Command::new(&self.binary)
            .args(ENGINE_PREAMBLE)
            .args(args)
            .current_dir(&dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Unavailable {
                message: format!("failed to start {}: {e}", self.binary.display()),
            })?;

        tracing::info!(pid = child.id(), args_len = args.len(), "ffmpeg process started");

        let stdout = child.stdout.take().ok_or_else(|| {
            EngineError::Io(std::io::Error::other("failed to capture ffmpeg stdout"))
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            EngineError::Io(std::io::Error::other("failed to capture ffmpeg stderr"))
        })?;

        // Drain stderr concurrently so ffmpeg never blocks on a full pipe.
        let stderr_task = tokio::spawn(drain_to_string(stderr));

        let progress_tx = self.progress_tx.clone();
        let terminated = self.terminated.clone();
        let finished = tokio::select! {
            _ = cancel.cancelled() => None,
            _ = terminated.cancelled() => None,
            status = async {
                pump_progress(stdout, &progress_tx).await?;
                child.wait().await
            } => Some(status),
        };

        let Some(status) = finished else {
            if let Err(e) = child.start_kill() {
                tracing::warn!(error = %e, "Failed to kill ffmpeg");
            }
            let _ = child.wait().await;
            stderr_task.abort();
            tracing::info!("ffmpeg terminated before completion");
            return Err(EngineError::Terminated);
        };
        let status = status?;

        let stderr_output = stderr_task
            .await
            .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());

        if !status.success() {
            return Err(EngineError::Exit {
                status: status.to_string(),
                stderr: stderr_output.trim().to_string(),
            });
        }
        Ok(())
    }

    fn terminate(&mut self) -> Result<(), EngineError> {
        self.terminated.cancel();
        if let Some(dir) = self.workdir.take() {
            dir.close()?;
        }
        Ok(())
    }
}

/// Creates [`FfmpegEngine`]s for a configured binary.
#[derive(Debug, Clone)]
pub struct FfmpegFactory {
    binary: PathBuf,
}

impl FfmpegFactory {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl EngineFactory for FfmpegFactory {
    fn create(&self) -> Box<dyn RenderEngine> {
        Box::new(FfmpegEngine::new(self.binary.clone()))
    }
}

/// Key/value state accumulated from `-progress` output.
#[derive(Debug, Default)]
struct ProgressState {
    out_time_secs: Option<f64>,
    complete: bool,
}

impl ProgressState {
    fn update(&mut self, key: &str, value: &str) {
        match key {
            // Despite the name, ffmpeg reports out_time_ms in microseconds.
            "out_time_ms" | "out_time_us" => {
                if let Ok(us) = value.parse::<f64>() {
                    self.out_time_secs = Some(us / 1_000_000.0);
                }
            }
            "progress" => {
                self.complete = value == "end";
            }
            _ => {}
        }
    }
}

async fn pump_progress<R>(
    stdout: R,
    progress_tx: &broadcast::Sender<EngineProgress>,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stdout).lines();
    let mut state = ProgressState::default();
    while let Some(line) = lines.next_line().await? {
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        state.update(key, value);
        if key == "progress" {
            tracing::trace!(
                out_time_secs = ?state.out_time_secs,
                complete = state.complete,
                "ffmpeg progress"
            );
            // No subscribers is fine.
            let _ = progress_tx.send(EngineProgress {
                time_secs: state.out_time_secs,
            });
        }
    }
    Ok(())
}

async fn drain_to_string<R>(reader: R) -> String
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut output = String::new();
    match reader.read_to_string(&mut output).await {
        Ok(_) => output,
        Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
    }
}

/// Whether `binary -version` runs successfully.
pub async fn engine_available(binary: &Path) -> bool {
    Command::new(binary)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Read a media file's duration in seconds with ffprobe.
pub async fn probe_duration(ffprobe: &Path, media: &Path) -> GifmixResult<f64> {
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(media)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| GifmixError::engine(format!("Failed to run {}: {e}", ffprobe.display())))?;

    if !output.status.success() {
        return Err(GifmixError::engine(format!(
            "ffprobe failed on {}: {}",
            media.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let raw = String::from_utf8_lossy(&output.stdout);
    parse_probe_duration(&raw).ok_or_else(|| {
        GifmixError::decode(format!(
            "ffprobe reported no usable duration for {}",
            media.display()
        ))
    })
}

fn parse_probe_duration(raw: &str) -> Option<f64> {
    let secs = raw.lines().next()?.trim().parse::<f64>().ok()?;
    (secs.is_finite() && secs > 0.0).then_some(secs)
}
