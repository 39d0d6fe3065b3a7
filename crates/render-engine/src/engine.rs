//! Contract for the external rendering engine.

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// One progress update from the engine.
///
/// The unit and reliability of `time_secs` vary between engine builds, so it
/// is advisory only. `None` is a content-less heartbeat.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineProgress {
    pub time_secs: Option<f64>,
}

/// A media engine with private working storage.
///
/// Instances are single-use: one export acquires a fresh engine, drives it,
/// and drops it.
#[async_trait]
pub trait RenderEngine: Send {
    /// Engine name for logs.
    fn name(&self) -> &str;

    /// Initialize the engine. Must succeed before any other call.
    async fn load(&mut self) -> Result<(), EngineError>;

    /// Write `data` to `name` in working storage.
    async fn write_file(&mut self, name: &str, data: &[u8]) -> Result<(), EngineError>;

    /// Read `name` from working storage.
    async fn read_file(&mut self, name: &str) -> Result<Vec<u8>, EngineError>;

    /// Subscribe to progress updates. Dropping the receiver unsubscribes.
    fn subscribe_progress(&self) -> broadcast::Receiver<EngineProgress>;

    /// Run the engine with `args`. Resolves with [`EngineError::Terminated`]
    /// once `cancel` fires or [`RenderEngine::terminate`] is called.
    async fn exec(&mut self, args: &[String], cancel: CancellationToken) -> Result<(), EngineError>;

    /// Forcefully stop the engine and release its storage. Idempotent.
    fn terminate(&mut self) -> Result<(), EngineError>;
}

/// Produces a fresh engine for each export job.
pub trait EngineFactory: Send + Sync {
    fn create(&self) -> Box<dyn RenderEngine>;
}

impl<F> EngineFactory for F
where
    F: Fn() -> Box<dyn RenderEngine> + Send + Sync,
{
    fn create(&self) -> Box<dyn RenderEngine> {
        self()
    }
}

/// Failures reported by an engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Engine unavailable: {message}")]
    Unavailable { message: String },

    #[error("Engine not loaded")]
    NotLoaded,

    #[error("Engine terminated")]
    Terminated,

    #[error("File not found in engine storage: {name}")]
    FileNotFound { name: String },

    #[error("Engine exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Whether this failure is the result of the engine being terminated.
    pub fn is_termination(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}
