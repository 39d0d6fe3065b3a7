use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::codecs::gif::GifEncoder;
use image::{Delay, Frame, Rgba, RgbaImage};
use tokio::sync::{broadcast, Notify};
use tokio_util::sync::CancellationToken;

use gifmix_common::error::{GifmixError, GifmixResult};
use gifmix_project_model::{ExportRequest, Overlay, TimeWindow, Transform};
use gifmix_render_engine::command::{CommandOptions, HOST_INPUT_FILE, OUTPUT_FILE, OVERLAY_INPUT_FILE};
use gifmix_render_engine::{
    AssetFetcher, EngineError, EngineFactory, EngineProgress, ExportError, ExportOrchestrator,
    ExportOutcome, ExportSettings, ExportState, RenderEngine,
};

const HOST_URI: &str = "clips/host.mp4";
const GIF_URI: &str = "https://media.example/wave.gif";

#[derive(Debug, Clone)]
enum ExecPlan {
    /// Emit `events` progress updates, then write `output` (if any) and succeed.
    Succeed {
        events: usize,
        output: Option<Vec<u8>>,
    },
    /// Fail with a non-termination error.
    Fail,
    /// Report termination without any cancellation having been requested.
    ReportTerminated,
    /// Emit one progress event after a short delay, then wait for cancellation.
    Hang,
}

#[derive(Debug, Clone)]
struct EnginePlan {
    fail_load: bool,
    fail_write: bool,
    /// Never finish loading.
    park_load: bool,
    /// Never finish the first file write.
    park_write: bool,
    exec: ExecPlan,
}

impl EnginePlan {
    fn succeed() -> Self {
        Self {
            fail_load: false,
            fail_write: false,
            park_load: false,
            park_write: false,
            exec: ExecPlan::Succeed {
                events: 3,
                output: Some(b"rendered-mp4".to_vec()),
            },
        }
    }

    fn exec(exec: ExecPlan) -> Self {
        Self {
            exec,
            ..Self::succeed()
        }
    }
}

#[derive(Default)]
struct EngineLog {
    created: AtomicUsize,
    live: AtomicUsize,
    terminated: AtomicUsize,
    exec_args: Mutex<Vec<Vec<String>>>,
    written: Mutex<Vec<String>>,
    exec_started: Notify,
    parked: Notify,
}

struct MockEngine {
    plan: EnginePlan,
    log: Arc<EngineLog>,
    files: HashMap<String, Vec<u8>>,
    progress_tx: broadcast::Sender<EngineProgress>,
}

impl Drop for MockEngine {
    fn drop(&mut self) {
        self.log.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RenderEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn load(&mut self) -> Result<(), EngineError> {
        if self.plan.park_load {
            self.log.parked.notify_one();
            std::future::pending::<()>().await;
        }
        if self.plan.fail_load {
            return Err(EngineError::Unavailable {
                message: "mock refused to load".to_string(),
            });
        }
        Ok(())
    }

    async fn write_file(&mut self, name: &str, data: &[u8]) -> Result<(), EngineError> {
        if self.plan.park_write {
            self.log.parked.notify_one();
            std::future::pending::<()>().await;
        }
        if self.plan.fail_write {
            return Err(EngineError::Io(std::io::Error::other("disk full")));
        }
        self.log.written.lock().unwrap().push(name.to_string());
        self.files.insert(name.to_string(), data.to_vec());
        Ok(())
    }

    async fn read_file(&mut self, name: &str) -> Result<Vec<u8>, EngineError> {
        self.files
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::FileNotFound {
                name: name.to_string(),
            })
    }

    fn subscribe_progress(&self) -> broadcast::Receiver<EngineProgress> {
        self.progress_tx.subscribe()
    }

    async fn exec(&mut self, args: &[String], cancel: CancellationToken) -> Result<(), EngineError> {
        self.log.exec_args.lock().unwrap().push(args.to_vec());
        self.log.exec_started.notify_one();

        match self.plan.exec.clone() {
            ExecPlan::Succeed { events, output } => {
                for i in 0..events {
                    let _ = self.progress_tx.send(EngineProgress {
                        time_secs: Some(i as f64),
                    });
                    tokio::task::yield_now().await;
                }
                if let Some(bytes) = output {
                    self.files.insert(OUTPUT_FILE.to_string(), bytes);
                }
                Ok(())
            }
            ExecPlan::Fail => Err(EngineError::Exit {
                status: "exit status: 1".to_string(),
                stderr: "Invalid filter graph".to_string(),
            }),
            ExecPlan::ReportTerminated => Err(EngineError::Terminated),
            ExecPlan::Hang => {
                tokio::time::sleep(Duration::from_millis(5)).await;
                let _ = self.progress_tx.send(EngineProgress { time_secs: None });
                cancel.cancelled().await;
                Err(EngineError::Terminated)
            }
        }
    }

    fn terminate(&mut self) -> Result<(), EngineError> {
        self.log.terminated.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct MockFactory {
    log: Arc<EngineLog>,
    plans: Mutex<VecDeque<EnginePlan>>,
}

impl MockFactory {
    fn new(plans: Vec<EnginePlan>) -> Arc<Self> {
        Arc::new(Self {
            log: Arc::new(EngineLog::default()),
            plans: Mutex::new(plans.into()),
        })
    }
}

impl EngineFactory for MockFactory {
    fn create(&self) -> Box<dyn RenderEngine> {
        let plan = self
            .plans
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(EnginePlan::succeed);
        self.log.created.fetch_add(1, Ordering::SeqCst);
        self.log.live.fetch_add(1, Ordering::SeqCst);
        let (progress_tx, _) = broadcast::channel(16);
        Box::new(MockEngine {
            plan,
            log: Arc::clone(&self.log),
            files: HashMap::new(),
            progress_tx,
        })
    }
}

struct MapFetcher(HashMap<String, Vec<u8>>);

#[async_trait]
impl AssetFetcher for MapFetcher {
    async fn fetch(&self, uri: &str) -> GifmixResult<Vec<u8>> {
        self.0
            .get(uri)
            .cloned()
            .ok_or_else(|| GifmixError::fetch(format!("no such asset: {uri}")))
    }
}

fn sample_gif() -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut buf);
        let frames = (0..3u8).map(|i| {
            let image = RgbaImage::from_pixel(4, 4, Rgba([i * 60, 10, 200, 255]));
            Frame::from_parts(image, 0, 0, Delay::from_numer_denom_ms(200, 1))
        });
        encoder.encode_frames(frames).unwrap();
    }
    buf
}

fn full_fetcher() -> Arc<MapFetcher> {
    Arc::new(MapFetcher(HashMap::from([
        (HOST_URI.to_string(), b"host-video".to_vec()),
        (GIF_URI.to_string(), sample_gif()),
    ])))
}

fn settings() -> ExportSettings {
    ExportSettings {
        command: CommandOptions::default(),
        tick_interval: Duration::from_millis(10),
    }
}

fn orchestrator(factory: &Arc<MockFactory>, fetcher: Arc<MapFetcher>) -> Arc<ExportOrchestrator> {
    Arc::new(ExportOrchestrator::new(
        Arc::clone(factory) as Arc<dyn EngineFactory>,
        fetcher,
        settings(),
    ))
}

fn overlay_request(host_duration: f64) -> ExportRequest {
    ExportRequest {
        host_uri: HOST_URI.to_string(),
        host_duration_secs: host_duration,
        overlays: vec![Overlay::new(
            GIF_URI,
            TimeWindow::new(2.0, 5.0, host_duration).unwrap(),
            Transform::new(100.0, 100.0, 1.0, 0.0).unwrap(),
        )],
    }
}

fn plain_request(host_duration: f64) -> ExportRequest {
    ExportRequest {
        host_uri: HOST_URI.to_string(),
        host_duration_secs: host_duration,
        overlays: vec![],
    }
}

async fn wait_until<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn overlay_export_completes_and_releases_engine() {
    let factory = MockFactory::new(vec![]);
    let orch = orchestrator(&factory, full_fetcher());

    let outcome = orch.run(overlay_request(10.0)).await.unwrap();

    let artifact = match outcome {
        ExportOutcome::Completed(artifact) => artifact,
        other => panic!("expected completion, got {other:?}"),
    };
    assert_eq!(artifact.bytes, b"rendered-mp4");
    assert_eq!(artifact.file_name, "output.mp4");
    assert_eq!(artifact.mime_type, "video/mp4");

    let status = orch.status();
    assert_eq!(status.state, ExportState::Completed);
    assert_eq!(status.progress_ratio, 1.0);
    assert!(!orch.is_running());

    let written = factory.log.written.lock().unwrap().clone();
    assert_eq!(written, vec![HOST_INPUT_FILE, OVERLAY_INPUT_FILE]);

    let args = factory.log.exec_args.lock().unwrap()[0].clone();
    let joined = args.join(" ");
    assert!(joined.contains("between(t,2,5)"));
    assert!(joined.contains("-stream_loop -1"));
    assert!(joined.contains("-t 10"));

    assert_eq!(factory.log.created.load(Ordering::SeqCst), 1);
    assert_eq!(factory.log.live.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn pass_through_export_stages_only_host() {
    let factory = MockFactory::new(vec![]);
    let orch = orchestrator(&factory, full_fetcher());

    let outcome = orch.run(plain_request(3.5)).await.unwrap();
    assert!(matches!(outcome, ExportOutcome::Completed(_)));

    let written = factory.log.written.lock().unwrap().clone();
    assert_eq!(written, vec![HOST_INPUT_FILE]);

    let args = factory.log.exec_args.lock().unwrap()[0].clone();
    assert!(!args.iter().any(|a| a == "-filter_complex"));
    assert!(args.join(" ").contains("-t 3.5"));
}

#[tokio::test]
async fn cancelling_running_job_ends_cancelled_and_allows_restart() {
    let factory = MockFactory::new(vec![EnginePlan::exec(ExecPlan::Hang)]);
    let orch = orchestrator(&factory, full_fetcher());

    let job = {
        let orch = Arc::clone(&orch);
        tokio::spawn(async move { orch.run(overlay_request(10.0)).await })
    };

    factory.log.exec_started.notified().await;
    assert!(orch.is_running());
    assert_eq!(orch.status().state, ExportState::Running);
    assert!(orch.cancel());

    let outcome = job.await.unwrap().unwrap();
    assert_eq!(outcome, ExportOutcome::Cancelled);

    let status = orch.status();
    assert_eq!(status.state, ExportState::Cancelled);
    assert_eq!(status.progress_ratio, 1.0);
    assert_eq!(factory.log.terminated.load(Ordering::SeqCst), 1);
    assert_eq!(factory.log.live.load(Ordering::SeqCst), 0);
    assert!(!orch.cancel());

    let outcome = orch.run(plain_request(4.0)).await.unwrap();
    assert!(matches!(outcome, ExportOutcome::Completed(_)));
    assert_eq!(factory.log.created.load(Ordering::SeqCst), 2);
}

async fn assert_cancelled_while_parked(plan: EnginePlan) {
    let factory = MockFactory::new(vec![plan]);
    let orch = orchestrator(&factory, full_fetcher());

    let job = {
        let orch = Arc::clone(&orch);
        tokio::spawn(async move { orch.run(overlay_request(10.0)).await })
    };

    factory.log.parked.notified().await;
    assert_eq!(orch.status().state, ExportState::Running);
    assert!(orch.cancel());

    let outcome = tokio::time::timeout(Duration::from_secs(5), job)
        .await
        .expect("job did not observe cancellation")
        .unwrap()
        .unwrap();
    assert_eq!(outcome, ExportOutcome::Cancelled);

    let status = orch.status();
    assert_eq!(status.state, ExportState::Cancelled);
    assert_eq!(status.progress_ratio, 1.0);
    assert_eq!(factory.log.terminated.load(Ordering::SeqCst), 1);
    assert_eq!(factory.log.live.load(Ordering::SeqCst), 0);
    assert!(factory.log.exec_args.lock().unwrap().is_empty());
    assert!(!orch.is_running());
}

#[tokio::test]
async fn cancel_during_engine_load() {
    assert_cancelled_while_parked(EnginePlan {
        park_load: true,
        ..EnginePlan::succeed()
    })
    .await;
}

#[tokio::test]
async fn cancel_during_asset_staging() {
    assert_cancelled_while_parked(EnginePlan {
        park_write: true,
        ..EnginePlan::succeed()
    })
    .await;
}

#[tokio::test]
async fn second_start_while_running_is_rejected() {
    let factory = MockFactory::new(vec![EnginePlan::exec(ExecPlan::Hang)]);
    let orch = orchestrator(&factory, full_fetcher());

    let job = {
        let orch = Arc::clone(&orch);
        tokio::spawn(async move { orch.run(plain_request(10.0)).await })
    };
    factory.log.exec_started.notified().await;

    let rejected = orch.run(plain_request(10.0)).await;
    assert!(matches!(rejected, Err(ExportError::AlreadyRunning)));
    assert_eq!(orch.status().state, ExportState::Running);
    assert_eq!(factory.log.created.load(Ordering::SeqCst), 1);

    orch.cancel();
    assert_eq!(job.await.unwrap().unwrap(), ExportOutcome::Cancelled);
}

#[tokio::test]
async fn progress_is_reported_while_running() {
    let factory = MockFactory::new(vec![EnginePlan::exec(ExecPlan::Hang)]);
    let orch = orchestrator(&factory, full_fetcher());
    let mut updates = orch.subscribe();

    let job = {
        let orch = Arc::clone(&orch);
        // Tiny host duration so wall-clock progress saturates quickly.
        tokio::spawn(async move { orch.run(plain_request(0.001)).await })
    };

    wait_until(|| orch.status().progress_ratio > 0.0).await;
    let status = orch.status();
    assert_eq!(status.state, ExportState::Running);
    assert!(status.progress_ratio <= 1.0);

    wait_until(|| orch.status().elapsed_secs > 0.0).await;

    orch.cancel();
    job.await.unwrap().unwrap();
    assert!(updates.has_changed().unwrap());
    assert_eq!(updates.borrow_and_update().state, ExportState::Cancelled);
}

#[tokio::test]
async fn staging_failure_fails_and_stops_timer() {
    let factory = MockFactory::new(vec![]);
    let fetcher = Arc::new(MapFetcher(HashMap::new()));
    let orch = orchestrator(&factory, fetcher);

    let err = orch.run(plain_request(5.0)).await.unwrap_err();
    assert!(matches!(err, ExportError::AssetStaging { .. }));
    assert!(err.to_string().contains(HOST_URI));

    let status = orch.status();
    assert_eq!(status.state, ExportState::Failed);
    assert_eq!(status.progress_ratio, 1.0);
    assert!(factory.log.exec_args.lock().unwrap().is_empty());

    // The elapsed refresher must not outlive the job.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(orch.status(), status);
    assert_eq!(factory.log.live.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn engine_write_failure_is_a_staging_error() {
    let factory = MockFactory::new(vec![EnginePlan {
        fail_write: true,
        ..EnginePlan::succeed()
    }]);
    let orch = orchestrator(&factory, full_fetcher());

    let err = orch.run(plain_request(5.0)).await.unwrap_err();
    assert!(matches!(err, ExportError::AssetStaging { .. }));
    assert!(err.to_string().contains("disk full"));
    assert_eq!(orch.status().state, ExportState::Failed);
}

#[tokio::test]
async fn engine_load_failure_is_reported() {
    let factory = MockFactory::new(vec![EnginePlan {
        fail_load: true,
        ..EnginePlan::succeed()
    }]);
    let orch = orchestrator(&factory, full_fetcher());

    let err = orch.run(plain_request(5.0)).await.unwrap_err();
    assert!(matches!(err, ExportError::EngineLoad(_)));
    assert_eq!(orch.status().state, ExportState::Failed);
    assert_eq!(factory.log.live.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn undecodable_overlay_fails_with_missing_duration() {
    let factory = MockFactory::new(vec![]);
    let fetcher = Arc::new(MapFetcher(HashMap::from([
        (HOST_URI.to_string(), b"host-video".to_vec()),
        (GIF_URI.to_string(), b"not a gif".to_vec()),
    ])));
    let orch = orchestrator(&factory, fetcher);

    let err = orch.run(overlay_request(10.0)).await.unwrap_err();
    assert!(matches!(err, ExportError::DurationUnavailable { .. }));
    assert!(factory.log.exec_args.lock().unwrap().is_empty());
    assert_eq!(orch.status().state, ExportState::Failed);
}

#[tokio::test]
async fn engine_error_surfaces_message() {
    let factory = MockFactory::new(vec![EnginePlan::exec(ExecPlan::Fail)]);
    let orch = orchestrator(&factory, full_fetcher());

    let err = orch.run(plain_request(5.0)).await.unwrap_err();
    assert!(matches!(err, ExportError::Invocation(_)));
    assert!(err.to_string().contains("Invalid filter graph"));
    assert_eq!(orch.status().state, ExportState::Failed);
}

#[tokio::test]
async fn termination_reported_by_engine_counts_as_cancellation() {
    let factory = MockFactory::new(vec![EnginePlan::exec(ExecPlan::ReportTerminated)]);
    let orch = orchestrator(&factory, full_fetcher());

    let outcome = orch.run(plain_request(5.0)).await.unwrap();
    assert_eq!(outcome, ExportOutcome::Cancelled);
    assert_eq!(orch.status().state, ExportState::Cancelled);
    assert_eq!(orch.status().progress_ratio, 1.0);
}

#[tokio::test]
async fn missing_output_is_distinct_from_engine_error() {
    let factory = MockFactory::new(vec![EnginePlan::exec(ExecPlan::Succeed {
        events: 0,
        output: None,
    })]);
    let orch = orchestrator(&factory, full_fetcher());

    let err = orch.run(plain_request(5.0)).await.unwrap_err();
    assert!(matches!(err, ExportError::OutputMissing { .. }));
    assert_eq!(orch.status().state, ExportState::Failed);
    assert_eq!(orch.status().progress_ratio, 1.0);
}

#[tokio::test]
async fn invalid_request_never_starts_a_job() {
    let factory = MockFactory::new(vec![]);
    let orch = orchestrator(&factory, full_fetcher());

    let err = orch.run(plain_request(0.0)).await.unwrap_err();
    assert!(matches!(err, ExportError::InvalidRequest { .. }));
    assert_eq!(orch.status().state, ExportState::Idle);
    assert_eq!(factory.log.created.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn dropping_the_run_future_cleans_up() {
    let factory = MockFactory::new(vec![EnginePlan::exec(ExecPlan::Hang)]);
    let orch = orchestrator(&factory, full_fetcher());

    let timed_out =
        tokio::time::timeout(Duration::from_millis(50), orch.run(plain_request(10.0))).await;
    assert!(timed_out.is_err());

    assert!(!orch.is_running());
    assert_eq!(orch.status().state, ExportState::Cancelled);
    assert_eq!(orch.status().progress_ratio, 1.0);
    assert_eq!(factory.log.live.load(Ordering::SeqCst), 0);

    let outcome = orch.run(plain_request(2.0)).await.unwrap();
    assert!(matches!(outcome, ExportOutcome::Completed(_)));
}
