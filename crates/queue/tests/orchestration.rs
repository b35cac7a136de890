//! End-to-end orchestration tests for the generation queue.
//!
//! Drives the poller, store, ledger, and upload orchestrator against
//! scripted in-memory collaborators: exact remote responses per sweep,
//! recording asset publisher with optional per-generation delays and
//! failures, and a counting analyzer.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use vlab_core::types::{
    AnalysisResult, AssetMetadata, GenerationRequest, Generation, JobStatus, VideoJob,
};
use vlab_events::{EventBus, ObserverRegistry, QueueEvent};
use vlab_queue::{
    Analyzer, AssetPublisher, JobService, Poller, PollerConfig, QueueItemStatus, QueueSettings,
    QueueStore, ServiceError, UnifiedCreation, UploadConfig, UploadLedger, UploadOrchestrator,
};

// ---------------------------------------------------------------------------
// Scripted collaborators
// ---------------------------------------------------------------------------

/// JobService whose `get_job` answers are scripted per call, in order.
struct ScriptedJobs {
    create_response: Mutex<Option<VideoJob>>,
    status_script: Mutex<Vec<Result<VideoJob, ServiceError>>>,
}

impl ScriptedJobs {
    fn new(create: VideoJob, script: Vec<Result<VideoJob, ServiceError>>) -> Self {
        Self {
            create_response: Mutex::new(Some(create)),
            status_script: Mutex::new(script),
        }
    }
}

#[async_trait]
impl JobService for ScriptedJobs {
    async fn create_job(&self, _: &GenerationRequest) -> Result<VideoJob, ServiceError> {
        self.create_response
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ServiceError::Other("no create response scripted".into()))
    }

    async fn create_job_with_analysis(
        &self,
        _: &GenerationRequest,
    ) -> Result<UnifiedCreation, ServiceError> {
        Err(ServiceError::Other("unified path not scripted".into()))
    }

    async fn get_job(&self, _: &str) -> Result<VideoJob, ServiceError> {
        let mut script = self.status_script.lock().unwrap();
        if script.is_empty() {
            return Err(ServiceError::Other("status script exhausted".into()));
        }
        script.remove(0)
    }
}

/// AssetPublisher that records calls and can delay or fail per id.
#[derive(Default)]
struct RecordingPublisher {
    /// Every publish attempt, in invocation order.
    attempts: Mutex<Vec<String>>,
    /// Successful publishes only.
    published: Mutex<Vec<String>>,
    delay: Option<Duration>,
    fail_ids: HashSet<String>,
}

impl RecordingPublisher {
    fn attempt_count(&self, generation_id: &str) -> usize {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .filter(|id| id.as_str() == generation_id)
            .count()
    }
}

#[async_trait]
impl AssetPublisher for RecordingPublisher {
    async fn publish(
        &self,
        generation_id: &str,
        _destination_name: &str,
        _metadata: &AssetMetadata,
    ) -> Result<(), ServiceError> {
        self.attempts.lock().unwrap().push(generation_id.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_ids.contains(generation_id) {
            return Err(ServiceError::Network("connection reset".into()));
        }
        self.published.lock().unwrap().push(generation_id.to_string());
        Ok(())
    }
}

/// Analyzer that counts calls and optionally always fails.
struct CountingAnalyzer {
    calls: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl Analyzer for CountingAnalyzer {
    async fn analyze(&self, _: &str) -> Result<AnalysisResult, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ServiceError::Api {
                status: 500,
                message: "analysis backend unavailable".into(),
            });
        }
        Ok(AnalysisResult {
            summary: "a fox runs".into(),
            products: "none".into(),
            tags: vec!["fox".into()],
            feedback: "sharp".into(),
        })
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn job(id: &str, status: JobStatus, generation_ids: &[&str]) -> VideoJob {
    VideoJob {
        id: id.to_string(),
        status,
        prompt: "a red fox".into(),
        n_variants: generation_ids.len().max(1) as u32,
        n_seconds: 10,
        height: 720,
        width: 1280,
        created_at: Some(chrono::Utc::now().timestamp() - 30),
        finished_at: None,
        failure_reason: None,
        generations: generation_ids
            .iter()
            .map(|gid| Generation {
                id: gid.to_string(),
                job_id: id.to_string(),
                prompt: "a red fox".into(),
            })
            .collect(),
    }
}

struct Harness {
    store: Arc<QueueStore>,
    poller: Arc<Poller>,
    publisher: Arc<RecordingPublisher>,
    analyzer: Arc<CountingAnalyzer>,
    ledger: Arc<UploadLedger>,
    bus: Arc<EventBus>,
    observers: Arc<ObserverRegistry>,
    cancel: CancellationToken,
}

fn harness(jobs: ScriptedJobs, publisher: RecordingPublisher, failing_analyzer: bool) -> Harness {
    let jobs: Arc<ScriptedJobs> = Arc::new(jobs);
    let publisher = Arc::new(publisher);
    let analyzer = Arc::new(CountingAnalyzer {
        calls: AtomicUsize::new(0),
        fail: failing_analyzer,
    });
    let ledger = Arc::new(UploadLedger::new());
    let bus = Arc::new(EventBus::default());
    let observers = Arc::new(ObserverRegistry::new());
    let store = Arc::new(QueueStore::new(jobs.clone()));

    let uploads = Arc::new(UploadOrchestrator::new(
        publisher.clone(),
        Some(analyzer.clone() as Arc<dyn Analyzer>),
        ledger.clone(),
        UploadConfig {
            analysis_settle: Duration::ZERO,
        },
    ));
    let poller = Arc::new(Poller::new(
        store.clone(),
        jobs,
        uploads,
        observers.clone(),
        bus.clone(),
        PollerConfig {
            interval: Duration::from_millis(10),
            notify_settle: Duration::ZERO,
        },
    ));

    Harness {
        store,
        poller,
        publisher,
        analyzer,
        ledger,
        bus,
        observers,
        cancel: CancellationToken::new(),
    }
}

async fn enqueue(h: &Harness, settings: QueueSettings) -> String {
    h.store.enqueue("a red fox", settings).await.expect("enqueue")
}

// ---------------------------------------------------------------------------
// Scenario: first poll finds the job succeeded with two generations
// ---------------------------------------------------------------------------

#[tokio::test]
async fn succeeded_job_uploads_each_generation_exactly_once() {
    let h = harness(
        ScriptedJobs::new(
            job("j1", JobStatus::Queued, &[]),
            vec![Ok(job("j1", JobStatus::Succeeded, &["g1", "g2"]))],
        ),
        RecordingPublisher::default(),
        false,
    );
    let id = enqueue(&h, QueueSettings::default()).await;

    let report = h.poller.sweep(&h.cancel).await;
    assert_eq!(report.completed, 1);
    assert_eq!(report.uploads.len(), 1);
    assert_eq!(report.uploads[0].uploaded, 2);
    assert_eq!(report.uploads[0].failed, 0);

    assert_eq!(h.publisher.attempt_count("g1"), 1);
    assert_eq!(h.publisher.attempt_count("g2"), 1);
    assert!(h.ledger.is_claimed("g1"));
    assert!(h.ledger.is_claimed("g2"));

    let item = h.store.get(&id).await.unwrap();
    assert_eq!(item.status, QueueItemStatus::Completed);
    assert_eq!(item.progress, Some(100));
    assert!(item.upload_complete);
}

// ---------------------------------------------------------------------------
// Scenario: overlapping sweeps race on the same generation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn overlapping_sweeps_never_double_upload() {
    let h = harness(
        ScriptedJobs::new(
            job("j1", JobStatus::Queued, &[]),
            vec![
                Ok(job("j1", JobStatus::Succeeded, &["g1"])),
                Ok(job("j1", JobStatus::Succeeded, &["g1"])),
            ],
        ),
        RecordingPublisher {
            delay: Some(Duration::from_millis(200)),
            ..RecordingPublisher::default()
        },
        false,
    );
    enqueue(&h, QueueSettings::default()).await;

    // First sweep claims g1 and is still uploading (200ms) when the
    // second sweep fires.
    let slow = {
        let poller = h.poller.clone();
        let cancel = h.cancel.clone();
        tokio::spawn(async move { poller.sweep(&cancel).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    let fast = h.poller.sweep(&h.cancel).await;
    let slow = slow.await.unwrap();

    assert_eq!(h.publisher.attempt_count("g1"), 1);
    assert_eq!(slow.uploads.len() + fast.uploads.len(), 1);
}

// ---------------------------------------------------------------------------
// Scenario: transient poll errors, then success
// ---------------------------------------------------------------------------

#[tokio::test]
async fn transient_errors_leave_item_unchanged_until_success() {
    let h = harness(
        ScriptedJobs::new(
            job("j1", JobStatus::Queued, &[]),
            vec![
                Err(ServiceError::Timeout("network timeout".into())),
                Err(ServiceError::Timeout("network timeout".into())),
                Err(ServiceError::Timeout("network timeout".into())),
                Ok(job("j1", JobStatus::Succeeded, &["g1"])),
            ],
        ),
        RecordingPublisher::default(),
        false,
    );
    let id = enqueue(&h, QueueSettings::default()).await;

    for _ in 0..3 {
        h.poller.sweep(&h.cancel).await;
        let item = h.store.get(&id).await.unwrap();
        assert!(!item.status.is_terminal());
        assert!(!item.upload_started);
    }

    h.poller.sweep(&h.cancel).await;
    let item = h.store.get(&id).await.unwrap();
    assert_eq!(item.status, QueueItemStatus::Completed);
    assert!(item.upload_complete);
}

// ---------------------------------------------------------------------------
// Scenario: definitive error fails the item terminally
// ---------------------------------------------------------------------------

#[tokio::test]
async fn definitive_error_fails_item_and_stops_polling() {
    let h = harness(
        ScriptedJobs::new(
            job("j1", JobStatus::Queued, &[]),
            vec![Err(ServiceError::Api {
                status: 404,
                message: "job not found".into(),
            })],
        ),
        RecordingPublisher::default(),
        false,
    );
    let id = enqueue(&h, QueueSettings::default()).await;
    let mut events = h.bus.subscribe();

    let report = h.poller.sweep(&h.cancel).await;
    assert_eq!(report.failed, 1);

    let item = h.store.get(&id).await.unwrap();
    assert_eq!(item.status, QueueItemStatus::Failed);

    assert!(matches!(
        events.try_recv(),
        Ok(QueueEvent::ItemFailed { .. })
    ));

    // Terminal items are skipped entirely on later sweeps.
    let report = h.poller.sweep(&h.cancel).await;
    assert_eq!(report.polled, 0);
}

// ---------------------------------------------------------------------------
// Scenario: zero generations
// ---------------------------------------------------------------------------

#[tokio::test]
async fn zero_generation_job_completes_with_informational_summary() {
    let h = harness(
        ScriptedJobs::new(
            job("j1", JobStatus::Queued, &[]),
            vec![Ok(job("j1", JobStatus::Succeeded, &[]))],
        ),
        RecordingPublisher::default(),
        false,
    );
    let id = enqueue(&h, QueueSettings::default()).await;
    let mut events = h.bus.subscribe();

    h.poller.sweep(&h.cancel).await;

    let item = h.store.get(&id).await.unwrap();
    assert_eq!(item.status, QueueItemStatus::Completed);
    assert!(item.upload_complete);
    assert!(h.publisher.attempts.lock().unwrap().is_empty());

    match events.try_recv() {
        Ok(QueueEvent::UploadSummary {
            uploaded,
            failed,
            total,
            ..
        }) => {
            assert_eq!((uploaded, failed, total), (0, 0, 0));
        }
        other => panic!("expected informational upload summary, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Scenario: analysis failure is non-fatal
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_analysis_does_not_fail_the_upload() {
    let h = harness(
        ScriptedJobs::new(
            job("j1", JobStatus::Queued, &[]),
            vec![Ok(job("j1", JobStatus::Succeeded, &["g1"]))],
        ),
        RecordingPublisher::default(),
        true, // analyzer always fails
    );
    let settings = QueueSettings {
        analyze: true,
        ..QueueSettings::default()
    };
    let id = enqueue(&h, settings).await;

    let report = h.poller.sweep(&h.cancel).await;
    assert_eq!(report.uploads[0].uploaded, 1);
    assert_eq!(report.uploads[0].failed, 0);
    assert_eq!(h.analyzer.calls.load(Ordering::SeqCst), 1);

    let item = h.store.get(&id).await.unwrap();
    assert_eq!(item.status, QueueItemStatus::Completed);
    assert!(item.upload_complete);
}

// ---------------------------------------------------------------------------
// Property: per-artifact failures are isolated
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sibling_upload_survives_a_failed_artifact() {
    let h = harness(
        ScriptedJobs::new(
            job("j1", JobStatus::Queued, &[]),
            vec![Ok(job("j1", JobStatus::Succeeded, &["g1", "g2"]))],
        ),
        RecordingPublisher {
            fail_ids: HashSet::from(["g1".to_string()]),
            ..RecordingPublisher::default()
        },
        false,
    );
    let id = enqueue(&h, QueueSettings::default()).await;

    let report = h.poller.sweep(&h.cancel).await;
    assert_eq!(report.uploads[0].uploaded, 1);
    assert_eq!(report.uploads[0].failed, 1);

    let published = h.publisher.published.lock().unwrap().clone();
    assert_eq!(published, vec!["g2".to_string()]);

    // The item settles regardless; the failed artifact is never retried
    // because its claim stands.
    let item = h.store.get(&id).await.unwrap();
    assert!(item.upload_complete);
    assert!(h.ledger.is_claimed("g1"));
}

// ---------------------------------------------------------------------------
// Property: progress estimates are sticky under small deltas
// ---------------------------------------------------------------------------

#[tokio::test]
async fn small_progress_deltas_are_not_committed() {
    let running = job("j1", JobStatus::Running, &[]);
    let h = harness(
        ScriptedJobs::new(
            job("j1", JobStatus::Queued, &[]),
            vec![Ok(running.clone()), Ok(running.clone())],
        ),
        RecordingPublisher::default(),
        false,
    );
    let id = enqueue(&h, QueueSettings::default()).await;

    h.poller.sweep(&h.cancel).await;
    let first = h.store.get(&id).await.unwrap();
    assert_eq!(first.status, QueueItemStatus::Processing);
    let first_progress = first.progress.expect("first estimate committed");
    assert!(first_progress > 0 && first_progress <= 95);

    // Back-to-back sweep: elapsed time moved by well under the 5-point
    // hysteresis threshold, so the stored value must not churn.
    h.poller.sweep(&h.cancel).await;
    let second = h.store.get(&id).await.unwrap();
    assert_eq!(second.progress, Some(first_progress));
}

// ---------------------------------------------------------------------------
// Property: observers are notified once content lands
// ---------------------------------------------------------------------------

#[tokio::test]
async fn observers_notified_after_upload_activity() {
    let h = harness(
        ScriptedJobs::new(
            job("j1", JobStatus::Queued, &[]),
            vec![Ok(job("j1", JobStatus::Succeeded, &["g1"]))],
        ),
        RecordingPublisher::default(),
        false,
    );
    enqueue(&h, QueueSettings::default()).await;

    let notified = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&notified);
    h.observers.register(
        "gallery",
        Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );

    h.poller.sweep(&h.cancel).await;
    // The notification task runs after a (zero) settling delay.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(notified.load(Ordering::SeqCst), 1);
}

// ---------------------------------------------------------------------------
// Property: a cancelled sweep discards its results
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancelled_sweep_commits_nothing_and_notifies_nobody() {
    let h = harness(
        ScriptedJobs::new(
            job("j1", JobStatus::Queued, &[]),
            vec![Ok(job("j1", JobStatus::Succeeded, &["g1"]))],
        ),
        RecordingPublisher::default(),
        false,
    );
    let id = enqueue(&h, QueueSettings::default()).await;

    let notified = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&notified);
    h.observers.register(
        "gallery",
        Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );

    h.cancel.cancel();
    h.poller.sweep(&h.cancel).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // In-flight work may have run, but no state was committed and no
    // observers were told.
    let item = h.store.get(&id).await.unwrap();
    assert_eq!(item.status, QueueItemStatus::Pending);
    assert_eq!(notified.load(Ordering::SeqCst), 0);
}

// ---------------------------------------------------------------------------
// Property: terminal states are monotonic across sweeps
// ---------------------------------------------------------------------------

#[tokio::test]
async fn completed_item_is_never_polled_again() {
    let h = harness(
        ScriptedJobs::new(
            job("j1", JobStatus::Queued, &[]),
            vec![
                Ok(job("j1", JobStatus::Succeeded, &["g1"])),
                // Would flip the item back if the poller ever consulted it.
                Ok(job("j1", JobStatus::Running, &[])),
            ],
        ),
        RecordingPublisher::default(),
        false,
    );
    let id = enqueue(&h, QueueSettings::default()).await;
    let status_before;

    h.poller.sweep(&h.cancel).await;
    {
        let item = h.store.get(&id).await.unwrap();
        assert_eq!(item.status, QueueItemStatus::Completed);
        status_before = item.status;
    }

    for _ in 0..3 {
        h.poller.sweep(&h.cancel).await;
    }
    let item = h.store.get(&id).await.unwrap();
    assert_eq!(item.status, status_before);
    assert_eq!(h.publisher.attempt_count("g1"), 1);
}

// ---------------------------------------------------------------------------
// End-to-end: the polling loop drives an item to completion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn run_loop_completes_an_item_and_stops_on_cancel() {
    let h = harness(
        ScriptedJobs::new(
            job("j1", JobStatus::Queued, &[]),
            vec![
                Ok(job("j1", JobStatus::Running, &[])),
                Ok(job("j1", JobStatus::Succeeded, &["g1"])),
            ],
        ),
        RecordingPublisher::default(),
        false,
    );
    let id = enqueue(&h, QueueSettings::default()).await;

    let handle = tokio::spawn(h.poller.clone().run(h.cancel.clone()));

    // Two 10ms ticks are plenty; poll until the item settles.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if h.store.get(&id).await.unwrap().upload_complete {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "item never completed"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    h.cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("poller should stop after cancellation")
        .unwrap();
}
