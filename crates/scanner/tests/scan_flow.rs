use async_trait::async_trait;
use capture::{
    CameraBackend, CameraSessionManager, DeviceFault, Facing, LiveStream, Readiness, ReadyLevel,
    RgbFrame, StreamRequest, SurfaceStatus, VirtualBackend,
};
use recognition::{
    FailureCause, FoodRecognizer, FoodRecord, ImagePayload, Operation, RecognitionError,
};
use scanner::{
    InMemoryMealPlan, Pick, Rejected, ScanController, ScanPhase, SearchState, SourceKind,
    UploadFile, messages,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, broadcast};

type Answer = Result<Vec<FoodRecord>, RecognitionError>;

/// Recognizer that replays scripted answers and counts calls. With a gate,
/// every answer waits for one `notify_one`.
#[derive(Default)]
struct MockRecognizer {
    analyze_calls: AtomicUsize,
    search_calls: AtomicUsize,
    analyze_answers: Mutex<VecDeque<Answer>>,
    search_answers: Mutex<VecDeque<Answer>>,
    last_payload: Mutex<Option<ImagePayload>>,
    gate: Option<Arc<Notify>>,
}

impl MockRecognizer {
    fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    fn answer_analyze(self, answer: Answer) -> Self {
        self.analyze_answers.lock().unwrap().push_back(answer);
        self
    }

    fn answer_search(self, answer: Answer) -> Self {
        self.search_answers.lock().unwrap().push_back(answer);
        self
    }

    fn analyze_calls(&self) -> usize {
        self.analyze_calls.load(Ordering::SeqCst)
    }

    async fn wait_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
    }
}

#[async_trait]
impl FoodRecognizer for MockRecognizer {
    async fn analyze(&self, image: &ImagePayload) -> Result<Vec<FoodRecord>, RecognitionError> {
        self.analyze_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_payload.lock().unwrap() = Some(image.clone());
        self.wait_gate().await;
        self.analyze_answers.lock().unwrap().pop_front().unwrap_or(Ok(vec![]))
    }

    async fn search(&self, _query: &str) -> Result<Vec<FoodRecord>, RecognitionError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        self.wait_gate().await;
        self.search_answers.lock().unwrap().pop_front().unwrap_or(Ok(vec![]))
    }
}

fn apple() -> FoodRecord {
    FoodRecord::new("apple", 95.0, 0.5, 25.0, 0.3, 0.92)
}

fn server_error() -> RecognitionError {
    RecognitionError::new(Operation::Analyze, FailureCause::Status(500))
}

fn red_png() -> UploadFile {
    let mut bytes = Vec::new();
    image::RgbImage::from_pixel(10, 10, image::Rgb([255, 0, 0]))
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    UploadFile::new("red.png", Some("image/png"), bytes)
}

struct Harness {
    controller: ScanController,
    recognizer: Arc<MockRecognizer>,
    camera: VirtualBackend,
    meal_plan: Arc<InMemoryMealPlan>,
}

fn harness_with(recognizer: MockRecognizer, camera: VirtualBackend) -> Harness {
    let recognizer = Arc::new(recognizer);
    let meal_plan = Arc::new(InMemoryMealPlan::default());
    let manager = CameraSessionManager::with_resolution(Arc::new(camera.clone()), 64, 48);
    let controller = ScanController::new(recognizer.clone(), manager, meal_plan.clone());
    Harness {
        controller,
        recognizer,
        camera,
        meal_plan,
    }
}

fn harness(recognizer: MockRecognizer) -> Harness {
    harness_with(recognizer, VirtualBackend::new())
}

fn drain(events: &mut broadcast::Receiver<ScanPhase>) -> Vec<ScanPhase> {
    let mut seen = Vec::new();
    while let Ok(phase) = events.try_recv() {
        seen.push(phase);
    }
    seen
}

// ==========================================================================
// Upload and analyze
// ==========================================================================

#[tokio::test]
async fn upload_then_analyze_reaches_results_with_total() {
    let h = harness(MockRecognizer::default().answer_analyze(Ok(vec![apple()])));
    let mut events = h.controller.subscribe();
    assert_eq!(h.controller.phase(), ScanPhase::Idle);

    h.controller.select_upload(red_png()).unwrap();
    let phase = h.controller.analyze().await.unwrap();

    assert_eq!(phase, ScanPhase::HasResults);
    assert_eq!(
        drain(&mut events),
        vec![
            ScanPhase::AwaitingCapture,
            ScanPhase::HasCapture,
            ScanPhase::Analyzing,
            ScanPhase::HasResults
        ]
    );

    let view = h.controller.view();
    assert_eq!(view.records, vec![apple()]);
    assert_eq!(view.total_calories, 95.0);
    assert_eq!(view.source, Some(SourceKind::Upload));
    assert!(view.preview.is_some(), "Results keep the preview");

    let payload = h.recognizer.last_payload.lock().unwrap().clone().unwrap();
    assert_eq!(payload.mime, "image/png");
    assert_eq!(&payload.bytes[..4], &[0x89, b'P', b'N', b'G']);
}

#[tokio::test]
async fn failed_analysis_keeps_asset_and_allows_retry() {
    let h = harness(
        MockRecognizer::default()
            .answer_analyze(Err(server_error()))
            .answer_analyze(Ok(vec![apple()])),
    );
    h.controller.select_upload(red_png()).unwrap();

    assert_eq!(h.controller.analyze().await.unwrap(), ScanPhase::Error);
    let view = h.controller.view();
    assert_eq!(view.error.as_deref(), Some(messages::ANALYSIS_FAILED));
    assert!(view.preview.is_some(), "Asset must survive a failed analysis");
    assert_eq!(h.controller.sources().previews().live_count(), 1);

    assert_eq!(h.controller.analyze().await.unwrap(), ScanPhase::HasResults);
    assert_eq!(h.recognizer.analyze_calls(), 2, "Retry must issue a new request");
    assert_eq!(h.controller.view().error, None);
}

#[tokio::test]
async fn empty_analysis_is_results_not_error() {
    let h = harness(MockRecognizer::default().answer_analyze(Ok(vec![])));
    h.controller.select_upload(red_png()).unwrap();

    assert_eq!(h.controller.analyze().await.unwrap(), ScanPhase::HasResults);
    assert_eq!(h.controller.view().total_calories, 0.0);
}

#[tokio::test]
async fn analyze_without_asset_is_rejected() {
    let h = harness(MockRecognizer::default());

    assert_eq!(
        h.controller.analyze().await,
        Err(Rejected::NotAllowed {
            action: "analyze",
            phase: ScanPhase::Idle
        })
    );
    assert_eq!(h.recognizer.analyze_calls(), 0);
}

#[tokio::test]
async fn non_image_upload_stays_awaiting_with_notice() {
    let h = harness(MockRecognizer::default());

    let phase = h
        .controller
        .select_upload(UploadFile::new("notes.txt", Some("text/plain"), b"hi".to_vec()))
        .unwrap();

    assert_eq!(phase, ScanPhase::AwaitingCapture);
    assert_eq!(
        h.controller.view().notice.as_deref(),
        Some(messages::NOT_AN_IMAGE)
    );

    assert_eq!(
        h.controller.provide_upload(red_png()).unwrap(),
        ScanPhase::HasCapture
    );
    assert_eq!(h.controller.view().notice, None);
}

#[tokio::test]
async fn new_upload_releases_previous_asset() {
    let h = harness(MockRecognizer::default());

    h.controller.select_upload(red_png()).unwrap();
    let first = h.controller.view().preview;
    h.controller.select_upload(red_png()).unwrap();

    assert_ne!(h.controller.view().preview, first);
    assert_eq!(h.controller.sources().previews().live_count(), 1);
}

// ==========================================================================
// In-flight gate and reset
// ==========================================================================

#[tokio::test]
async fn second_analyze_while_analyzing_is_rejected() {
    let gate = Arc::new(Notify::new());
    let h = harness(MockRecognizer::gated(gate.clone()).answer_analyze(Ok(vec![apple()])));
    h.controller.select_upload(red_png()).unwrap();

    let (first, second) = tokio::join!(h.controller.analyze(), async {
        tokio::task::yield_now().await;
        assert_eq!(h.controller.phase(), ScanPhase::Analyzing);
        let second = h.controller.analyze().await;
        let upload = h.controller.begin_upload();
        let search = h.controller.search("apple").await;
        gate.notify_one();
        (second, upload, search)
    });

    assert_eq!(first, Ok(ScanPhase::HasResults));
    assert_eq!(second.0, Err(Rejected::Busy));
    assert!(matches!(
        second.1,
        Err(Rejected::NotAllowed {
            phase: ScanPhase::Analyzing,
            ..
        })
    ));
    assert_eq!(second.2, Err(Rejected::Busy));
    assert_eq!(h.recognizer.analyze_calls(), 1, "Only one request may be in flight");
}

#[tokio::test]
async fn reset_while_analyzing_discards_response() {
    let gate = Arc::new(Notify::new());
    let h = harness(MockRecognizer::gated(gate.clone()).answer_analyze(Ok(vec![apple()])));
    h.controller.select_upload(red_png()).unwrap();

    let (analyzed, _) = tokio::join!(h.controller.analyze(), async {
        tokio::task::yield_now().await;
        assert_eq!(h.controller.reset(), ScanPhase::Idle);
        gate.notify_one();
    });

    assert_eq!(analyzed, Ok(ScanPhase::Idle));
    let view = h.controller.view();
    assert_eq!(view.phase, ScanPhase::Idle);
    assert!(view.records.is_empty(), "Late response must not land after reset");
    assert!(!h.controller.is_busy());
    assert_eq!(h.controller.sources().previews().live_count(), 0);
}

#[tokio::test]
async fn reset_while_searching_discards_response() {
    let gate = Arc::new(Notify::new());
    let h = harness(MockRecognizer::gated(gate.clone()).answer_search(Ok(vec![apple()])));

    let (searched, _) = tokio::join!(h.controller.search("apple"), async {
        tokio::task::yield_now().await;
        assert!(h.controller.is_busy());
        assert_eq!(
            h.controller.view().search,
            SearchState::Searching {
                query: "apple".into()
            }
        );
        assert_eq!(h.controller.reset(), ScanPhase::Idle);
        gate.notify_one();
    });

    assert_eq!(searched, Ok(ScanPhase::Idle));
    assert_eq!(
        h.controller.view().search,
        SearchState::Idle,
        "Late search results must not land after reset"
    );
    assert!(!h.controller.is_busy());
    assert_eq!(h.recognizer.search_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn reset_from_results_clears_everything() {
    let h = harness(
        MockRecognizer::default()
            .answer_analyze(Ok(vec![apple()]))
            .answer_search(Ok(vec![apple()])),
    );
    h.controller.select_upload(red_png()).unwrap();
    h.controller.analyze().await.unwrap();
    h.controller.search("apple").await.unwrap();

    assert_eq!(h.controller.reset(), ScanPhase::Idle);

    let view = h.controller.view();
    assert!(view.records.is_empty());
    assert_eq!(view.preview, None);
    assert_eq!(view.search, SearchState::Idle);
    assert_eq!(view.camera, None);
    assert_eq!(h.controller.sources().previews().live_count(), 0);
}

#[tokio::test]
async fn upload_then_reset_releases_preview() {
    let h = harness(MockRecognizer::default());
    h.controller.select_upload(red_png()).unwrap();
    assert_eq!(h.controller.sources().previews().live_count(), 1);

    h.controller.reset();
    assert_eq!(h.controller.sources().previews().live_count(), 0);
    assert_eq!(h.controller.view().preview, None);
}

// ==========================================================================
// Search
// ==========================================================================

#[tokio::test]
async fn empty_search_is_success_without_error() {
    let h = harness(MockRecognizer::default().answer_search(Ok(vec![])));

    assert_eq!(h.controller.search("banana").await, Ok(ScanPhase::Idle));

    let view = h.controller.view();
    assert_eq!(
        view.search,
        SearchState::Results {
            query: "banana".into(),
            records: vec![]
        }
    );
    assert_eq!(view.error, None);
    assert_eq!(view.phase, ScanPhase::Idle);
}

#[tokio::test]
async fn failed_search_does_not_touch_scan_state() {
    let failure =
        RecognitionError::new(Operation::Search, FailureCause::Transport("refused".into()));
    let h = harness(MockRecognizer::default().answer_search(Err(failure)));
    h.controller.select_upload(red_png()).unwrap();

    assert_eq!(h.controller.search("kale").await, Ok(ScanPhase::HasCapture));
    assert_eq!(
        h.controller.view().search,
        SearchState::Failed {
            query: "kale".into(),
            message: messages::SEARCH_FAILED.into()
        }
    );
    assert!(!h.controller.is_busy());
}

#[tokio::test]
async fn blank_query_is_rejected() {
    let h = harness(MockRecognizer::default());
    assert_eq!(h.controller.search("   ").await, Err(Rejected::EmptyQuery));
    assert_eq!(h.recognizer.search_calls.load(Ordering::SeqCst), 0);
}

// ==========================================================================
// Meal plan
// ==========================================================================

#[tokio::test]
async fn add_result_to_meal_plan() {
    let banana = FoodRecord::new("banana", 105.0, 1.3, 27.0, 0.4, 0.8);
    let h = harness(
        MockRecognizer::default()
            .answer_analyze(Ok(vec![apple()]))
            .answer_search(Ok(vec![banana.clone()])),
    );
    h.controller.select_upload(red_png()).unwrap();
    h.controller.analyze().await.unwrap();
    h.controller.search("banana").await.unwrap();

    h.controller.add_to_meal_plan(Pick::Analysis(0)).unwrap();
    assert_eq!(
        h.controller.view().notice.as_deref(),
        Some("Added apple to your meal plan!")
    );
    h.controller.add_to_meal_plan(Pick::Search(0)).unwrap();

    assert_eq!(h.meal_plan.entries(), vec![apple(), banana]);
    assert_eq!(
        h.controller.add_to_meal_plan(Pick::Analysis(3)),
        Err(Rejected::NoSuchItem(3))
    );
}

// ==========================================================================
// Camera
// ==========================================================================

#[tokio::test]
async fn camera_capture_waits_for_ready_then_closes() {
    let h = harness_with(
        MockRecognizer::default().answer_analyze(Ok(vec![apple()])),
        VirtualBackend::new().warmup(1),
    );

    assert_eq!(
        h.controller.open_camera(Facing::Environment).await,
        Ok(ScanPhase::AwaitingCapture)
    );
    assert_eq!(h.camera.live_streams(), 1);

    assert_eq!(h.controller.capture().await, Ok(ScanPhase::AwaitingCapture));
    assert_eq!(
        h.controller.view().notice.as_deref(),
        Some(messages::CAMERA_NOT_READY)
    );
    assert_eq!(h.camera.live_streams(), 1, "Not ready keeps the camera open");

    assert_eq!(h.controller.refresh_camera(), Some(Readiness::ActiveNotReady));
    assert_eq!(h.controller.refresh_camera(), Some(Readiness::ActiveReady));

    assert_eq!(h.controller.capture().await, Ok(ScanPhase::HasCapture));
    assert_eq!(h.camera.live_streams(), 0, "Camera closes after a successful capture");

    let view = h.controller.view();
    assert_eq!(view.source, Some(SourceKind::Camera));
    assert_eq!(view.camera, None);

    assert_eq!(h.controller.analyze().await, Ok(ScanPhase::HasResults));
    let payload = h.recognizer.last_payload.lock().unwrap().clone().unwrap();
    assert_eq!(payload.mime, "image/jpeg");
    assert_eq!(&payload.bytes[..2], &[0xFF, 0xD8]);
}

/// Ready 4x4 surface whose frames come back with too few pixels to encode.
struct TruncatedStream {
    stops: Arc<AtomicUsize>,
}

impl LiveStream for TruncatedStream {
    fn label(&self) -> &str {
        "truncated"
    }
    fn surface(&mut self) -> SurfaceStatus {
        SurfaceStatus {
            width: 4,
            height: 4,
            level: ReadyLevel::EnoughData,
        }
    }
    fn current_frame(&mut self) -> anyhow::Result<RgbFrame> {
        Ok(RgbFrame {
            width: 4,
            height: 4,
            pixels: vec![0; 5],
        })
    }
    fn stop_tracks(&mut self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct TruncatedBackend {
    stops: Arc<AtomicUsize>,
}

#[async_trait]
impl CameraBackend for TruncatedBackend {
    async fn acquire(&self, _request: StreamRequest) -> Result<Box<dyn LiveStream>, DeviceFault> {
        Ok(Box::new(TruncatedStream {
            stops: Arc::clone(&self.stops),
        }))
    }
}

#[tokio::test]
async fn failed_encode_closes_camera_and_enters_error() {
    let backend = Arc::new(TruncatedBackend::default());
    let stops = Arc::clone(&backend.stops);
    let controller = ScanController::new(
        Arc::new(MockRecognizer::default()),
        CameraSessionManager::new(backend),
        Arc::new(InMemoryMealPlan::default()),
    );

    controller.open_camera(Facing::Environment).await.unwrap();
    assert_eq!(controller.refresh_camera(), Some(Readiness::ActiveReady));

    assert_eq!(controller.capture().await, Ok(ScanPhase::Error));

    let view = controller.view();
    assert_eq!(view.error.as_deref(), Some(messages::CAPTURE_FAILED));
    assert_eq!(view.camera, None, "Camera is closed as part of the failure");
    assert_eq!(view.preview, None);
    assert_eq!(stops.load(Ordering::SeqCst), 1, "Tracks stop exactly once");
    assert_eq!(controller.sources().previews().live_count(), 0);

    controller.reset();
    controller.reset();
    assert_eq!(stops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn camera_falls_back_to_other_facing() {
    let h = harness_with(
        MockRecognizer::default(),
        VirtualBackend::new().with_facings(&[Facing::User]),
    );

    assert_eq!(
        h.controller.open_camera(Facing::Environment).await,
        Ok(ScanPhase::AwaitingCapture)
    );
    assert_eq!(h.controller.view().facing, Some(Facing::User));
}

#[tokio::test]
async fn denied_camera_enters_error_without_asset() {
    let h = harness_with(MockRecognizer::default(), VirtualBackend::new().deny_permission());

    assert_eq!(h.controller.open_camera(Facing::Environment).await, Ok(ScanPhase::Error));

    let view = h.controller.view();
    assert_eq!(view.error.as_deref(), Some(messages::CAMERA_PERMISSION));
    assert_eq!(view.preview, None);
    assert_eq!(view.camera, None, "Camera session is torn down on failure");
    assert_eq!(h.camera.live_streams(), 0);
}

#[tokio::test]
async fn missing_camera_reports_unavailable() {
    let h = harness_with(MockRecognizer::default(), VirtualBackend::new().with_facings(&[]));

    assert_eq!(h.controller.open_camera(Facing::User).await, Ok(ScanPhase::Error));
    assert_eq!(
        h.controller.view().error.as_deref(),
        Some(messages::CAMERA_UNAVAILABLE)
    );
}

#[tokio::test]
async fn opening_camera_releases_previous_upload() {
    let h = harness(MockRecognizer::default());
    h.controller.select_upload(red_png()).unwrap();

    h.controller.open_camera(Facing::Environment).await.unwrap();

    assert_eq!(h.controller.sources().previews().live_count(), 0);
    assert_eq!(
        h.controller.begin_upload(),
        Err(Rejected::NotAllowed {
            action: "choose an upload",
            phase: ScanPhase::AwaitingCapture
        })
    );
}

#[tokio::test]
async fn close_camera_returns_to_idle_and_is_idempotent() {
    let h = harness(MockRecognizer::default());
    h.controller.open_camera(Facing::Environment).await.unwrap();

    assert_eq!(h.controller.close_camera(), Ok(ScanPhase::Idle));
    assert_eq!(h.controller.close_camera(), Ok(ScanPhase::Idle));
    assert_eq!(h.camera.live_streams(), 0);
}

#[tokio::test]
async fn reset_closes_open_camera() {
    let h = harness(MockRecognizer::default());
    h.controller.open_camera(Facing::Environment).await.unwrap();
    assert_eq!(h.camera.live_streams(), 1);

    h.controller.reset();

    assert_eq!(h.camera.live_streams(), 0);
    assert_eq!(h.controller.view().camera, None);
}

#[tokio::test]
async fn capture_requires_open_camera() {
    let h = harness(MockRecognizer::default());
    assert!(matches!(
        h.controller.capture().await,
        Err(Rejected::NotAllowed { action: "capture", .. })
    ));
}
