//! Scan session orchestration.
//!
//! [`ScanController`] is the single owner of the scan state, the capture asset
//! and the in-flight request gate. Every command runs on the caller's task;
//! the only suspension points are camera acquisition, still encoding and the
//! recognition request. No lock is held across any of them.
//!
//! Failures of the collaborators never escape as errors: they become an
//! [`ScanState::Error`] (or a notice) carrying the text shown to the user.
//! [`Rejected`] is reserved for commands that are invalid in the current state.

use crate::error::Rejected;
use crate::meal_plan::MealPlanSink;
use crate::metrics::{FailureKind, ScanMetrics};
use crate::source::{ImageSourceResolver, SourceKind, UploadFile};
use crate::state::{CaptureMode, ScanPhase, ScanState, SearchState};
use capture::{
    CameraError, CameraSessionManager, CaptureEncoder, CaptureError, Facing, Readiness,
};
use recognition::{FoodRecognizer, FoodRecord, total_calories};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::broadcast;

/// Outcome of a controller command: the phase after it ran, or why it was refused.
pub type Dispatch = Result<ScanPhase, Rejected>;

const EVENT_CAPACITY: usize = 32;

/// User-facing text. Only the controller produces these.
pub mod messages {
    pub const CAMERA_PERMISSION: &str =
        "Both back and front cameras failed. Please check permissions.";
    pub const CAMERA_UNAVAILABLE: &str =
        "No camera available. Please check that a camera is connected and not in use.";
    pub const CAMERA_NOT_READY: &str = "Camera not ready. Please wait a moment and try again.";
    pub const CAPTURE_FAILED: &str = "Failed to capture photo. Please try again.";
    pub const ANALYSIS_FAILED: &str = "Failed to analyze food image. Please try again.";
    pub const SEARCH_FAILED: &str = "Failed to search for food. Please try again.";
    pub const NOT_AN_IMAGE: &str = "Please choose an image file.";
    pub const MEAL_PLAN_FAILED: &str =
        "Could not add this item to your meal plan. Please try again.";
}

/// Which result list a meal-plan pick refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pick {
    Analysis(usize),
    Search(usize),
}

/// Read-only snapshot for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanView {
    pub phase: ScanPhase,
    pub source: Option<SourceKind>,
    pub preview: Option<String>,
    pub records: Vec<FoodRecord>,
    pub total_calories: f64,
    pub error: Option<String>,
    pub notice: Option<String>,
    pub search: SearchState,
    pub camera: Option<Readiness>,
    pub facing: Option<Facing>,
}

struct Inner {
    state: ScanState,
    search: SearchState,
    /// One analyze or search at a time.
    in_flight: bool,
    /// Bumped by reset; responses from an older epoch are dropped on arrival.
    epoch: u64,
    /// Bumped whenever the camera surface opens or closes.
    camera_epoch: u64,
    notice: Option<String>,
}

pub struct ScanController {
    recognizer: Arc<dyn FoodRecognizer>,
    camera: CameraSessionManager,
    encoder: CaptureEncoder,
    sources: ImageSourceResolver,
    meal_plan: Arc<dyn MealPlanSink>,
    metrics: ScanMetrics,
    inner: Mutex<Inner>,
    events: broadcast::Sender<ScanPhase>,
}

impl ScanController {
    pub fn new(
        recognizer: Arc<dyn FoodRecognizer>,
        camera: CameraSessionManager,
        meal_plan: Arc<dyn MealPlanSink>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            recognizer,
            camera,
            encoder: CaptureEncoder::default(),
            sources: ImageSourceResolver::default(),
            meal_plan,
            metrics: ScanMetrics::new("scanner"),
            inner: Mutex::new(Inner {
                state: ScanState::Idle,
                search: SearchState::Idle,
                in_flight: false,
                epoch: 0,
                camera_epoch: 0,
                notice: None,
            }),
            events,
        }
    }

    pub fn with_encoder(mut self, encoder: CaptureEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, inner: &mut Inner, next: ScanState) -> ScanPhase {
        let phase = next.phase();
        inner.state = next;
        tracing::info!(phase = %phase, "Scan state changed");
        // No receiver is fine.
        let _ = self.events.send(phase);
        phase
    }

    fn check_new_capture(inner: &Inner, action: &'static str) -> Result<(), Rejected> {
        if inner.state.accepts_new_capture() {
            Ok(())
        } else {
            Err(Rejected::NotAllowed {
                action,
                phase: inner.state.phase(),
            })
        }
    }

    /// Observe phase changes from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanPhase> {
        self.events.subscribe()
    }

    pub fn phase(&self) -> ScanPhase {
        self.inner().state.phase()
    }

    pub fn is_busy(&self) -> bool {
        self.inner().in_flight
    }

    pub fn sources(&self) -> &ImageSourceResolver {
        &self.sources
    }

    pub fn camera(&self) -> &CameraSessionManager {
        &self.camera
    }

    // ==========================================================================
    // Upload
    // ==========================================================================

    /// Open the file picker. Any previous asset is released.
    pub fn begin_upload(&self) -> Dispatch {
        let mut inner = self.inner();
        Self::check_new_capture(&inner, "choose an upload")?;
        inner.notice = None;
        Ok(self.transition(
            &mut inner,
            ScanState::AwaitingCapture {
                mode: CaptureMode::Upload,
            },
        ))
    }

    /// Hand the picked file over. A non-image keeps the picker open with a notice.
    pub fn provide_upload(&self, file: UploadFile) -> Dispatch {
        let mut inner = self.inner();
        if !matches!(
            inner.state,
            ScanState::AwaitingCapture {
                mode: CaptureMode::Upload
            }
        ) {
            return Err(Rejected::NotAllowed {
                action: "provide an upload",
                phase: inner.state.phase(),
            });
        }

        match self.sources.from_upload(file) {
            Ok(asset) => {
                inner.notice = None;
                self.metrics.record_capture(asset.source());
                Ok(self.transition(&mut inner, ScanState::HasCapture { asset }))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Upload refused");
                inner.notice = Some(messages::NOT_AN_IMAGE.to_string());
                Ok(inner.state.phase())
            }
        }
    }

    /// `begin_upload` followed by `provide_upload`.
    pub fn select_upload(&self, file: UploadFile) -> Dispatch {
        self.begin_upload()?;
        self.provide_upload(file)
    }

    // ==========================================================================
    // Camera
    // ==========================================================================

    /// Open the camera surface and request a stream. Resolves once the device
    /// answered; readiness is then tracked through [`Self::refresh_camera`].
    pub async fn open_camera(&self, facing: Facing) -> Dispatch {
        let camera_epoch = {
            let mut inner = self.inner();
            Self::check_new_capture(&inner, "open the camera")?;
            inner.notice = None;
            inner.camera_epoch += 1;
            self.transition(
                &mut inner,
                ScanState::AwaitingCapture {
                    mode: CaptureMode::Camera,
                },
            );
            inner.camera_epoch
        };

        let outcome = self.camera.open(facing).await;

        let mut inner = self.inner();
        match outcome {
            Ok(active) => {
                tracing::info!(facing = %active, "Camera surface open");
                Ok(inner.state.phase())
            }
            Err(CameraError::Cancelled) => Ok(inner.state.phase()),
            Err(err) => {
                if inner.camera_epoch != camera_epoch || !inner.state.is_camera_open() {
                    return Ok(inner.state.phase());
                }
                tracing::warn!(error = %err, "Camera could not be opened");
                self.camera.close();
                self.metrics.record_failure(FailureKind::Camera);
                let message = match err {
                    CameraError::PermissionDenied(_) => messages::CAMERA_PERMISSION,
                    _ => messages::CAMERA_UNAVAILABLE,
                };
                Ok(self.transition(
                    &mut inner,
                    ScanState::Error {
                        asset: None,
                        message: message.to_string(),
                    },
                ))
            }
        }
    }

    /// Poll the live surface and mark the session ready once it shows a frame.
    pub fn refresh_camera(&self) -> Option<Readiness> {
        self.camera.observe_surface()
    }

    /// Take a still from the open camera. The camera is closed on success and on
    /// encode failure; `NotReady` leaves it open with a notice.
    pub async fn capture(&self) -> Dispatch {
        let camera_epoch = {
            let inner = self.inner();
            if !inner.state.is_camera_open() {
                return Err(Rejected::NotAllowed {
                    action: "capture",
                    phase: inner.state.phase(),
                });
            }
            inner.camera_epoch
        };

        let outcome = self.encoder.capture_frame(&self.camera).await;

        let mut inner = self.inner();
        if inner.camera_epoch != camera_epoch || !inner.state.is_camera_open() {
            tracing::debug!("Discarding still from a closed camera");
            return Ok(inner.state.phase());
        }

        match outcome {
            Ok(still) => {
                inner.camera_epoch += 1;
                self.camera.close();
                inner.notice = None;
                let asset = self.sources.from_capture(still);
                self.metrics.record_capture(asset.source());
                Ok(self.transition(&mut inner, ScanState::HasCapture { asset }))
            }
            Err(CaptureError::NotReady) => {
                inner.notice = Some(messages::CAMERA_NOT_READY.to_string());
                Ok(inner.state.phase())
            }
            Err(err @ CaptureError::EncodeFailed(_)) => {
                tracing::warn!(error = %err, "Still capture failed");
                inner.camera_epoch += 1;
                self.camera.close();
                self.metrics.record_failure(FailureKind::Capture);
                Ok(self.transition(
                    &mut inner,
                    ScanState::Error {
                        asset: None,
                        message: messages::CAPTURE_FAILED.to_string(),
                    },
                ))
            }
        }
    }

    /// Leave the camera surface. Safe in any state.
    pub fn close_camera(&self) -> Dispatch {
        let mut inner = self.inner();
        inner.camera_epoch += 1;
        self.camera.close();
        if inner.state.is_camera_open() {
            inner.notice = None;
            return Ok(self.transition(&mut inner, ScanState::Idle));
        }
        Ok(inner.state.phase())
    }

    // ==========================================================================
    // Recognition
    // ==========================================================================

    /// Send the current asset for analysis. Allowed from `HasCapture`, and from
    /// `Error` when the asset was kept, which is the explicit retry.
    pub async fn analyze(&self) -> Dispatch {
        let (epoch, payload) = {
            let mut inner = self.inner();
            if inner.in_flight {
                return Err(Rejected::Busy);
            }

            let asset = match std::mem::replace(&mut inner.state, ScanState::Idle) {
                ScanState::HasCapture { asset }
                | ScanState::Error {
                    asset: Some(asset), ..
                } => asset,
                other => {
                    let phase = other.phase();
                    inner.state = other;
                    return Err(Rejected::NotAllowed {
                        action: "analyze",
                        phase,
                    });
                }
            };

            let payload = asset.payload();
            inner.in_flight = true;
            inner.notice = None;
            self.transition(&mut inner, ScanState::Analyzing { asset });
            (inner.epoch, payload)
        };

        let started = Instant::now();
        let outcome = self.recognizer.analyze(&payload).await;
        self.metrics.record_request("analyze", started.elapsed(), outcome.is_ok());

        let mut inner = self.inner();
        if inner.epoch != epoch {
            tracing::debug!("Discarding analysis result after reset");
            return Ok(inner.state.phase());
        }
        inner.in_flight = false;

        let asset = match std::mem::replace(&mut inner.state, ScanState::Idle) {
            ScanState::Analyzing { asset } => asset,
            other => {
                inner.state = other;
                return Ok(inner.state.phase());
            }
        };

        match outcome {
            Ok(records) => {
                tracing::info!(
                    count = records.len(),
                    calories = total_calories(&records),
                    "Food recognised"
                );
                Ok(self.transition(&mut inner, ScanState::HasResults { asset, records }))
            }
            Err(err) => {
                tracing::warn!(error = %err, "Analysis failed");
                self.metrics.record_failure(FailureKind::Analysis);
                Ok(self.transition(
                    &mut inner,
                    ScanState::Error {
                        asset: Some(asset),
                        message: messages::ANALYSIS_FAILED.to_string(),
                    },
                ))
            }
        }
    }

    /// Text search. Shares the in-flight gate with `analyze`; never moves the scan state.
    pub async fn search(&self, query: &str) -> Dispatch {
        let query = query.trim();
        if query.is_empty() {
            return Err(Rejected::EmptyQuery);
        }

        let epoch = {
            let mut inner = self.inner();
            if inner.in_flight {
                return Err(Rejected::Busy);
            }
            inner.in_flight = true;
            inner.search = SearchState::Searching {
                query: query.to_string(),
            };
            inner.epoch
        };

        let started = Instant::now();
        let outcome = self.recognizer.search(query).await;
        self.metrics.record_request("search", started.elapsed(), outcome.is_ok());

        let mut inner = self.inner();
        if inner.epoch != epoch {
            tracing::debug!("Discarding search result after reset");
            return Ok(inner.state.phase());
        }
        inner.in_flight = false;

        inner.search = match outcome {
            Ok(records) => {
                tracing::info!(query, count = records.len(), "Search finished");
                SearchState::Results {
                    query: query.to_string(),
                    records,
                }
            }
            Err(err) => {
                tracing::warn!(query, error = %err, "Search failed");
                self.metrics.record_failure(FailureKind::Search);
                SearchState::Failed {
                    query: query.to_string(),
                    message: messages::SEARCH_FAILED.to_string(),
                }
            }
        };
        Ok(inner.state.phase())
    }

    // ==========================================================================
    // Reset and meal plan
    // ==========================================================================

    /// Back to `Idle` from anywhere: drops the asset, the results and the search,
    /// closes the camera and stops listening for any pending response.
    pub fn reset(&self) -> ScanPhase {
        let mut inner = self.inner();
        inner.epoch += 1;
        inner.camera_epoch += 1;
        inner.in_flight = false;
        inner.search = SearchState::Idle;
        inner.notice = None;
        self.camera.close();
        self.transition(&mut inner, ScanState::Idle)
    }

    pub fn add_to_meal_plan(&self, pick: Pick) -> Dispatch {
        let mut inner = self.inner();
        let (list, index) = match pick {
            Pick::Analysis(index) => (inner.state.records(), index),
            Pick::Search(index) => (inner.search.records(), index),
        };
        let record = list.get(index).cloned().ok_or(Rejected::NoSuchItem(index))?;

        inner.notice = Some(match self.meal_plan.append(&record) {
            Ok(()) => format!("Added {} to your meal plan!", record.name()),
            Err(e) => {
                tracing::warn!(error = %e, food = record.name(), "Meal plan append failed");
                messages::MEAL_PLAN_FAILED.to_string()
            }
        });
        Ok(inner.state.phase())
    }

    pub fn view(&self) -> ScanView {
        let inner = self.inner();
        let asset = inner.state.asset();
        let records = inner.state.records().to_vec();

        ScanView {
            phase: inner.state.phase(),
            source: asset.map(|a| a.source()),
            preview: asset.map(|a| a.preview().uri()),
            total_calories: total_calories(&records),
            records,
            error: inner.state.error_message().map(str::to_string),
            notice: inner.notice.clone(),
            search: inner.search.clone(),
            camera: self.camera.readiness(),
            facing: self.camera.facing(),
        }
    }
}
