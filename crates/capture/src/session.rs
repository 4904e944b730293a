//! Camera session lifecycle.
//!
//! [`CameraSessionManager`] owns at most one live stream. Every exit path
//! (explicit close, replacement by a new `open`, cancellation while the
//! device request is pending, drop of the manager) goes through
//! [`CameraSession`]'s release, which stops the tracks exactly once.

use crate::device::{CameraBackend, Facing, LiveStream, RgbFrame, StreamRequest, SurfaceStatus};
use crate::error::{CameraError, CaptureError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Requesting,
    ActiveNotReady,
    ActiveReady,
    Failed,
}

/// An open device stream. Released on drop if nobody released it earlier.
pub struct CameraSession {
    stream: Box<dyn LiveStream>,
    facing: Facing,
    readiness: Readiness,
    released: bool,
}

impl CameraSession {
    fn new(stream: Box<dyn LiveStream>, facing: Facing) -> Self {
        Self {
            stream,
            facing,
            readiness: Readiness::ActiveNotReady,
            released: false,
        }
    }

    fn release(&mut self) {
        if !self.released {
            self.stream.stop_tracks();
            self.released = true;
            tracing::info!(
                device = self.stream.label(),
                facing = %self.facing,
                "Camera tracks stopped"
            );
        }
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.release();
    }
}

enum Slot {
    Closed,
    Requesting { ticket: u64 },
    Open(CameraSession),
    Failed,
}

pub struct CameraSessionManager {
    backend: Arc<dyn CameraBackend>,
    ideal_width: u32,
    ideal_height: u32,
    slot: Mutex<Slot>,
    tickets: AtomicU64,
}

impl CameraSessionManager {
    pub fn new(backend: Arc<dyn CameraBackend>) -> Self {
        Self::with_resolution(backend, StreamRequest::IDEAL_WIDTH, StreamRequest::IDEAL_HEIGHT)
    }

    pub fn with_resolution(
        backend: Arc<dyn CameraBackend>,
        ideal_width: u32,
        ideal_height: u32,
    ) -> Self {
        Self {
            backend,
            ideal_width,
            ideal_height,
            slot: Mutex::new(Slot::Closed),
            tickets: AtomicU64::new(0),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn request(&self, facing: Facing) -> StreamRequest {
        StreamRequest {
            facing,
            ideal_width: self.ideal_width,
            ideal_height: self.ideal_height,
        }
    }

    /// Request a live stream, preferring `preferred` and falling back once to the
    /// opposite facing. Any session already open is torn down first.
    ///
    /// Returns the facing actually obtained.
    #[tracing::instrument(skip(self))]
    pub async fn open(&self, preferred: Facing) -> Result<Facing, CameraError> {
        let ticket = self.tickets.fetch_add(1, Ordering::AcqRel) + 1;
        let previous = std::mem::replace(&mut *self.slot(), Slot::Requesting { ticket });
        drop(previous);

        tracing::info!(facing = %preferred, "Requesting camera access");
        let first = match self.backend.acquire(self.request(preferred)).await {
            Ok(stream) => return self.install(ticket, preferred, stream),
            Err(fault) => fault,
        };

        if !self.is_pending(ticket) {
            return Err(CameraError::Cancelled);
        }

        let fallback = preferred.opposite();
        tracing::warn!(
            error = %first,
            facing = %preferred,
            fallback = %fallback,
            "Camera access failed, trying opposite facing"
        );

        let second = match self.backend.acquire(self.request(fallback)).await {
            Ok(stream) => return self.install(ticket, fallback, stream),
            Err(fault) => fault,
        };

        let error = CameraError::from_attempts(
            (preferred.as_str(), &first),
            (fallback.as_str(), &second),
        );
        if !self.fail(ticket, &error) {
            return Err(CameraError::Cancelled);
        }
        Err(error)
    }

    fn is_pending(&self, ticket: u64) -> bool {
        matches!(*self.slot(), Slot::Requesting { ticket: t } if t == ticket)
    }

    fn install(
        &self,
        ticket: u64,
        facing: Facing,
        stream: Box<dyn LiveStream>,
    ) -> Result<Facing, CameraError> {
        let mut session = CameraSession::new(stream, facing);
        let mut slot = self.slot();

        if !matches!(*slot, Slot::Requesting { ticket: t } if t == ticket) {
            drop(slot);
            tracing::info!(facing = %facing, "Camera granted after close, releasing it");
            session.release();
            return Err(CameraError::Cancelled);
        }

        tracing::info!(device = session.stream.label(), facing = %facing, "Camera stream active");
        *slot = Slot::Open(session);
        Ok(facing)
    }

    /// Record the failure unless the request was superseded. Returns whether it was recorded.
    fn fail(&self, ticket: u64, error: &CameraError) -> bool {
        let mut slot = self.slot();
        if !matches!(*slot, Slot::Requesting { ticket: t } if t == ticket) {
            return false;
        }
        tracing::error!(error = %error, "Camera unavailable on both facings");
        *slot = Slot::Failed;
        true
    }

    /// The consumer saw non-zero natural dimensions and a current frame. Idempotent.
    pub fn mark_ready(&self) {
        if let Slot::Open(session) = &mut *self.slot() {
            if session.readiness == Readiness::ActiveNotReady {
                session.readiness = Readiness::ActiveReady;
                tracing::info!(device = session.stream.label(), "Camera ready");
            }
        }
    }

    /// Inspect the live surface and mark the session ready once it qualifies.
    pub fn observe_surface(&self) -> Option<Readiness> {
        let status = match &mut *self.slot() {
            Slot::Open(session) => Some(session.stream.surface()),
            _ => None,
        };
        if status.is_some_and(|s| s.is_ready()) {
            self.mark_ready();
        }
        self.readiness()
    }

    /// Stop every track and forget the session. Safe in any state, any number of times.
    pub fn close(&self) {
        let previous = std::mem::replace(&mut *self.slot(), Slot::Closed);
        match previous {
            Slot::Open(mut session) => session.release(),
            Slot::Requesting { .. } => tracing::debug!("Camera closed while request pending"),
            Slot::Failed | Slot::Closed => {}
        }
    }

    /// `None` once closed (or never opened).
    pub fn readiness(&self) -> Option<Readiness> {
        match &*self.slot() {
            Slot::Closed => None,
            Slot::Requesting { .. } => Some(Readiness::Requesting),
            Slot::Open(session) => Some(session.readiness),
            Slot::Failed => Some(Readiness::Failed),
        }
    }

    pub fn facing(&self) -> Option<Facing> {
        match &*self.slot() {
            Slot::Open(session) => Some(session.facing),
            _ => None,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(*self.slot(), Slot::Open(_))
    }

    /// Rasterize the current frame. Fails with `NotReady` unless the session is
    /// `ActiveReady` and the surface reports a non-zero size; the device is not
    /// touched in that case.
    pub fn grab_frame(&self) -> Result<RgbFrame, CaptureError> {
        let mut slot = self.slot();
        let session = match &mut *slot {
            Slot::Open(session) if session.readiness == Readiness::ActiveReady => session,
            _ => return Err(CaptureError::NotReady),
        };

        let surface: SurfaceStatus = session.stream.surface();
        if !surface.has_dimensions() {
            return Err(CaptureError::NotReady);
        }

        session
            .stream
            .current_frame()
            .map_err(|e| CaptureError::EncodeFailed(format!("frame grab failed: {e:#}")))
    }
}

impl Drop for CameraSessionManager {
    fn drop(&mut self) {
        self.close();
    }
}
