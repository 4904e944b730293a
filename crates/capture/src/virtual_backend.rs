//! Hardware-free camera that emits a moving YUYV test pattern.
use crate::decoder::{FrameDecoder, YuyvDecoder};
use crate::device::{
    CameraBackend, Facing, LiveStream, ReadyLevel, RgbFrame, StreamRequest, SurfaceStatus,
};
use crate::error::DeviceFault;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Virtual camera backend.
///
/// Frames are produced at the requested ideal size (rounded down to an even
/// width). The surface reports `Metadata` for the first `warmup` observations,
/// then `CurrentData`.
#[derive(Debug, Clone)]
pub struct VirtualBackend {
    facings: Vec<Facing>,
    deny_permission: bool,
    warmup: u32,
    live: Arc<AtomicUsize>,
    acquired: Arc<AtomicUsize>,
}

impl Default for VirtualBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualBackend {
    /// Both facings present, permission granted, one warm-up observation.
    pub fn new() -> Self {
        Self {
            facings: vec![Facing::Environment, Facing::User],
            deny_permission: false,
            warmup: 1,
            live: Arc::new(AtomicUsize::new(0)),
            acquired: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_facings(mut self, facings: &[Facing]) -> Self {
        self.facings = facings.to_vec();
        self
    }

    pub fn deny_permission(mut self) -> Self {
        self.deny_permission = true;
        self
    }

    pub fn warmup(mut self, observations: u32) -> Self {
        self.warmup = observations;
        self
    }

    /// Streams handed out and not yet stopped.
    pub fn live_streams(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Streams handed out over the backend's lifetime.
    pub fn acquired_streams(&self) -> usize {
        self.acquired.load(Ordering::Acquire)
    }
}

#[async_trait]
impl CameraBackend for VirtualBackend {
    async fn acquire(&self, request: StreamRequest) -> Result<Box<dyn LiveStream>, DeviceFault> {
        if self.deny_permission {
            return Err(DeviceFault::PermissionDenied(format!(
                "virtual {} camera: access refused",
                request.facing
            )));
        }
        if !self.facings.contains(&request.facing) {
            return Err(DeviceFault::NotFound(format!("no virtual {} camera", request.facing)));
        }

        self.live.fetch_add(1, Ordering::AcqRel);
        self.acquired.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(facing = %request.facing, "Virtual camera stream started");

        Ok(Box::new(VirtualStream {
            label: format!("virtual-{}", request.facing),
            width: request.ideal_width & !1,
            height: request.ideal_height,
            warmup: self.warmup,
            tick: 0,
            live: Some(Arc::clone(&self.live)),
        }))
    }
}

struct VirtualStream {
    label: String,
    width: u32,
    height: u32,
    warmup: u32,
    tick: u32,
    /// `None` once stopped.
    live: Option<Arc<AtomicUsize>>,
}

impl VirtualStream {
    /// Horizontal luma ramp scrolling one column per tick, reddish chroma.
    fn yuyv_pattern(&self) -> Vec<u8> {
        let width = self.width.max(1);
        let luma = |col: u32| ((((col + self.tick) % width) * 219 / width) + 16) as u8;

        let mut row = Vec::with_capacity(self.width as usize * 2);
        for x in (0..self.width).step_by(2) {
            row.extend_from_slice(&[luma(x), 110, luma(x + 1), 170]);
        }
        row.repeat(self.height as usize)
    }
}

impl LiveStream for VirtualStream {
    fn label(&self) -> &str {
        &self.label
    }

    fn surface(&mut self) -> SurfaceStatus {
        if self.live.is_none() {
            return SurfaceStatus::EMPTY;
        }
        let level = if self.warmup > 0 {
            self.warmup -= 1;
            ReadyLevel::Metadata
        } else {
            ReadyLevel::CurrentData
        };
        SurfaceStatus {
            width: self.width,
            height: self.height,
            level,
        }
    }

    fn current_frame(&mut self) -> anyhow::Result<RgbFrame> {
        if self.live.is_none() {
            anyhow::bail!("{} is stopped", self.label);
        }
        self.tick = self.tick.wrapping_add(1);
        YuyvDecoder.decode(&self.yuyv_pattern(), self.width, self.height)
    }

    fn stop_tracks(&mut self) {
        if let Some(live) = self.live.take() {
            live.fetch_sub(1, Ordering::AcqRel);
            tracing::debug!(label = %self.label, "Virtual camera stream stopped");
        }
    }
}

impl Drop for VirtualStream {
    fn drop(&mut self) {
        self.stop_tracks();
    }
}
