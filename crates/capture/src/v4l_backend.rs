//! V4L2 camera backend. Each facing maps to a `/dev/videoN` index.
use crate::decoder::{FrameDecoder, PixelFormat};
use crate::device::{
    CameraBackend, Facing, LiveStream, ReadyLevel, RgbFrame, StreamRequest, SurfaceStatus,
};
use crate::error::DeviceFault;
use anyhow::{Context, anyhow};
use async_trait::async_trait;
use std::io;
use v4l::{
    FourCC,
    buffer::Type,
    io::{mmap::Stream, traits::CaptureStream},
    prelude::*,
    video::Capture,
};

const BUFFER_COUNT: u32 = 4;

const FOURCC_YUYV: FourCC = FourCC { repr: *b"YUYV" };
const FOURCC_MJPG: FourCC = FourCC { repr: *b"MJPG" };

#[derive(Debug, Clone, Copy)]
pub struct V4lBackend {
    environment_device: u32,
    user_device: u32,
}

impl V4lBackend {
    pub fn new(environment_device: u32, user_device: u32) -> Self {
        Self {
            environment_device,
            user_device,
        }
    }

    fn index_for(&self, facing: Facing) -> u32 {
        match facing {
            Facing::Environment => self.environment_device,
            Facing::User => self.user_device,
        }
    }
}

#[async_trait]
impl CameraBackend for V4lBackend {
    async fn acquire(&self, request: StreamRequest) -> Result<Box<dyn LiveStream>, DeviceFault> {
        let index = self.index_for(request.facing);
        let stream = tokio::task::spawn_blocking(move || V4lStream::open(index, request))
            .await
            .map_err(|e| DeviceFault::Other(format!("device open task failed: {e}")))??;
        Ok(Box::new(stream))
    }
}

fn fault(path: &str, err: io::Error) -> DeviceFault {
    let detail = format!("{path}: {err}");
    match err.raw_os_error() {
        Some(libc::EACCES) | Some(libc::EPERM) => DeviceFault::PermissionDenied(detail),
        Some(libc::ENOENT) | Some(libc::ENODEV) | Some(libc::ENXIO) => {
            DeviceFault::NotFound(detail)
        }
        Some(libc::EBUSY) => DeviceFault::InUse(detail),
        _ => match err.kind() {
            io::ErrorKind::PermissionDenied => DeviceFault::PermissionDenied(detail),
            io::ErrorKind::NotFound => DeviceFault::NotFound(detail),
            _ => DeviceFault::Other(detail),
        },
    }
}

/// Prefer YUYV (cheaper decode), fall back to MJPEG.
fn select_format(device: &Device) -> anyhow::Result<(FourCC, PixelFormat)> {
    let formats = device.enum_formats()?;

    if formats.iter().any(|f| f.fourcc == FOURCC_YUYV) {
        return Ok((FOURCC_YUYV, PixelFormat::Yuyv));
    }
    if formats.iter().any(|f| f.fourcc == FOURCC_MJPG) {
        return Ok((FOURCC_MJPG, PixelFormat::Mjpeg));
    }

    Err(anyhow!(
        "device supports neither YUYV nor MJPEG - available: {:?}",
        formats.iter().map(|f| f.fourcc).collect::<Vec<_>>()
    ))
}

struct V4lStream {
    label: String,
    width: u32,
    height: u32,
    decoder: Box<dyn FrameDecoder>,
    /// Declared before `device` so the mmap buffers go first.
    stream: Option<Stream<'static>>,
    device: Option<Device>,
    level: ReadyLevel,
}

impl V4lStream {
    fn open(index: u32, request: StreamRequest) -> Result<Self, DeviceFault> {
        let path = format!("/dev/video{index}");
        let device = Device::new(index as usize).map_err(|e| fault(&path, e))?;
        let caps = device.query_caps().map_err(|e| fault(&path, e))?;

        let (fourcc, pixel_format) = select_format(&device)
            .map_err(|e| DeviceFault::Other(format!("{path}: {e:#}")))?;

        let mut format = device.format().map_err(|e| fault(&path, e))?;
        format.fourcc = fourcc;
        format.width = request.ideal_width;
        format.height = request.ideal_height;
        let format = device.set_format(&format).map_err(|e| fault(&path, e))?;

        let stream = Stream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT)
            .map_err(|e| fault(&path, e))?;

        tracing::info!(
            device = %path,
            card = %caps.card,
            width = format.width,
            height = format.height,
            format = ?pixel_format,
            "V4L2 stream started"
        );

        Ok(Self {
            label: format!("{} ({})", caps.card, path),
            width: format.width,
            height: format.height,
            decoder: pixel_format.decoder(),
            stream: Some(stream),
            device: Some(device),
            level: ReadyLevel::Metadata,
        })
    }

    fn next_frame(&mut self) -> anyhow::Result<RgbFrame> {
        let stream = self.stream.as_mut().context("stream is stopped")?;
        let (buf, _meta) = stream.next().context("failed to dequeue frame")?;
        self.decoder.decode(buf, self.width, self.height)
    }
}

impl LiveStream for V4lStream {
    fn label(&self) -> &str {
        &self.label
    }

    fn surface(&mut self) -> SurfaceStatus {
        if self.stream.is_none() {
            return SurfaceStatus::EMPTY;
        }
        // The first dequeued buffer proves a frame is presentable.
        if self.level < ReadyLevel::CurrentData {
            match self.stream.as_mut().map(|s| s.next().map(|_| ())) {
                Some(Ok(())) => self.level = ReadyLevel::CurrentData,
                Some(Err(e)) => tracing::debug!(device = %self.label, error = %e, "No frame yet"),
                None => {}
            }
        }
        SurfaceStatus {
            width: self.width,
            height: self.height,
            level: self.level,
        }
    }

    fn current_frame(&mut self) -> anyhow::Result<RgbFrame> {
        self.next_frame()
    }

    fn stop_tracks(&mut self) {
        if self.stream.take().is_some() {
            self.device = None;
            self.level = ReadyLevel::Nothing;
            tracing::debug!(device = %self.label, "V4L2 stream stopped");
        }
    }
}

impl Drop for V4lStream {
    fn drop(&mut self) {
        self.stop_tracks();
    }
}
