use crate::device::RgbFrame;
use crate::error::CaptureError;
use crate::session::CameraSessionManager;
use common::span;
use image::{ExtendedColorType, ImageEncoder, codecs::jpeg::JpegEncoder};

/// JPEG quality used for camera stills.
pub const STILL_QUALITY: u8 = 80;

/// A camera still, JPEG-encoded at the live surface's natural size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedStill {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl EncodedStill {
    pub const MIME: &'static str = "image/jpeg";
    pub const FILE_NAME: &'static str = "capture.jpg";
}

#[derive(Debug, Clone, Copy)]
pub struct CaptureEncoder {
    quality: u8,
}

impl Default for CaptureEncoder {
    fn default() -> Self {
        Self::new(STILL_QUALITY)
    }
}

impl CaptureEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Grab the frame currently on the camera surface and encode it.
    ///
    /// `NotReady` when the session is not `ActiveReady`. Encoding runs on the
    /// blocking pool so a large frame does not stall the runtime.
    #[tracing::instrument(skip_all, fields(quality = self.quality))]
    pub async fn capture_frame(
        &self,
        camera: &CameraSessionManager,
    ) -> Result<EncodedStill, CaptureError> {
        let frame = camera.grab_frame()?;
        let (width, height) = (frame.width, frame.height);
        let quality = self.quality;

        let bytes = tokio::task::spawn_blocking(move || encode_jpeg(&frame, quality))
            .await
            .map_err(|e| CaptureError::EncodeFailed(format!("encoder task failed: {e}")))??;

        if bytes.is_empty() {
            return Err(CaptureError::EncodeFailed("encoder produced no data".into()));
        }

        tracing::debug!(width, height, size = bytes.len(), "Still encoded");
        Ok(EncodedStill { bytes, width, height })
    }
}

pub fn encode_jpeg(frame: &RgbFrame, quality: u8) -> Result<Vec<u8>, CaptureError> {
    let _s = span!("encode_jpeg");

    if !frame.is_complete() {
        return Err(CaptureError::EncodeFailed(format!(
            "pixel buffer size mismatch: {} bytes for {}x{}",
            frame.pixels.len(),
            frame.width,
            frame.height
        )));
    }

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality)
        .write_image(&frame.pixels, frame.width, frame.height, ExtendedColorType::Rgb8)
        .map_err(|e| CaptureError::EncodeFailed(e.to_string()))?;

    Ok(jpeg)
}
