pub mod config;
pub mod decoder;
pub mod device;
pub mod encoder;
pub mod error;
pub mod session;
#[cfg(feature = "v4l")]
pub mod v4l_backend;
pub mod virtual_backend;

pub use config::{BackendKind, CameraConfig};
pub use decoder::{FrameDecoder, MjpegDecoder, PixelFormat, YuyvDecoder};
pub use device::{
    CameraBackend, Facing, LiveStream, ReadyLevel, RgbFrame, StreamRequest, SurfaceStatus,
};
pub use encoder::{CaptureEncoder, EncodedStill, STILL_QUALITY, encode_jpeg};
pub use error::{CameraError, CaptureError, DeviceFault};
pub use session::{CameraSessionManager, Readiness};
#[cfg(feature = "v4l")]
pub use v4l_backend::V4lBackend;
pub use virtual_backend::VirtualBackend;
