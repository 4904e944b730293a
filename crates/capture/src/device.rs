//! Capability surface a camera platform has to provide.
//!
//! A [`CameraBackend`] hands out [`LiveStream`]s; the session manager owns the
//! stream for its whole life and is the only caller of [`LiveStream::stop_tracks`].

use crate::error::DeviceFault;
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;

/// Which way the requested camera points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Facing {
    /// Rear camera, pointing at the scene.
    Environment,
    /// Front camera, pointing at the user.
    User,
}

impl Facing {
    pub fn opposite(self) -> Self {
        match self {
            Facing::Environment => Facing::User,
            Facing::User => Facing::Environment,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Facing::Environment => "environment",
            Facing::User => "user",
        }
    }
}

impl fmt::Display for Facing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Facing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "environment" | "back" | "rear" => Ok(Facing::Environment),
            "user" | "front" => Ok(Facing::User),
            other => Err(format!(
                "{} is not a camera facing. Use either `environment` or `user`.",
                other
            )),
        }
    }
}

/// Constraints sent with a stream request. Width and height are preferences,
/// the device may settle on something else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamRequest {
    pub facing: Facing,
    pub ideal_width: u32,
    pub ideal_height: u32,
}

impl StreamRequest {
    pub const IDEAL_WIDTH: u32 = 1280;
    pub const IDEAL_HEIGHT: u32 = 720;

    pub fn new(facing: Facing) -> Self {
        Self {
            facing,
            ideal_width: Self::IDEAL_WIDTH,
            ideal_height: Self::IDEAL_HEIGHT,
        }
    }
}

/// How much media the live surface has buffered, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyLevel {
    Nothing,
    Metadata,
    CurrentData,
    FutureData,
    EnoughData,
}

/// Snapshot of the live surface as a consumer would observe it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceStatus {
    pub width: u32,
    pub height: u32,
    pub level: ReadyLevel,
}

impl SurfaceStatus {
    pub const EMPTY: SurfaceStatus = SurfaceStatus {
        width: 0,
        height: 0,
        level: ReadyLevel::Nothing,
    };

    pub fn has_dimensions(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Non-zero natural size and at least one decodable frame.
    pub fn is_ready(&self) -> bool {
        self.has_dimensions() && self.level >= ReadyLevel::CurrentData
    }
}

/// One decoded frame, packed RGB8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RgbFrame {
    pub fn expected_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 3
    }

    pub fn is_complete(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.pixels.len() == Self::expected_len(self.width, self.height)
    }
}

/// A running video stream. Dropping it without `stop_tracks` is a leak the
/// session manager never allows.
pub trait LiveStream: Send {
    /// Human-readable device label for logs.
    fn label(&self) -> &str;

    fn surface(&mut self) -> SurfaceStatus;

    /// Rasterize the frame currently shown on the surface.
    fn current_frame(&mut self) -> anyhow::Result<RgbFrame>;

    /// Stop every track and release the device. Must tolerate repeated calls.
    fn stop_tracks(&mut self);
}

#[async_trait]
pub trait CameraBackend: Send + Sync {
    /// Ask the platform for a live stream. This is where the permission prompt happens.
    async fn acquire(&self, request: StreamRequest) -> Result<Box<dyn LiveStream>, DeviceFault>;
}
