use crate::device::{CameraBackend, Facing, StreamRequest};
use crate::virtual_backend::VirtualBackend;
use common::{env_parse, env_string};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub use common::Environment;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Virtual,
    V4l,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "virtual" | "fake" => Ok(BackendKind::Virtual),
            "v4l" | "v4l2" => Ok(BackendKind::V4l),
            other => Err(format!("{} is not a camera backend. Use `virtual` or `v4l`.", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CameraConfig {
    pub environment: Environment,
    pub backend: BackendKind,
    pub preferred_facing: Facing,
    pub ideal_width: u32,
    pub ideal_height: u32,
    /// `/dev/videoN` index used for the rear camera.
    pub environment_device: u32,
    /// `/dev/videoN` index used for the front camera.
    pub user_device: u32,
    pub ready_timeout_ms: u64,
    pub ready_poll_ms: u64,
}

impl CameraConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let environment = Environment::from_env();

        let backend = env_string("CAMERA_BACKEND", "virtual")
            .parse()
            .map_err(anyhow::Error::msg)?;
        let preferred_facing = env_string("CAMERA_FACING", "environment")
            .parse()
            .map_err(anyhow::Error::msg)?;

        Ok(Self {
            environment,
            backend,
            preferred_facing,
            ideal_width: env_parse("CAMERA_IDEAL_WIDTH", StreamRequest::IDEAL_WIDTH),
            ideal_height: env_parse("CAMERA_IDEAL_HEIGHT", StreamRequest::IDEAL_HEIGHT),
            environment_device: env_parse("CAMERA_ENVIRONMENT_DEVICE", 0),
            user_device: env_parse("CAMERA_USER_DEVICE", 1),
            ready_timeout_ms: env_parse("CAMERA_READY_TIMEOUT_MS", 5000),
            ready_poll_ms: env_parse("CAMERA_READY_POLL_MS", 50),
        })
    }

    /// Instantiate the configured backend.
    pub fn backend(&self) -> anyhow::Result<Arc<dyn CameraBackend>> {
        match self.backend {
            BackendKind::Virtual => Ok(Arc::new(VirtualBackend::new())),
            #[cfg(feature = "v4l")]
            BackendKind::V4l => Ok(Arc::new(crate::v4l_backend::V4lBackend::new(
                self.environment_device,
                self.user_device,
            ))),
            #[cfg(not(feature = "v4l"))]
            BackendKind::V4l => {
                anyhow::bail!("built without the `v4l` feature, use CAMERA_BACKEND=virtual")
            }
        }
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn ready_poll(&self) -> Duration {
        Duration::from_millis(self.ready_poll_ms.max(1))
    }
}
