use thiserror::Error;

/// Low-level reason a backend could not hand out a live stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceFault {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("no matching device: {0}")]
    NotFound(String),

    #[error("device already in use: {0}")]
    InUse(String),

    #[error("device error: {0}")]
    Other(String),
}

impl DeviceFault {
    pub fn is_permission(&self) -> bool {
        matches!(self, DeviceFault::PermissionDenied(_))
    }
}

/// Failure reported by [`crate::CameraSessionManager::open`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("camera permission denied ({0})")]
    PermissionDenied(String),

    #[error("camera unavailable ({0})")]
    DeviceUnavailable(String),

    /// The session was closed while the device request was still pending.
    #[error("camera request cancelled")]
    Cancelled,
}

impl CameraError {
    /// Fold the preferred and fallback attempt failures into one reported error.
    ///
    /// Permission wins over availability: if either attempt was refused the user
    /// has to act on permissions before anything else can work.
    pub fn from_attempts(first: (&str, &DeviceFault), second: (&str, &DeviceFault)) -> Self {
        let cause = format!("{}: {}; {}: {}", first.0, first.1, second.0, second.1);
        if first.1.is_permission() || second.1.is_permission() {
            CameraError::PermissionDenied(cause)
        } else {
            CameraError::DeviceUnavailable(cause)
        }
    }
}

/// Failure reported by [`crate::CaptureEncoder::capture_frame`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// Precondition not met: the live surface has no current frame yet.
    #[error("camera is not ready")]
    NotReady,

    #[error("still encode failed: {0}")]
    EncodeFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denial_on_either_attempt_reports_permission() {
        let denied = DeviceFault::PermissionDenied("user said no".into());
        let missing = DeviceFault::NotFound("/dev/video1".into());

        let err = CameraError::from_attempts(("environment", &missing), ("user", &denied));
        assert!(matches!(err, CameraError::PermissionDenied(_)));

        let err = CameraError::from_attempts(("environment", &denied), ("user", &missing));
        assert!(matches!(err, CameraError::PermissionDenied(_)));
    }

    #[test]
    fn cause_names_both_attempts() {
        let busy = DeviceFault::InUse("/dev/video0".into());
        let missing = DeviceFault::NotFound("/dev/video1".into());

        let err = CameraError::from_attempts(("environment", &busy), ("user", &missing));
        assert_eq!(
            err.to_string(),
            "camera unavailable (environment: device already in use: /dev/video0; user: no matching device: /dev/video1)"
        );
    }
}
