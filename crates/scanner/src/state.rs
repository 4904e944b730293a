use crate::source::CaptureAsset;
use recognition::FoodRecord;
use std::fmt;

/// Payload-free tag of [`ScanState`], published on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanPhase {
    Idle,
    AwaitingCapture,
    HasCapture,
    Analyzing,
    HasResults,
    Error,
}

impl ScanPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanPhase::Idle => "idle",
            ScanPhase::AwaitingCapture => "awaiting capture",
            ScanPhase::HasCapture => "has capture",
            ScanPhase::Analyzing => "analyzing",
            ScanPhase::HasResults => "has results",
            ScanPhase::Error => "error",
        }
    }
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    Upload,
    Camera,
}

/// Where the scan flow is. The asset lives inside the variants that may hold
/// one, so "analyzing without an image" cannot be expressed.
#[derive(Debug)]
pub enum ScanState {
    Idle,
    AwaitingCapture {
        mode: CaptureMode,
    },
    HasCapture {
        asset: CaptureAsset,
    },
    Analyzing {
        asset: CaptureAsset,
    },
    HasResults {
        asset: CaptureAsset,
        records: Vec<FoodRecord>,
    },
    /// `asset` is kept when the failure came from analysis, so a retry does
    /// not need a new capture.
    Error {
        asset: Option<CaptureAsset>,
        message: String,
    },
}

impl ScanState {
    pub fn phase(&self) -> ScanPhase {
        match self {
            ScanState::Idle => ScanPhase::Idle,
            ScanState::AwaitingCapture { .. } => ScanPhase::AwaitingCapture,
            ScanState::HasCapture { .. } => ScanPhase::HasCapture,
            ScanState::Analyzing { .. } => ScanPhase::Analyzing,
            ScanState::HasResults { .. } => ScanPhase::HasResults,
            ScanState::Error { .. } => ScanPhase::Error,
        }
    }

    pub fn asset(&self) -> Option<&CaptureAsset> {
        match self {
            ScanState::HasCapture { asset }
            | ScanState::Analyzing { asset }
            | ScanState::HasResults { asset, .. } => Some(asset),
            ScanState::Error { asset, .. } => asset.as_ref(),
            ScanState::Idle | ScanState::AwaitingCapture { .. } => None,
        }
    }

    pub fn records(&self) -> &[FoodRecord] {
        match self {
            ScanState::HasResults { records, .. } => records,
            _ => &[],
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            ScanState::Error { message, .. } => Some(message),
            _ => None,
        }
    }

    /// A fresh capture may start from here. Replacing the state drops any asset.
    pub fn accepts_new_capture(&self) -> bool {
        matches!(
            self,
            ScanState::Idle
                | ScanState::HasCapture { .. }
                | ScanState::HasResults { .. }
                | ScanState::Error { .. }
        )
    }

    pub fn is_camera_open(&self) -> bool {
        matches!(
            self,
            ScanState::AwaitingCapture {
                mode: CaptureMode::Camera
            }
        )
    }
}

/// Text search runs beside the scan flow and never moves [`ScanState`].
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SearchState {
    #[default]
    Idle,
    Searching {
        query: String,
    },
    /// May be empty; rendered as "no results".
    Results {
        query: String,
        records: Vec<FoodRecord>,
    },
    Failed {
        query: String,
        message: String,
    },
}

impl SearchState {
    pub fn records(&self) -> &[FoodRecord] {
        match self {
            SearchState::Results { records, .. } => records,
            _ => &[],
        }
    }
}
