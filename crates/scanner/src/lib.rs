pub mod config;
pub mod controller;
pub mod error;
pub mod meal_plan;
pub mod metrics;
pub mod render;
pub mod source;
pub mod state;

pub use config::ScannerConfig;
pub use controller::{Dispatch, Pick, ScanController, ScanView, messages};
pub use error::{Rejected, SourceError};
pub use meal_plan::{InMemoryMealPlan, LoggingMealPlan, MealPlanSink};
pub use metrics::{FailureKind, ScanMetrics};
pub use source::{
    CaptureAsset, ImageSourceResolver, PreviewHandle, PreviewRegistry, SourceKind, UploadFile,
};
pub use state::{CaptureMode, ScanPhase, ScanState, SearchState};
