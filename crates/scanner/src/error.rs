use crate::state::ScanPhase;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("{file_name} is not an image (type: {})", content_type.as_deref().unwrap_or("unknown"))]
    NotAnImage {
        file_name: String,
        content_type: Option<String>,
    },
}

/// A command the controller refused without touching its state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejected {
    #[error("a request is already in flight")]
    Busy,

    #[error("cannot {action} while {phase}")]
    NotAllowed { action: &'static str, phase: ScanPhase },

    #[error("search query is empty")]
    EmptyQuery,

    #[error("no result at position {0}")]
    NoSuchItem(usize),
}
