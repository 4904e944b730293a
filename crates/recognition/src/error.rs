use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Analyze,
    Search,
    Health,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Analyze => "analyze",
            Operation::Search => "search",
            Operation::Health => "health",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a request failed. Kept for logs; callers treat every cause alike.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    #[error("service answered HTTP {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecognitionError {
    #[error("{operation} request failed: {cause}")]
    AnalysisFailed { operation: Operation, cause: FailureCause },
}

impl RecognitionError {
    pub fn new(operation: Operation, cause: FailureCause) -> Self {
        RecognitionError::AnalysisFailed { operation, cause }
    }

    pub fn operation(&self) -> Operation {
        match self {
            RecognitionError::AnalysisFailed { operation, .. } => *operation,
        }
    }

    pub fn cause(&self) -> &FailureCause {
        match self {
            RecognitionError::AnalysisFailed { cause, .. } => cause,
        }
    }
}
