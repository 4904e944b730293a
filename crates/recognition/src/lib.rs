pub mod client;
pub mod config;
pub mod error;
pub mod record;
pub mod wire;

pub use client::{FoodRecognizer, ImagePayload, RecognitionClient};
pub use config::RecognitionConfig;
pub use error::{FailureCause, Operation, RecognitionError};
pub use record::{FoodRecord, total_calories};
