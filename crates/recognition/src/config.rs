use common::env_string;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8081";

#[derive(Debug, Clone)]
pub struct RecognitionConfig {
    /// Scheme and host of the recognition service, without a trailing slash.
    pub base_url: String,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl RecognitionConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(env_string("RECOGNITION_BASE_URL", DEFAULT_BASE_URL))
    }
}
