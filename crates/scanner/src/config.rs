use capture::CameraConfig;
use common::{Environment, env_opt, env_string};
use recognition::RecognitionConfig;

#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub environment: Environment,
    pub log_level: String,
    pub otel_endpoint: Option<String>,
    pub recognition: RecognitionConfig,
    pub camera: CameraConfig,
}

impl ScannerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            environment: Environment::from_env(),
            log_level: env_string("SCANNER_LOG_LEVEL", "info"),
            otel_endpoint: env_opt("SCANNER_OTEL_ENDPOINT"),
            recognition: RecognitionConfig::from_env(),
            camera: CameraConfig::from_env()?,
        })
    }
}
