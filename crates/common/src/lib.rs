pub mod config;
pub mod logging;
pub mod telemetry;
pub mod wait;

pub use config::{Environment, env_opt, env_parse, env_string};
pub use logging::setup_logging;
pub use telemetry::TelemetryGuard;
#[cfg(feature = "async")]
pub use wait::poll_until;
