use crate::Environment;
use crate::logging::env_filter;
use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource,
    metrics::{PeriodicReader, SdkMeterProvider},
    propagation::TraceContextPropagator,
    trace::{Sampler, SdkTracerProvider},
};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const METRIC_EXPORT_INTERVAL: Duration = Duration::from_secs(10);

/// Owns the OTLP tracer and meter providers; flushes and shuts them down on drop.
///
/// Must be created from inside a Tokio runtime, the batch exporters spawn onto it.
///
/// ```ignore
/// let _telemetry = TelemetryGuard::init(
///     "scanner",
///     "http://localhost:4317",
///     Environment::Production,
///     "info",
/// )?;
/// ```
pub struct TelemetryGuard {
    tracer_provider: SdkTracerProvider,
    meter_provider: SdkMeterProvider,
}

impl TelemetryGuard {
    /// Install OTLP exporters and the global subscriber (which bridges `tracing`
    /// spans into OpenTelemetry). Replaces [`crate::setup_logging`] for the process.
    pub fn init(
        service_name: &str,
        endpoint: &str,
        environment: Environment,
        default_directive: &str,
    ) -> anyhow::Result<Self> {
        global::set_text_map_propagator(TraceContextPropagator::new());

        let resource = service_resource(service_name, environment);

        let span_exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()?;

        let tracer_provider = SdkTracerProvider::builder()
            .with_resource(resource.clone())
            .with_sampler(Sampler::ParentBased(Box::new(Sampler::AlwaysOn)))
            .with_batch_exporter(span_exporter)
            .build();
        global::set_tracer_provider(tracer_provider.clone());

        let metric_exporter = opentelemetry_otlp::MetricExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()?;

        let meter_provider = SdkMeterProvider::builder()
            .with_resource(resource)
            .with_reader(
                PeriodicReader::builder(metric_exporter)
                    .with_interval(METRIC_EXPORT_INTERVAL)
                    .build(),
            )
            .build();
        global::set_meter_provider(meter_provider.clone());

        let registry = tracing_subscriber::registry()
            .with(env_filter(default_directive))
            .with(
                tracing_opentelemetry::layer()
                    .with_tracer(global::tracer(service_name.to_string())),
            );

        match environment {
            Environment::Production => registry
                .with(tracing_subscriber::fmt::layer().json().with_level(true))
                .try_init()?,
            Environment::Development => registry
                .with(tracing_subscriber::fmt::layer().pretty().with_ansi(true))
                .try_init()?,
        }

        tracing::info!(service_name, endpoint, "OpenTelemetry export enabled");

        Ok(Self {
            tracer_provider,
            meter_provider,
        })
    }
}

fn service_resource(service_name: &str, environment: Environment) -> Resource {
    use opentelemetry_semantic_conventions::attribute;

    Resource::builder()
        .with_attributes([
            KeyValue::new(attribute::SERVICE_NAME, service_name.to_string()),
            KeyValue::new(attribute::SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
            KeyValue::new("deployment.environment", environment.as_str()),
        ])
        .build()
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Err(e) = self.tracer_provider.shutdown() {
            eprintln!("Failed to shutdown tracer provider: {:?}", e);
        }
        if let Err(e) = self.meter_provider.shutdown() {
            eprintln!("Failed to shutdown meter provider: {:?}", e);
        }
    }
}

/// Creates an info-level span and enters it.
#[macro_export]
macro_rules! span {
    ($name:literal) => {
        tracing::info_span!($name).entered()
    };
}

/// Creates a debug-level span and enters it.
#[macro_export]
macro_rules! span_debug {
    ($name:literal) => {
        tracing::debug_span!($name).entered()
    };
}
