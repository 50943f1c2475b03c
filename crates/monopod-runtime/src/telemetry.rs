//! Process-wide `tracing` setup for monopod binaries and demos.
//!
//! | Variable | Effect |
//! |---|---|
//! | `RUST_LOG` | Log filter (default `"info"`). |
//! | `MONOPOD_LOG_FORMAT=json` | Newline-delimited JSON instead of compact text. |
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | When set, spans are also exported over OTLP/HTTP. |
//!
//! ```rust,no_run
//! let _telemetry = monopod_runtime::telemetry::init_tracing("monopod-demo");
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const TRACER_NAME: &str = "monopod";

/// Output format of the console layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    /// Read `MONOPOD_LOG_FORMAT`; anything but `json` is compact.
    pub fn from_env() -> Self {
        match std::env::var("MONOPOD_LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

/// Install the global subscriber.  Hold the returned guard until exit; it
/// flushes and shuts down the OTLP exporter on drop.
///
/// A second call leaves the first subscriber in place.
pub fn init_tracing(service_name: &str) -> TelemetryGuard {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let format = LogFormat::from_env();
    let provider = otlp_provider(service_name);

    let otel = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer(TRACER_NAME)));
    let json = (format == LogFormat::Json).then(|| tracing_subscriber::fmt::layer().json());
    let compact = (format == LogFormat::Compact).then(|| tracing_subscriber::fmt::layer().compact());

    if let Err(e) = tracing_subscriber::registry()
        .with(env_filter)
        .with(otel)
        .with(json)
        .with(compact)
        .try_init()
    {
        eprintln!("[monopod] tracing subscriber already installed: {e}");
    }

    TelemetryGuard(provider)
}

/// Shuts the OTLP tracer provider down when dropped.
pub struct TelemetryGuard(Option<SdkTracerProvider>);

impl TelemetryGuard {
    /// `true` when spans are exported over OTLP.
    pub fn exporting(&self) -> bool {
        self.0.is_some()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("[monopod] OpenTelemetry shutdown error: {e}");
            }
        }
    }
}

/// OTLP/HTTP provider, or `None` when `OTEL_EXPORTER_OTLP_ENDPOINT` is unset
/// or the exporter fails to build.
fn otlp_provider(service_name: &str) -> Option<SdkTracerProvider> {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()?;

    let exporter = match opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
    {
        Ok(exporter) => exporter,
        Err(e) => {
            eprintln!("[monopod] OTLP exporter init failed: {e}");
            return None;
        }
    };

    // The control loop runs on plain threads, so export synchronously
    // instead of through a batch processor that needs an async runtime.
    Some(
        SdkTracerProvider::builder()
            .with_resource(Resource::builder().with_service_name(service_name.to_string()).build())
            .with_simple_exporter(exporter)
            .build(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_selects_log_format_and_exporter() {
        // SAFETY: the only test in this crate touching these variables.
        unsafe {
            std::env::remove_var("OTEL_EXPORTER_OTLP_ENDPOINT");
            std::env::set_var("MONOPOD_LOG_FORMAT", "json");
        }
        assert_eq!(LogFormat::from_env(), LogFormat::Json);
        assert!(otlp_provider("test").is_none());

        unsafe { std::env::set_var("MONOPOD_LOG_FORMAT", "pretty") };
        assert_eq!(LogFormat::from_env(), LogFormat::Compact);
        unsafe { std::env::remove_var("MONOPOD_LOG_FORMAT") };
    }

    #[test]
    fn init_twice_does_not_panic() {
        let first = init_tracing("monopod-test");
        let second = init_tracing("monopod-test");
        tracing::info!("telemetry initialised twice");
        drop(second);
        drop(first);
    }
}
