//! Telemetry for the memory service
//!
//! TigerStyle: Explicit per-area levels, one init at startup.
//!
//! Log volume in this service is dominated by the background side: promotion
//! passes, compaction windows, and forgetting sweeps each emit per-record
//! events, while the request path (search, working memory reads) stays
//! comparatively quiet. The filter is therefore built per area instead of
//! from one global level: request-path crates run at [`TelemetryConfig::level`],
//! background crates at [`TelemetryConfig::pipeline_level`], and third-party
//! crates are clamped to `warn`. A `RUST_LOG` environment variable overrides
//! the whole filter when set.
//!
//! Span export over OTLP requires the `otel` feature; without it, only the
//! stdout subscriber installs.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Request-path crates: stores, memory tiers, query service
const REQUEST_PATH_TARGETS: &[&str] = &[
    "selkie_core",
    "selkie_store",
    "selkie_memory",
    "selkie_query",
];

/// Background crates: pipeline stages, task runtime, provider clients
const PIPELINE_TARGETS: &[&str] = &["selkie_pipeline", "selkie_runtime", "selkie_llm"];

/// Levels accepted in configuration
const LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

/// Telemetry configuration
///
/// Deserializes as a section of the service configuration snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Service name attached to exported spans
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Level for request-path crates
    #[serde(default = "default_level")]
    pub level: String,

    /// Level for pipeline, task runtime, and provider crates
    #[serde(default = "default_level")]
    pub pipeline_level: String,

    /// Emit human-readable logs on stdout
    #[serde(default = "default_stdout")]
    pub stdout_enabled: bool,

    /// OTLP endpoint; spans export only when set (requires the `otel` feature)
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

fn default_service_name() -> String {
    "selkie".to_string()
}

fn default_level() -> String {
    "info".to_string()
}

fn default_stdout() -> bool {
    true
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            level: default_level(),
            pipeline_level: default_level(),
            stdout_enabled: default_stdout(),
            otlp_endpoint: None,
        }
    }
}

impl TelemetryConfig {
    /// Validate level names
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("telemetry.level", &self.level),
            ("telemetry.pipeline_level", &self.pipeline_level),
        ] {
            if !LEVELS.contains(&value.as_str()) {
                return Err(Error::InvalidConfiguration {
                    field: field.into(),
                    reason: format!("unknown level '{}', expected one of {:?}", value, LEVELS),
                });
            }
        }
        if self.service_name.is_empty() {
            return Err(Error::InvalidConfiguration {
                field: "telemetry.service_name".into(),
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }

    /// Render the filter directives for this configuration
    ///
    /// Third-party crates are held at `warn`; each selkie crate gets its
    /// area's level.
    pub fn directives(&self) -> String {
        let mut parts = Vec::with_capacity(1 + REQUEST_PATH_TARGETS.len() + PIPELINE_TARGETS.len());
        parts.push("warn".to_string());
        for target in REQUEST_PATH_TARGETS {
            parts.push(format!("{}={}", target, self.level));
        }
        for target in PIPELINE_TARGETS {
            parts.push(format!("{}={}", target, self.pipeline_level));
        }
        parts.join(",")
    }
}

/// Guard returned by [`init_telemetry`]
///
/// When spans are exporting, dropping the guard flushes the exporter.
pub struct TelemetryGuard {
    exporting: bool,
}

impl TelemetryGuard {
    /// True when spans export over OTLP
    pub fn exporting(&self) -> bool {
        self.exporting
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        #[cfg(feature = "otel")]
        if self.exporting {
            opentelemetry::global::shutdown_tracer_provider();
        }
    }
}

fn env_filter(config: &TelemetryConfig) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.directives()))
}

/// Initialize telemetry with OTLP span export
#[cfg(feature = "otel")]
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard> {
    use tracing_subscriber::prelude::*;

    config.validate()?;

    let fmt_layer = config
        .stdout_enabled
        .then(|| tracing_subscriber::fmt::layer().with_target(true));
    let otel_layer = match config.otlp_endpoint {
        Some(ref endpoint) => {
            let tracer = otlp_tracer(&config.service_name, endpoint)?;
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };
    let exporting = otel_layer.is_some();

    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(fmt_layer)
        .with(otel_layer)
        .try_init()
        .map_err(|e| Error::internal(format!("failed to install tracing subscriber: {}", e)))?;

    tracing::info!(
        service = %config.service_name,
        exporting,
        level = %config.level,
        pipeline_level = %config.pipeline_level,
        "Telemetry initialized"
    );
    Ok(TelemetryGuard { exporting })
}

#[cfg(feature = "otel")]
fn otlp_tracer(
    service_name: &str,
    endpoint: &str,
) -> Result<opentelemetry_sdk::trace::Tracer> {
    use opentelemetry_otlp::WithExportConfig;

    let resource = opentelemetry_sdk::Resource::new(vec![opentelemetry::KeyValue::new(
        "service.name",
        service_name.to_string(),
    )]);

    opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint),
        )
        .with_trace_config(opentelemetry_sdk::trace::Config::default().with_resource(resource))
        .install_batch(opentelemetry_sdk::runtime::Tokio)
        .map_err(|e| Error::internal(format!("failed to start OTLP exporter: {}", e)))
}

/// Initialize stdout-only telemetry (the `otel` feature is not enabled)
#[cfg(not(feature = "otel"))]
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard> {
    use tracing_subscriber::prelude::*;

    config.validate()?;

    let fmt_layer = config
        .stdout_enabled
        .then(|| tracing_subscriber::fmt::layer().with_target(true));

    // Tolerate re-initialization so embedding tests can call this freely.
    let _ = tracing_subscriber::registry()
        .with(env_filter(config))
        .with(fmt_layer)
        .try_init();

    if config.otlp_endpoint.is_some() {
        tracing::warn!("otlp_endpoint set but the otel feature is not enabled; spans stay local");
    }

    Ok(TelemetryGuard { exporting: false })
}
