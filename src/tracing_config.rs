//! Global tracing configuration and initialization for Spire-Loom
//!
//! Every weaving phase logs through `tracing`; the subscriber here is the
//! only place output format and filtering are decided.

use anyhow::{Context, Result};
use tracing::{Level, Subscriber};
use tracing_subscriber::{
    filter::EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    registry::LookupSpan,
    Layer, Registry,
};

/// Global tracing configuration
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Service name shown in log targets
    pub service_name: String,
    /// Minimum log level
    pub log_level: Level,
    /// Enable console output
    pub enable_console: bool,
    /// Enable JSON formatting
    pub json_output: bool,
    /// Emit span open/close events
    pub span_events: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: "spire-loom".to_string(),
            log_level: Level::INFO,
            enable_console: true,
            json_output: false,
            span_events: false,
        }
    }
}

/// Initialize global tracing from a configuration.
pub fn init_global_tracing(config: TracingConfig) -> Result<()> {
    let subscriber = Registry::default()
        .with(env_filter_layer(&config))
        .with(config.enable_console.then(|| fmt_layer(&config)));

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global tracing subscriber")?;

    Ok(())
}

/// Initialize minimal tracing for testing. Safe to call repeatedly; only
/// the first subscriber wins.
pub fn init_test_tracing() {
    let config = TracingConfig {
        log_level: Level::DEBUG,
        span_events: false,
        ..Default::default()
    };
    let _ = init_global_tracing(config);
}

/// Create environment filter layer
fn env_filter_layer(config: &TracingConfig) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(config.log_level.into())
        .from_env_lossy()
}

/// Create formatting layer
fn fmt_layer<S>(config: &TracingConfig) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let span_events = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let layer = fmt::layer()
        .with_target(true)
        .with_span_events(span_events);

    if config.json_output {
        Box::new(layer.json())
    } else {
        Box::new(layer.compact())
    }
}
