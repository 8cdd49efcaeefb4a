use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "multicache_cache_hit_total",
            Unit::Count,
            "Total number of cache hits."
        );
        describe_counter!(
            "multicache_cache_miss_total",
            Unit::Count,
            "Total number of cache misses."
        );
        describe_counter!(
            "multicache_store_degraded_total",
            Unit::Count,
            "Total number of store or codec failures absorbed as misses."
        );
        describe_counter!(
            "multicache_entry_skipped_total",
            Unit::Count,
            "Total number of write-back entries skipped because they could not be encoded."
        );
        describe_counter!(
            "multicache_result_dropped_total",
            Unit::Count,
            "Total number of loaded values dropped because the result key field was absent."
        );
        describe_histogram!(
            "multicache_batch_load_ms",
            Unit::Milliseconds,
            "Batch reconciliation latency in milliseconds."
        );
    });
}
