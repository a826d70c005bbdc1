use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::model::RequestSource;

// ── Cache ───────────────────────────────────────────────────────

/// Counter: fresh cache entries served. Labels: source.
pub const CACHE_HITS_TOTAL: &str = "daygrid_cache_hits_total";

/// Counter: reads that had to compute synchronously.
pub const CACHE_MISSES_TOTAL: &str = "daygrid_cache_misses_total";

/// Counter: previous snapshots served while a refresh was in flight.
pub const CACHE_STALE_SERVED_TOTAL: &str = "daygrid_cache_stale_served_total";

// ── Refresh jobs ────────────────────────────────────────────────

/// Counter: refresh jobs enqueued.
pub const REFRESH_SCHEDULED_TOTAL: &str = "daygrid_refresh_scheduled_total";

/// Counter: refresh requests dropped because one was already in flight.
pub const REFRESH_COALESCED_TOTAL: &str = "daygrid_refresh_coalesced_total";

/// Counter: refresh jobs that failed.
pub const REFRESH_FAILED_TOTAL: &str = "daygrid_refresh_failed_total";

// ── Aggregation ─────────────────────────────────────────────────

/// Histogram: aggregation latency in seconds.
pub const AGGREGATION_DURATION_SECONDS: &str = "daygrid_aggregation_duration_seconds";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

pub fn source_label(source: RequestSource) -> &'static str {
    match source {
        RequestSource::User => "user",
        RequestSource::BackgroundRefresh => "background_refresh",
    }
}
