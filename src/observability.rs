use std::io;
use std::net::SocketAddr;

use crate::model::RequestStatus;

// ── Admission metrics ───────────────────────────────────────────

/// Counter: submit calls by outcome. Labels: outcome (status or rejection kind).
pub const SUBMISSIONS_TOTAL: &str = "rsvp_submissions_total";

/// Counter: owner batch decisions applied. Labels: target.
pub const RESOLUTIONS_TOTAL: &str = "rsvp_resolutions_total";

/// Counter: requests moved by batch decisions. Labels: status.
pub const RESOLVED_REQUESTS_TOTAL: &str = "rsvp_resolved_requests_total";

/// Counter: cancellations. Labels: previous (status before cancel).
pub const CANCELLATIONS_TOTAL: &str = "rsvp_cancellations_total";

/// Gauge: events with request state loaded in memory.
pub const EVENTS_ACTIVE: &str = "rsvp_events_active";

// ── Storage metrics ─────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "rsvp_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (records per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "rsvp_wal_flush_batch_size";

/// Counter: compactions run by the background compactor.
pub const WAL_COMPACTIONS_TOTAL: &str = "rsvp_wal_compactions_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> io::Result<()> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(io::Error::other)?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Lowercase label for a request status.
pub fn status_label(status: RequestStatus) -> &'static str {
    match status {
        RequestStatus::Pending => "pending",
        RequestStatus::Confirmed => "confirmed",
        RequestStatus::Rejected => "rejected",
        RequestStatus::Canceled => "canceled",
    }
}
