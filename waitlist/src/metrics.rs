//! Business metrics for the waitlist engine.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `waitlist_joins_total{status}` - Joins by resulting status (offered, waiting)
//! - `waitlist_offers_total{source}` - Offers granted (join, promotion)
//! - `waitlist_offers_expired_total{source}` - Offers retired (timer, sweep, release)
//! - `waitlist_tickets_total{status}` - Ticket transitions by target status
//! - `waitlist_rejections_total{command,kind}` - Rejected commands by command name and error kind
//!
//! ## Gauges
//! - `waitlist_active_stores` - Per-event stores currently open

use crate::error::ErrorKind;
use crate::types::{EntryStatus, TicketStatus};
use metrics::{describe_counter, describe_gauge};

/// Initialize and register all business metrics descriptions.
///
/// This should be called once at application startup, before any metrics are recorded.
pub fn register_business_metrics() {
    describe_counter!(
        "waitlist_joins_total",
        "Total number of waitlist joins by resulting status (offered, waiting)"
    );
    describe_counter!(
        "waitlist_offers_total",
        "Total number of purchase offers granted, by source (join, promotion)"
    );
    describe_counter!(
        "waitlist_offers_expired_total",
        "Total number of offers retired without purchase, by source (timer, sweep, release)"
    );
    describe_counter!(
        "waitlist_tickets_total",
        "Total number of ticket transitions by target status"
    );
    describe_counter!(
        "waitlist_rejections_total",
        "Total number of rejected commands by command name and error kind"
    );
    describe_gauge!("waitlist_active_stores", "Per-event stores currently open");

    tracing::info!("Business metrics registered");
}

/// Record a join.
pub fn record_join(status: EntryStatus) {
    metrics::counter!("waitlist_joins_total", "status" => status.to_string()).increment(1);
}

/// Record an offer grant.
///
/// # Arguments
///
/// * `source` - `"join"` or `"promotion"`
pub fn record_offer(source: &'static str) {
    metrics::counter!("waitlist_offers_total", "source" => source).increment(1);
}

/// Record an offer retired without purchase.
pub fn record_offer_expired(source: &'static str) {
    metrics::counter!("waitlist_offers_expired_total", "source" => source).increment(1);
}

/// Record a ticket moving to `status`.
pub fn record_ticket(status: TicketStatus) {
    metrics::counter!("waitlist_tickets_total", "status" => status.to_string()).increment(1);
}

/// Record a rejected command.
///
/// # Arguments
///
/// * `command` - Action variant name, e.g. `"PurchaseTicket"`
/// * `kind` - Validation or conflict
pub fn record_rejection(command: &'static str, kind: ErrorKind) {
    metrics::counter!(
        "waitlist_rejections_total",
        "command" => command,
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Update the open store gauge.
#[allow(clippy::cast_precision_loss)] // store counts stay far below 2^52
pub fn update_active_stores(count: usize) {
    metrics::gauge!("waitlist_active_stores").set(count as f64);
    tracing::debug!(count, "Updated active_stores metric");
}
