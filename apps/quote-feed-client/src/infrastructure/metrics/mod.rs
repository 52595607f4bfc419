//! Prometheus Metrics Module
//!
//! Exposes quote feed metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Frames**: Inbound frames by kind, framing errors, keepalive echoes
//! - **Calls**: Outbound function calls by name
//! - **Quotes**: Delivered and stale quote updates
//! - **Session**: Subscription count, handshake latency, connect failures
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

// =============================================================================
// Exporter Installation
// =============================================================================

/// Install the Prometheus recorder and its HTTP listener on `port`.
///
/// # Errors
///
/// Returns an error if a recorder is already installed or the listener
/// cannot be built.
pub fn init_metrics(port: u16) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
        .install()?;

    register_metrics();
    Ok(())
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "quote_feed_frames_received_total",
        "Total frames decoded from the feed by kind"
    );
    describe_counter!(
        "quote_feed_framing_errors_total",
        "Total frames dropped because they could not be decoded"
    );
    describe_counter!(
        "quote_feed_keepalive_echoes_total",
        "Total keepalive probes answered"
    );
    describe_counter!(
        "quote_feed_calls_sent_total",
        "Total outbound function calls by name"
    );
    describe_counter!(
        "quote_feed_quote_updates_total",
        "Total quote updates delivered to the consumer"
    );
    describe_counter!(
        "quote_feed_stale_quotes_total",
        "Total quote frames dropped for a non-active quote session"
    );
    describe_counter!(
        "quote_feed_connect_failures_total",
        "Total failed connect attempts by reason"
    );

    describe_gauge!(
        "quote_feed_subscriptions",
        "Number of subscribed symbols"
    );

    describe_histogram!(
        "quote_feed_handshake_seconds",
        "Time from connect() to a ready quote session"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Metric labels for inbound frame kinds.
#[derive(Debug, Clone, Copy)]
pub enum FrameKind {
    /// Keepalive probe.
    KeepAlive,
    /// Data or control frame.
    Data,
}

impl FrameKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::KeepAlive => "keepalive",
            Self::Data => "data",
        }
    }
}

/// Record a decoded inbound frame.
pub fn record_frame_received(kind: FrameKind) {
    counter!(
        "quote_feed_frames_received_total",
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Record a frame dropped by the codec.
pub fn record_framing_error(error_type: &'static str) {
    counter!(
        "quote_feed_framing_errors_total",
        "error_type" => error_type
    )
    .increment(1);
}

/// Record an answered keepalive probe.
pub fn record_keepalive_echo() {
    counter!("quote_feed_keepalive_echoes_total").increment(1);
}

/// Record an outbound function call.
pub fn record_call_sent(function: &'static str) {
    counter!(
        "quote_feed_calls_sent_total",
        "function" => function
    )
    .increment(1);
}

/// Record a quote update delivered to the consumer.
pub fn record_quote_update() {
    counter!("quote_feed_quote_updates_total").increment(1);
}

/// Record a quote frame dropped for a non-active session.
pub fn record_stale_quote() {
    counter!("quote_feed_stale_quotes_total").increment(1);
}

/// Record a failed connect attempt.
pub fn record_connect_failure(reason: &'static str) {
    counter!(
        "quote_feed_connect_failures_total",
        "reason" => reason
    )
    .increment(1);
}

/// Update the subscribed symbol count.
#[allow(clippy::cast_precision_loss)]
pub fn set_subscriptions(count: usize) {
    gauge!("quote_feed_subscriptions").set(count as f64);
}

/// Record the time taken to reach a ready session.
pub fn record_handshake_duration(duration: Duration) {
    histogram!("quote_feed_handshake_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_kind_as_str() {
        assert_eq!(FrameKind::KeepAlive.as_str(), "keepalive");
        assert_eq!(FrameKind::Data.as_str(), "data");
    }

    #[test]
    fn recording_without_exporter_is_noop() {
        record_frame_received(FrameKind::Data);
        record_framing_error("invalid_payload");
        record_keepalive_echo();
        record_call_sent("quote_add_symbols");
        set_subscriptions(3);
        record_handshake_duration(Duration::from_millis(120));
    }
}
