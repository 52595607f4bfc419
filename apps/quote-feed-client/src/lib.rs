#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Quote Feed Client - Real-time Quote Session over `~m~` Framing
//!
//! Maintains one WebSocket connection to a quote feed that speaks a
//! socket.io-derived framing (`~m~<len>~m~<payload>`), runs the session
//! handshake, tracks symbol subscriptions, answers keepalives, and delivers
//! quote updates for the active quote session.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Quote and subscription types
//!   - `quote`: Quote session id, lifecycle state, quote updates
//!   - `subscription`: Subscribed symbol set
//!
//! - **Application**: Port definitions
//!   - `ports`: The duplex transport interface
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `feed`: Framing codec, session client, WebSocket transport
//!   - `config`: Configuration from environment variables
//!   - `metrics`: Prometheus counters and gauges
//!   - `telemetry`: Tracing subscriber and OTLP export
//!
//! # Data Flow
//!
//! ```text
//!                ┌──────────────┐  TransportEvent  ┌────────────────┐  QuoteEvent
//! Quote feed ◄──►│  WebSocket   │─────────────────►│ QuoteFeed      │────────────► consumer
//!                │  Transport   │◄─────────────────│ Client         │
//!                └──────────────┘   framed calls   └────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core quote types with no I/O.
pub mod domain;

/// Application layer - Port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::quote::{QuoteSessionId, QuoteUpdate, SessionState};
pub use domain::subscription::{SubscriptionSet, Symbol};

// Ports
pub use application::ports::{Transport, TransportError, TransportEvent};

// Feed client
pub use infrastructure::feed::{
    AuthToken, Frame, FrameCodec, FramingError, QuoteEvent, QuoteFeedClient, SessionConfig,
    SessionError, WebSocketConfig, WebSocketTransport,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, FeedConfig, QuoteFields};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
