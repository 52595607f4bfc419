//! Quote Session Types
//!
//! Core domain types for a quote session: the client-generated session
//! identifier, the session lifecycle state, and decoded quote updates.

use std::fmt;

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// Quote Session Identifier
// =============================================================================

/// Prefix carried by every quote session identifier.
pub const QUOTE_SESSION_PREFIX: &str = "qs_";

/// Number of random characters following the prefix.
pub const QUOTE_SESSION_RANDOM_LEN: usize = 12;

const ALPHABETIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Client-generated identifier scoping a quote subscription stream.
///
/// The server never assigns this value. The client picks it, announces it
/// with `quote_create_session`, and then uses it to filter quote data frames.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuoteSessionId(String);

impl QuoteSessionId {
    /// Generate a fresh identifier: `qs_` followed by 12 alphabetic characters.
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let suffix: String = (0..QUOTE_SESSION_RANDOM_LEN)
            .map(|_| char::from(ALPHABETIC[rng.random_range(0..ALPHABETIC.len())]))
            .collect();
        Self(format!("{QUOTE_SESSION_PREFIX}{suffix}"))
    }

    /// Borrow the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QuoteSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Session State
// =============================================================================

/// Lifecycle state of a quote session.
///
/// ```text
/// Disconnected ──connect()──► AwaitingTransportOpen ──open──► AwaitingHandshake
///      ▲                                                          │
///      └──────────── disconnect() / timeout / peer close ◄── Ready ◄┘ handshake
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No transport, no session.
    #[default]
    Disconnected,
    /// Transport requested, waiting for it to open.
    AwaitingTransportOpen,
    /// Transport open, waiting for the server handshake frame.
    AwaitingHandshake,
    /// Quote session created and fields configured.
    Ready,
}

impl SessionState {
    /// Check if the quote session is usable for subscriptions.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Get the state name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::AwaitingTransportOpen => "awaiting_transport_open",
            Self::AwaitingHandshake => "awaiting_handshake",
            Self::Ready => "ready",
        }
    }
}

// =============================================================================
// Quote Update
// =============================================================================

/// Status reported by the feed for a healthy symbol.
pub const STATUS_OK: &str = "ok";

/// A decoded quote update for one symbol.
///
/// `values` only holds the fields that changed since the previous update,
/// so consumers merge updates rather than replace snapshots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuoteUpdate {
    /// Symbol name as reported by the feed (e.g. `NASDAQ:AAPL`).
    pub symbol: String,
    /// Per-symbol status (`ok`, `error`, ...).
    pub status: String,
    /// Changed quote fields keyed by field name.
    pub values: Map<String, Value>,
    /// Local receive time.
    pub received_at: DateTime<Utc>,
}

impl QuoteUpdate {
    /// Create an update stamped with the current time.
    #[must_use]
    pub fn new(symbol: String, status: String, values: Map<String, Value>) -> Self {
        Self {
            symbol,
            status,
            values,
            received_at: Utc::now(),
        }
    }

    /// Check if the feed reported the symbol as healthy.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }

    /// Read a numeric field as a `Decimal`.
    ///
    /// Accepts JSON numbers and numeric strings; returns `None` for missing or
    /// non-numeric values.
    #[must_use]
    pub fn decimal(&self, field: &str) -> Option<Decimal> {
        match self.values.get(field)? {
            Value::Number(n) => n.to_string().parse().ok(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn generated_session_id_shape() {
        let id = QuoteSessionId::generate();
        let suffix = id.as_str().strip_prefix(QUOTE_SESSION_PREFIX).unwrap();
        assert_eq!(suffix.len(), QUOTE_SESSION_RANDOM_LEN);
        assert!(suffix.chars().all(|c| c.is_ascii_alphabetic()));
    }

    #[test]
    fn generated_session_ids_differ() {
        assert_ne!(QuoteSessionId::generate(), QuoteSessionId::generate());
    }

    #[test]
    fn session_id_serializes_as_string() {
        let id = QuoteSessionId::generate();
        assert_eq!(serde_json::to_value(&id).unwrap(), json!(id.to_string()));
    }

    #[test]
    fn session_state_default_and_ready() {
        assert_eq!(SessionState::default(), SessionState::Disconnected);
        assert!(SessionState::Ready.is_ready());
        assert!(!SessionState::AwaitingHandshake.is_ready());
        assert_eq!(SessionState::AwaitingTransportOpen.as_str(), "awaiting_transport_open");
    }

    #[test]
    fn quote_update_decimal_access() {
        let values = json!({"lp": 123.45, "ch": "-0.5", "description": "Apple"});
        let update = QuoteUpdate::new(
            "AAPL".to_string(),
            "ok".to_string(),
            values.as_object().unwrap().clone(),
        );

        assert!(update.is_ok());
        assert_eq!(update.decimal("lp"), Some(Decimal::new(12345, 2)));
        assert_eq!(update.decimal("ch"), Some(Decimal::new(-5, 1)));
        assert_eq!(update.decimal("description"), None);
        assert_eq!(update.decimal("missing"), None);
    }
}
