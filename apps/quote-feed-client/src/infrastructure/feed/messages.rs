//! Quote Feed Message Types
//!
//! Wire format types carried inside framed payloads.
//!
//! # Calls (client → server)
//!
//! Every outbound call is a compact JSON object naming a function and its
//! positional arguments:
//!
//! ```json
//! {"m":"quote_add_symbols","p":["qs_AbCdEfGhIjKl","NASDAQ:AAPL",{"flags":["force_permission"]}]}
//! ```
//!
//! # Server frames
//!
//! - Handshake: an object carrying `session_id` (contents are not used)
//! - Quote data: `{"m":"qsd","p":["<quote session>",{"n":..,"s":..,"v":{..}}]}`

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::quote::QuoteUpdate;

/// Server function name for quote data updates.
pub const QUOTE_DATA_FUNCTION: &str = "qsd";

/// Flag asking the server to stream symbols regardless of entitlement checks.
pub const FORCE_PERMISSION_FLAG: &str = "force_permission";

// =============================================================================
// Client Functions
// =============================================================================

/// Functions the client calls on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientFunction {
    /// Record the user's auth token for this connection.
    SetAuthToken,
    /// Announce a client-generated quote session.
    QuoteCreateSession,
    /// Select which quote fields the session streams.
    QuoteSetFields,
    /// Start streaming a symbol.
    QuoteAddSymbols,
    /// Stop streaming a symbol.
    QuoteRemoveSymbols,
}

impl ClientFunction {
    /// Get the wire function name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SetAuthToken => "set_auth_token",
            Self::QuoteCreateSession => "quote_create_session",
            Self::QuoteSetFields => "quote_set_fields",
            Self::QuoteAddSymbols => "quote_add_symbols",
            Self::QuoteRemoveSymbols => "quote_remove_symbols",
        }
    }
}

// =============================================================================
// Outbound
// =============================================================================

/// An outbound function call.
#[derive(Debug, Clone, Serialize)]
pub struct Call<'a> {
    /// Function name.
    pub m: &'a str,
    /// Positional arguments.
    pub p: &'a [Value],
}

/// Options object attached to `quote_add_symbols`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddSymbolFlags {
    /// Subscription flags.
    pub flags: Vec<String>,
}

impl Default for AddSymbolFlags {
    fn default() -> Self {
        Self {
            flags: vec![FORCE_PERMISSION_FLAG.to_string()],
        }
    }
}

impl AddSymbolFlags {
    /// Render as a JSON argument.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let flags = self.flags.iter().map(|f| Value::from(f.as_str())).collect();
        let mut object = Map::new();
        object.insert("flags".to_string(), Value::Array(flags));
        Value::Object(object)
    }
}

// =============================================================================
// Inbound
// =============================================================================

/// Parsed payload of a data frame.
///
/// Unknown keys are ignored; every known key is optional so that control
/// frames of any shape still parse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// Function name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub m: Option<String>,
    /// Positional arguments.
    #[serde(default)]
    pub p: Vec<Value>,
    /// Present only on the server handshake frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl Payload {
    /// Check if this is the server handshake frame.
    #[must_use]
    pub const fn is_handshake(&self) -> bool {
        self.session_id.is_some()
    }

    /// Check if this payload calls the given function.
    #[must_use]
    pub fn calls(&self, function: &str) -> bool {
        self.m.as_deref() == Some(function)
    }
}

/// Body of a `qsd` frame (second positional argument).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QuoteData {
    /// Symbol name.
    pub n: String,
    /// Status.
    pub s: String,
    /// Changed values.
    #[serde(default)]
    pub v: Map<String, Value>,
}

impl QuoteData {
    /// Convert into a domain quote update.
    #[must_use]
    pub fn into_update(self) -> QuoteUpdate {
        QuoteUpdate::new(self.n, self.s, self.v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_function_names() {
        assert_eq!(ClientFunction::SetAuthToken.as_str(), "set_auth_token");
        assert_eq!(ClientFunction::QuoteCreateSession.as_str(), "quote_create_session");
        assert_eq!(ClientFunction::QuoteSetFields.as_str(), "quote_set_fields");
        assert_eq!(ClientFunction::QuoteAddSymbols.as_str(), "quote_add_symbols");
        assert_eq!(ClientFunction::QuoteRemoveSymbols.as_str(), "quote_remove_symbols");
    }

    #[test]
    fn call_serializes_compact() {
        let args = [json!("qs_x"), json!("AAPL")];
        let call = Call {
            m: "quote_remove_symbols",
            p: &args,
        };
        assert_eq!(
            serde_json::to_string(&call).unwrap(),
            r#"{"m":"quote_remove_symbols","p":["qs_x","AAPL"]}"#
        );
    }

    #[test]
    fn add_symbol_flags_value() {
        assert_eq!(
            AddSymbolFlags::default().to_value(),
            json!({"flags": ["force_permission"]})
        );
    }

    #[test]
    fn payload_parses_handshake() {
        let payload: Payload = serde_json::from_str(
            r#"{"session_id":"<0.1.2>_abc","timestamp":1700000000,"release":"r1"}"#,
        )
        .unwrap();
        assert!(payload.is_handshake());
        assert!(payload.m.is_none());
        assert!(payload.p.is_empty());
    }

    #[test]
    fn payload_parses_quote_data() {
        let payload: Payload = serde_json::from_str(
            r#"{"m":"qsd","p":["qs_a",{"n":"AAPL","s":"ok","v":{"lp":1.5}}]}"#,
        )
        .unwrap();
        assert!(payload.calls(QUOTE_DATA_FUNCTION));

        let data: QuoteData = serde_json::from_value(payload.p[1].clone()).unwrap();
        let update = data.into_update();
        assert_eq!(update.symbol, "AAPL");
        assert_eq!(update.status, "ok");
        assert_eq!(update.values.get("lp"), Some(&json!(1.5)));
    }

    #[test]
    fn quote_data_values_default_empty() {
        let data: QuoteData = serde_json::from_value(json!({"n": "BAD", "s": "error"})).unwrap();
        assert!(data.v.is_empty());
    }
}
