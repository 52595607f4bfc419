//! Quote Feed Adapters
//!
//! Client for the `~m~` framed quote feed:
//!
//! - **codec**: Length-prefixed framing and keepalive probes
//! - **messages**: Call and payload wire types
//! - **auth**: Per-connection auth token
//! - **session**: Handshake, subscriptions, and quote dispatch
//! - **websocket**: `tokio-tungstenite` transport

pub mod auth;
pub mod codec;
pub mod messages;
pub mod session;
pub mod websocket;

pub use auth::{AuthError, AuthToken, UNAUTHORIZED_USER_TOKEN};
pub use codec::{Frame, FrameCodec, FramingError};
pub use messages::{AddSymbolFlags, Call, ClientFunction, Payload, QuoteData};
pub use session::{DEFAULT_TIMEOUT, QuoteEvent, QuoteFeedClient, SessionConfig, SessionError};
pub use websocket::{WebSocketConfig, WebSocketTransport};
