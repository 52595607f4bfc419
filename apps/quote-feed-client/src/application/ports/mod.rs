//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `Transport`: duplex text channel carrying framed feed messages

use tokio::sync::mpsc;

/// Event delivered by a transport to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The channel is open and can carry frames.
    Opened,
    /// Raw inbound text. May hold several concatenated frames.
    Message(String),
    /// The channel closed (peer close, I/O error, or failed open).
    Closed {
        /// Human-readable reason, when known.
        reason: Option<String>,
    },
}

/// Transport errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// No open channel to send on.
    #[error("transport is not open")]
    NotOpen,

    /// The endpoint could not be turned into a connection request.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// No async runtime is available to drive the connection.
    #[error("no async runtime available to drive the transport")]
    NoRuntime,

    /// The outbound queue rejected the frame.
    #[error("transport send failed: {0}")]
    Send(String),
}

/// Abstract duplex channel for the quote feed.
///
/// Implementations must deliver events for one `open` call strictly in
/// arrival order through the supplied channel, and must keep sends in call
/// order. `send` is fire-and-forget: it enqueues and returns without waiting
/// for any acknowledgment.
#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send + Sync {
    /// Begin opening the channel.
    ///
    /// Returns as soon as the attempt has started. `TransportEvent::Opened`
    /// arrives on `events` once the channel is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the attempt cannot be started at all.
    fn open(&self, events: mpsc::Sender<TransportEvent>) -> Result<(), TransportError>;

    /// Enqueue one outbound frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel is not open.
    fn send(&self, data: String) -> Result<(), TransportError>;

    /// Close the channel. Calling it on a closed channel does nothing.
    fn close(&self);
}
