//! Quote Session Client
//!
//! Owns one transport and one quote session on top of it: connection
//! lifecycle, authentication, quote-session creation, field configuration,
//! symbol subscriptions, and keepalive echo.
//!
//! # Handshake
//!
//! ```text
//! server ─► {"session_id": ...}
//! client ─► set_auth_token       [token]
//! client ─► quote_create_session [qs_xxxxxxxxxxxx]
//! client ─► quote_set_fields     [qs_xxxxxxxxxxxx, field, ...]
//! client ─► quote_add_symbols    [qs_xxxxxxxxxxxx, symbol, {flags}]   (queued symbols)
//! ```
//!
//! # Concurrency
//!
//! Inbound frames are handled by a single dispatch task per connection, in
//! arrival order. Session state sits behind one mutex shared with the public
//! methods, and every outbound frame is handed to the transport while that
//! mutex is held, so wire order always matches state order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::auth::AuthToken;
use super::codec::{Frame, FrameCodec, FramingError};
use super::messages::{AddSymbolFlags, ClientFunction, Payload, QUOTE_DATA_FUNCTION, QuoteData};
use crate::application::ports::{Transport, TransportError, TransportEvent};
use crate::domain::quote::{QuoteSessionId, QuoteUpdate, SessionState};
use crate::domain::subscription::SubscriptionSet;
use crate::infrastructure::config::{FeedConfig, QuoteFields};
use crate::infrastructure::metrics;

/// Default bound for each connect phase.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(3000);

/// Default capacity of the inbound transport event channel.
pub const DEFAULT_INBOUND_CAPACITY: usize = 1024;

// =============================================================================
// Error Type
// =============================================================================

/// Errors that can occur in the quote session client.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The transport did not open in time.
    #[error("transport did not open within {0:?}")]
    ConnectTimeout(Duration),

    /// The transport opened but no handshake arrived in time.
    #[error("no session handshake within {0:?}")]
    SessionTimeout(Duration),

    /// `connect()` was called on a session that is not disconnected.
    #[error("session is already connected")]
    AlreadyConnected,

    /// `disconnect()` was called while `connect()` was waiting.
    #[error("connect aborted by disconnect")]
    Disconnected,

    /// The transport closed before the session became ready.
    #[error("transport closed before the session was ready")]
    TransportClosed,

    /// The symbol is empty.
    #[error("invalid symbol: {0:?}")]
    InvalidSymbol(String),

    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Codec error.
    #[error("codec error: {0}")]
    Framing(#[from] FramingError),
}

impl SessionError {
    const fn reason(&self) -> &'static str {
        match self {
            Self::ConnectTimeout(_) => "connect_timeout",
            Self::SessionTimeout(_) => "session_timeout",
            Self::AlreadyConnected => "already_connected",
            Self::Disconnected => "disconnected",
            Self::TransportClosed => "transport_closed",
            Self::InvalidSymbol(_) => "invalid_symbol",
            Self::Transport(_) => "transport",
            Self::Framing(_) => "framing",
        }
    }
}

// =============================================================================
// Session Events
// =============================================================================

/// Events emitted by the quote session client, in frame arrival order.
#[derive(Debug, Clone)]
pub enum QuoteEvent {
    /// Handshake complete; the quote session is live.
    Ready {
        /// The client-generated quote session.
        session_id: QuoteSessionId,
    },
    /// Quote update for a subscribed symbol.
    Quote(QuoteUpdate),
    /// A frame was dropped because it could not be decoded.
    Error(String),
    /// The peer closed the transport.
    Closed,
}

// =============================================================================
// Session Configuration
// =============================================================================

/// Configuration for the quote session client.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bound on waiting for the transport to open.
    pub connect_timeout: Duration,
    /// Bound on waiting for the handshake once open.
    pub session_timeout: Duration,
    /// Quote fields requested with `quote_set_fields`.
    pub fields: QuoteFields,
    /// Capacity of the inbound transport event channel.
    pub inbound_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_TIMEOUT,
            session_timeout: DEFAULT_TIMEOUT,
            fields: QuoteFields::default(),
            inbound_capacity: DEFAULT_INBOUND_CAPACITY,
        }
    }
}

impl SessionConfig {
    /// Create a configuration requesting the given fields.
    #[must_use]
    pub fn new(fields: QuoteFields) -> Self {
        Self {
            fields,
            ..Self::default()
        }
    }

    /// Use the same bound for both connect phases.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self.session_timeout = timeout;
        self
    }

    /// Create configuration from `FeedConfig`.
    #[must_use]
    pub fn from_feed_config(config: &FeedConfig) -> Self {
        Self {
            connect_timeout: config.session.connect_timeout,
            session_timeout: config.session.session_timeout,
            fields: config.fields.clone(),
            inbound_capacity: config.session.inbound_capacity,
        }
    }
}

// =============================================================================
// Session State
// =============================================================================

#[derive(Debug, Default)]
struct SessionInner {
    state: SessionState,
    auth_token: AuthToken,
    quote_session: Option<QuoteSessionId>,
    subscriptions: SubscriptionSet,
    /// Fired by the dispatch task on `TransportEvent::Opened`.
    open_waiter: Option<oneshot::Sender<()>>,
    /// Fired by the dispatch task once the quote session id is set.
    ready_waiter: Option<oneshot::Sender<()>>,
    /// Stops the dispatch task of the current connection.
    connection: Option<CancellationToken>,
    /// Bumped on every `connect()`; events from older connections are ignored.
    generation: u64,
    /// The transport was opened and not yet closed by this client. Stays set
    /// after a peer close.
    transport_attached: bool,
}

impl SessionInner {
    fn is_current(&self, generation: u64) -> bool {
        self.generation == generation && self.state != SessionState::Disconnected
    }

    /// The quote session, once the handshake has completed.
    fn active_session(&self) -> Option<QuoteSessionId> {
        self.state
            .is_ready()
            .then(|| self.quote_session.clone())
            .flatten()
    }

    fn release_waiters(&mut self) {
        self.open_waiter = None;
        self.ready_waiter = None;
    }

    /// Tear down the connection but keep subscriptions.
    fn end_connection(&mut self) {
        self.state = SessionState::Disconnected;
        self.quote_session = None;
        self.release_waiters();
        if let Some(cancel) = self.connection.take() {
            cancel.cancel();
        }
    }
}

/// State shared between the client handle and its dispatch task.
struct SessionCore {
    transport: Arc<dyn Transport>,
    codec: FrameCodec,
    fields: QuoteFields,
    inner: Mutex<SessionInner>,
}

impl SessionCore {
    fn call(&self, function: ClientFunction, args: &[Value]) -> Result<(), SessionError> {
        let frame = self.codec.encode(function.as_str(), args)?;
        self.transport.send(frame)?;
        metrics::record_call_sent(function.as_str());
        tracing::trace!(function = function.as_str(), "call sent");
        Ok(())
    }

    fn add_symbol(&self, session_id: &QuoteSessionId, symbol: &str) -> Result<(), SessionError> {
        self.call(
            ClientFunction::QuoteAddSymbols,
            &[
                Value::from(session_id.as_str()),
                Value::from(symbol),
                AddSymbolFlags::default().to_value(),
            ],
        )
    }

    fn remove_symbol(
        &self,
        session_id: &QuoteSessionId,
        symbol: &str,
    ) -> Result<(), SessionError> {
        self.call(
            ClientFunction::QuoteRemoveSymbols,
            &[Value::from(session_id.as_str()), Value::from(symbol)],
        )
    }

    /// Tear down an unfinished connect attempt. Later generations are left alone.
    fn abort_connect(&self, generation: u64) {
        let close = {
            let mut inner = self.inner.lock();
            if inner.generation == generation && inner.state != SessionState::Disconnected {
                inner.end_connection();
                std::mem::take(&mut inner.transport_attached)
            } else {
                false
            }
        };
        if close {
            self.transport.close();
        }
    }

    fn on_open(&self, generation: u64) {
        let mut inner = self.inner.lock();
        if !inner.is_current(generation) {
            return;
        }
        if inner.state == SessionState::AwaitingTransportOpen {
            inner.state = SessionState::AwaitingHandshake;
        }
        if let Some(waiter) = inner.open_waiter.take() {
            let _ = waiter.send(());
        }
        tracing::debug!("transport open, awaiting handshake");
    }

    /// Returns `true` if the close belonged to the current connection.
    fn on_closed(&self, generation: u64, reason: Option<&str>) -> bool {
        let mut inner = self.inner.lock();
        if !inner.is_current(generation) {
            return false;
        }
        tracing::warn!(reason = reason.unwrap_or("unknown"), "transport closed by peer");
        // Dropping the token instead of cancelling it lets a pending
        // connect() tell a peer close apart from disconnect().
        inner.connection = None;
        inner.end_connection();
        true
    }

    fn on_message(&self, generation: u64, text: &str) -> Vec<QuoteEvent> {
        let mut emitted = Vec::new();
        let mut inner = self.inner.lock();
        if !inner.is_current(generation) {
            return emitted;
        }

        for decoded in self.codec.decode(text) {
            match decoded {
                Ok(frame) => {
                    if let Some(event) = self.on_frame(&mut inner, frame) {
                        emitted.push(event);
                    }
                }
                Err(e) => {
                    metrics::record_framing_error(e.kind());
                    tracing::warn!(
                        error = %e,
                        rest_skipped = e.is_boundary_lost(),
                        "dropping undecodable frame"
                    );
                    emitted.push(QuoteEvent::Error(e.to_string()));
                }
            }
        }

        emitted
    }

    fn on_frame(&self, inner: &mut SessionInner, frame: Frame) -> Option<QuoteEvent> {
        match frame {
            Frame::KeepAlive(token) => {
                metrics::record_frame_received(metrics::FrameKind::KeepAlive);
                self.echo_keepalive(&token);
                None
            }
            Frame::Data(payload) => {
                metrics::record_frame_received(metrics::FrameKind::Data);
                if payload.is_handshake() {
                    self.on_handshake(inner)
                } else if payload.calls(QUOTE_DATA_FUNCTION) {
                    Self::on_quote_data(inner, payload)
                } else {
                    tracing::trace!(function = ?payload.m, "ignoring frame");
                    None
                }
            }
        }
    }

    fn echo_keepalive(&self, token: &str) {
        let echo = self.codec.encode_keepalive_echo(token);
        match self.transport.send(echo) {
            Ok(()) => {
                metrics::record_keepalive_echo();
                tracing::trace!(token, "keepalive echoed");
            }
            Err(e) => tracing::warn!(error = %e, "failed to echo keepalive"),
        }
    }

    fn on_handshake(&self, inner: &mut SessionInner) -> Option<QuoteEvent> {
        if inner.quote_session.is_some() {
            tracing::warn!("ignoring repeated handshake on an active quote session");
            return None;
        }

        let session_id = QuoteSessionId::generate();
        if let Err(e) = self.setup_session(inner, &session_id) {
            inner.quote_session = None;
            tracing::error!(error = %e, "quote session setup failed");
            return Some(QuoteEvent::Error(e.to_string()));
        }

        inner.state = SessionState::Ready;
        if let Some(waiter) = inner.ready_waiter.take() {
            let _ = waiter.send(());
        }
        tracing::info!(
            session_id = %session_id,
            subscriptions = inner.subscriptions.len(),
            "quote session ready"
        );
        Some(QuoteEvent::Ready { session_id })
    }

    /// Auth, then session, then fields: the server rejects session calls
    /// until a token is recorded.
    fn setup_session(
        &self,
        inner: &mut SessionInner,
        session_id: &QuoteSessionId,
    ) -> Result<(), SessionError> {
        self.call(
            ClientFunction::SetAuthToken,
            &[Value::from(inner.auth_token.as_str())],
        )?;

        self.call(
            ClientFunction::QuoteCreateSession,
            &[Value::from(session_id.as_str())],
        )?;
        inner.quote_session = Some(session_id.clone());

        let mut args = Vec::with_capacity(self.fields.len() + 1);
        args.push(Value::from(session_id.as_str()));
        args.extend(self.fields.iter().map(|f| Value::from(f.as_str())));
        self.call(ClientFunction::QuoteSetFields, &args)?;

        for symbol in inner.subscriptions.iter() {
            self.add_symbol(session_id, symbol)?;
        }

        Ok(())
    }

    fn on_quote_data(inner: &SessionInner, payload: Payload) -> Option<QuoteEvent> {
        let active = inner.quote_session.as_ref()?;

        let mut args = payload.p.into_iter();
        let (Some(session), Some(body)) = (args.next(), args.next()) else {
            tracing::trace!("ignoring quote frame without data");
            return None;
        };

        if session.as_str() != Some(active.as_str()) {
            metrics::record_stale_quote();
            tracing::debug!(session = %session, active = %active, "dropping stale quote frame");
            return None;
        }

        match serde_json::from_value::<QuoteData>(body) {
            Ok(data) => {
                metrics::record_quote_update();
                Some(QuoteEvent::Quote(data.into_update()))
            }
            Err(e) => {
                let err = FramingError::InvalidQuoteData(e);
                metrics::record_framing_error(err.kind());
                tracing::warn!(error = %err, "dropping malformed quote frame");
                Some(QuoteEvent::Error(err.to_string()))
            }
        }
    }
}

/// Per-connection dispatch loop.
async fn dispatch(
    core: Arc<SessionCore>,
    generation: u64,
    mut inbound: mpsc::Receiver<TransportEvent>,
    cancel: CancellationToken,
    event_tx: mpsc::Sender<QuoteEvent>,
) {
    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => {
                tracing::debug!(generation, "dispatch cancelled");
                return;
            }
            event = inbound.recv() => event,
        };

        let (emitted, closed) = match event {
            Some(TransportEvent::Opened) => {
                core.on_open(generation);
                (Vec::new(), false)
            }
            Some(TransportEvent::Message(text)) => (core.on_message(generation, &text), false),
            Some(TransportEvent::Closed { reason }) => {
                let current = core.on_closed(generation, reason.as_deref());
                (if current { vec![QuoteEvent::Closed] } else { Vec::new() }, true)
            }
            None => {
                let current = core.on_closed(generation, Some("transport event channel ended"));
                (if current { vec![QuoteEvent::Closed] } else { Vec::new() }, true)
            }
        };

        for event in emitted {
            if event_tx.send(event).await.is_err() {
                tracing::debug!("event receiver dropped");
            }
        }

        if closed {
            return;
        }
    }
}

// =============================================================================
// Quote Feed Client
// =============================================================================

/// Quote session client over an abstract transport.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use quote_feed_client::infrastructure::feed::{
///     QuoteEvent, QuoteFeedClient, SessionConfig, WebSocketConfig, WebSocketTransport,
/// };
/// use tokio::sync::mpsc;
///
/// async fn example() -> Result<(), Box<dyn std::error::Error>> {
///     let transport = Arc::new(WebSocketTransport::new(WebSocketConfig::default()));
///     let (event_tx, mut event_rx) = mpsc::channel(1024);
///     let client = QuoteFeedClient::new(SessionConfig::default(), transport, event_tx);
///
///     client.connect().await?;
///     client.register_symbol("NASDAQ:AAPL")?;
///
///     while let Some(event) = event_rx.recv().await {
///         if let QuoteEvent::Quote(update) = event {
///             println!("{} {:?}", update.symbol, update.values);
///         }
///     }
///     Ok(())
/// }
/// ```
pub struct QuoteFeedClient {
    config: SessionConfig,
    core: Arc<SessionCore>,
    event_tx: mpsc::Sender<QuoteEvent>,
}

impl std::fmt::Debug for QuoteFeedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuoteFeedClient")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl QuoteFeedClient {
    /// Create a new client. Nothing is sent until `connect()`.
    #[must_use]
    pub fn new(
        config: SessionConfig,
        transport: Arc<dyn Transport>,
        event_tx: mpsc::Sender<QuoteEvent>,
    ) -> Self {
        let core = Arc::new(SessionCore {
            transport,
            codec: FrameCodec::new(),
            fields: config.fields.clone(),
            inner: Mutex::new(SessionInner::default()),
        });

        Self {
            config,
            core,
            event_tx,
        }
    }

    /// Open the transport and wait for a ready quote session.
    ///
    /// Resolves only once the handshake has completed, not merely when the
    /// transport opens. Each phase is bounded by its configured timeout; on
    /// failure the transport is closed and the session returns to
    /// `Disconnected` with its subscriptions intact.
    ///
    /// # Errors
    ///
    /// - [`SessionError::ConnectTimeout`] if the transport does not open in time
    /// - [`SessionError::SessionTimeout`] if no handshake arrives in time
    /// - [`SessionError::Disconnected`] if `disconnect()` interrupts the wait
    /// - [`SessionError::TransportClosed`] if the peer closes during the wait
    /// - [`SessionError::AlreadyConnected`] if the session is not disconnected
    pub async fn connect(&self) -> Result<(), SessionError> {
        let result = self.connect_inner().await;
        if let Err(e) = &result {
            metrics::record_connect_failure(e.reason());
            tracing::warn!(error = %e, "connect failed");
        }
        result
    }

    async fn connect_inner(&self) -> Result<(), SessionError> {
        let started = Instant::now();

        let (generation, cancel, open_rx, ready_rx) = {
            let mut inner = self.core.inner.lock();
            if inner.state != SessionState::Disconnected {
                return Err(SessionError::AlreadyConnected);
            }

            let (open_tx, open_rx) = oneshot::channel();
            let (ready_tx, ready_rx) = oneshot::channel();
            let cancel = CancellationToken::new();

            inner.generation = inner.generation.wrapping_add(1);
            inner.state = SessionState::AwaitingTransportOpen;
            inner.quote_session = None;
            inner.open_waiter = Some(open_tx);
            inner.ready_waiter = Some(ready_tx);
            inner.connection = Some(cancel.clone());
            inner.transport_attached = true;

            (inner.generation, cancel, open_rx, ready_rx)
        };

        // Aborts the attempt on every early return and when the caller drops
        // this future mid-wait.
        let mut guard = ConnectGuard {
            core: &self.core,
            generation,
            armed: true,
        };

        let (inbound_tx, inbound_rx) = mpsc::channel(self.config.inbound_capacity);
        tokio::spawn(dispatch(
            Arc::clone(&self.core),
            generation,
            inbound_rx,
            cancel.clone(),
            self.event_tx.clone(),
        ));

        tracing::info!(generation, "opening transport");
        self.core.transport.open(inbound_tx)?;

        match tokio::time::timeout(self.config.connect_timeout, open_rx).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => return Err(interrupted(&cancel)),
            Err(_) => return Err(SessionError::ConnectTimeout(self.config.connect_timeout)),
        }

        match tokio::time::timeout(self.config.session_timeout, ready_rx).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => return Err(interrupted(&cancel)),
            Err(_) => return Err(SessionError::SessionTimeout(self.config.session_timeout)),
        }

        guard.armed = false;
        metrics::record_handshake_duration(started.elapsed());
        Ok(())
    }

    /// Close the transport and forget the session and all subscriptions.
    ///
    /// Also clears subscriptions kept across a peer close or a failed
    /// connect. Does nothing when there is no transport to close and no
    /// subscription left. A pending `connect()` fails with
    /// [`SessionError::Disconnected`]. In-flight frames may be lost.
    pub fn disconnect(&self) {
        let close = {
            let mut inner = self.core.inner.lock();
            if !inner.transport_attached
                && inner.state == SessionState::Disconnected
                && inner.subscriptions.is_empty()
            {
                return;
            }
            inner.end_connection();
            inner.subscriptions.clear();
            std::mem::take(&mut inner.transport_attached)
        };

        if close {
            self.core.transport.close();
        }
        metrics::set_subscriptions(0);
        tracing::info!("disconnected");
    }

    /// Subscribe to a symbol.
    ///
    /// A symbol already subscribed triggers no call. Before the session is
    /// ready the symbol is queued and sent right after the handshake.
    ///
    /// # Errors
    ///
    /// Returns an error if the symbol is empty or the call cannot be sent.
    /// A failed send leaves the symbol unsubscribed.
    pub fn register_symbol(&self, symbol: impl Into<String>) -> Result<(), SessionError> {
        let symbol = validate_symbol(symbol.into())?;
        let mut inner = self.core.inner.lock();

        if !inner.subscriptions.insert(symbol.clone()) {
            tracing::trace!(symbol, "already subscribed");
            return Ok(());
        }

        if let Some(session_id) = inner.active_session() {
            if let Err(e) = self.core.add_symbol(&session_id, &symbol) {
                inner.subscriptions.remove(&symbol);
                return Err(e);
            }
            tracing::debug!(symbol, "symbol subscribed");
        } else {
            tracing::debug!(symbol, "symbol queued until the quote session is ready");
        }

        metrics::set_subscriptions(inner.subscriptions.len());
        Ok(())
    }

    /// Unsubscribe from a symbol.
    ///
    /// A symbol that is not subscribed triggers no call. Before the session is
    /// ready the symbol is only dropped from the queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the call cannot be sent. A failed send leaves the
    /// symbol subscribed.
    pub fn unregister_symbol(&self, symbol: &str) -> Result<(), SessionError> {
        let mut inner = self.core.inner.lock();

        if !inner.subscriptions.remove(symbol) {
            tracing::trace!(symbol, "not subscribed");
            return Ok(());
        }

        if let Some(session_id) = inner.active_session() {
            if let Err(e) = self.core.remove_symbol(&session_id, symbol) {
                inner.subscriptions.insert(symbol);
                return Err(e);
            }
            tracing::debug!(symbol, "symbol unsubscribed");
        }

        metrics::set_subscriptions(inner.subscriptions.len());
        Ok(())
    }

    /// Set the token sent during the next handshake.
    pub fn set_auth_token(&self, token: AuthToken) {
        let mut inner = self.core.inner.lock();
        if inner.state != SessionState::Disconnected {
            tracing::debug!(
                state = inner.state.as_str(),
                "auth token updated; takes effect on the next connect"
            );
        }
        inner.auth_token = token;
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.core.inner.lock().state
    }

    /// The active quote session, once the handshake has completed.
    #[must_use]
    pub fn quote_session_id(&self) -> Option<QuoteSessionId> {
        self.core.inner.lock().active_session()
    }

    /// Subscribed symbols in sorted order.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<String> {
        self.core.inner.lock().subscriptions.iter().cloned().collect()
    }

    /// Check whether a symbol is subscribed.
    #[must_use]
    pub fn is_subscribed(&self, symbol: &str) -> bool {
        self.core.inner.lock().subscriptions.contains(symbol)
    }
}

/// Aborts a connect attempt unless disarmed.
struct ConnectGuard<'a> {
    core: &'a SessionCore,
    generation: u64,
    armed: bool,
}

impl Drop for ConnectGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.core.abort_connect(self.generation);
        }
    }
}

/// A waiter was dropped before firing.
fn interrupted(cancel: &CancellationToken) -> SessionError {
    if cancel.is_cancelled() {
        SessionError::Disconnected
    } else {
        SessionError::TransportClosed
    }
}

fn validate_symbol(symbol: String) -> Result<String, SessionError> {
    let trimmed = symbol.trim();
    if trimmed.is_empty() {
        return Err(SessionError::InvalidSymbol(symbol));
    }
    if trimmed.len() == symbol.len() {
        Ok(symbol)
    } else {
        Ok(trimmed.to_string())
    }
}
