//! WebSocket Transport
//!
//! [`Transport`] implementation over `tokio-tungstenite`. One spawned task per
//! connection drives both halves of the socket: outbound text queued by
//! `send()` and inbound messages forwarded as [`TransportEvent`]s.
//!
//! WebSocket-level pings are answered here; feed-level keepalives travel as
//! ordinary text and are handled by the session.

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::ORIGIN;
use tokio_tungstenite::tungstenite::{Message, handshake::client::Request};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{Transport, TransportError, TransportEvent};
use crate::infrastructure::config::{DEFAULT_FEED_ORIGIN, DEFAULT_FEED_URL, EndpointSettings};

/// Configuration for the WebSocket transport.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// WebSocket URL.
    pub url: String,
    /// `Origin` header value; omitted when `None`.
    pub origin: Option<String>,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_FEED_URL.to_string(),
            origin: Some(DEFAULT_FEED_ORIGIN.to_string()),
        }
    }
}

impl WebSocketConfig {
    /// Create a configuration for a URL without an `Origin` header.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            origin: None,
        }
    }

    /// Create configuration from endpoint settings.
    #[must_use]
    pub fn from_settings(settings: &EndpointSettings) -> Self {
        Self {
            url: settings.url.clone(),
            origin: Some(settings.origin.clone()),
        }
    }

    fn request(&self) -> Result<Request, TransportError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::InvalidEndpoint(format!("{}: {e}", self.url)))?;

        if let Some(origin) = &self.origin {
            let value = HeaderValue::from_str(origin)
                .map_err(|e| TransportError::InvalidEndpoint(format!("origin {origin}: {e}")))?;
            request.headers_mut().insert(ORIGIN, value);
        }

        Ok(request)
    }
}

/// Handles to the running connection task.
struct Link {
    outbound: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
}

/// WebSocket implementation of [`Transport`].
pub struct WebSocketTransport {
    config: WebSocketConfig,
    link: Mutex<Option<Link>>,
}

impl std::fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("config", &self.config)
            .field("open", &self.link.lock().is_some())
            .finish()
    }
}

impl WebSocketTransport {
    /// Create a transport. Nothing connects until `open()`.
    #[must_use]
    pub const fn new(config: WebSocketConfig) -> Self {
        Self {
            config,
            link: Mutex::new(None),
        }
    }
}

impl Transport for WebSocketTransport {
    fn open(&self, events: mpsc::Sender<TransportEvent>) -> Result<(), TransportError> {
        let request = self.config.request()?;
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| TransportError::NoRuntime)?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let previous = self.link.lock().replace(Link {
            outbound: outbound_tx,
            cancel: cancel.clone(),
        });
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }

        tracing::info!(url = %self.config.url, "connecting to quote feed");
        runtime.spawn(run_connection(request, outbound_rx, events, cancel));
        Ok(())
    }

    fn send(&self, data: String) -> Result<(), TransportError> {
        let link = self.link.lock();
        let link = link.as_ref().ok_or(TransportError::NotOpen)?;
        link.outbound
            .send(data)
            .map_err(|_| TransportError::Send("connection task has stopped".to_string()))
    }

    fn close(&self) {
        if let Some(link) = self.link.lock().take() {
            link.cancel.cancel();
            tracing::debug!("transport closed");
        }
    }
}

async fn run_connection(
    request: Request,
    mut outbound: mpsc::UnboundedReceiver<String>,
    events: mpsc::Sender<TransportEvent>,
    cancel: CancellationToken,
) {
    let connected = tokio::select! {
        () = cancel.cancelled() => return,
        result = tokio_tungstenite::connect_async(request) => result,
    };

    let ws_stream = match connected {
        Ok((ws_stream, _response)) => ws_stream,
        Err(e) => {
            tracing::warn!(error = %e, "WebSocket connection failed");
            let _ = events
                .send(TransportEvent::Closed {
                    reason: Some(e.to_string()),
                })
                .await;
            return;
        }
    };

    let (mut write, mut read) = ws_stream.split();
    if events.send(TransportEvent::Opened).await.is_err() {
        return;
    }

    let reason = loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                return;
            }
            data = outbound.recv() => {
                let Some(data) = data else {
                    let _ = write.send(Message::Close(None)).await;
                    return;
                };
                if let Err(e) = write.send(Message::Text(data.into())).await {
                    break Some(e.to_string());
                }
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if events.send(TransportEvent::Message(text.to_string())).await.is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        if let Ok(text) = String::from_utf8(data.to_vec()) {
                            if events.send(TransportEvent::Message(text)).await.is_err() {
                                return;
                            }
                        } else {
                            tracing::warn!(len = data.len(), "Received non-UTF8 binary message");
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            break Some(e.to_string());
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!("Server sent close frame");
                        break frame.map(|f| f.reason.as_str().to_string());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break Some(e.to_string()),
                    None => break Some("stream ended".to_string()),
                }
            }
        }
    };

    let _ = events.send(TransportEvent::Closed { reason }).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn send_before_open_is_rejected() {
        let transport = WebSocketTransport::new(WebSocketConfig::default());
        assert!(matches!(
            transport.send("x".to_string()),
            Err(TransportError::NotOpen)
        ));
    }

    #[test]
    fn close_without_open_is_noop() {
        let transport = WebSocketTransport::new(WebSocketConfig::default());
        transport.close();
        transport.close();
    }

    #[test]
    fn request_carries_origin() {
        let request = WebSocketConfig::default().request().unwrap();
        assert_eq!(
            request.headers().get(ORIGIN).unwrap(),
            DEFAULT_FEED_ORIGIN
        );
    }

    #[test]
    fn invalid_url_is_rejected() {
        let transport = WebSocketTransport::new(WebSocketConfig::new("not a url"));
        let (tx, _rx) = mpsc::channel(1);
        assert!(matches!(
            transport.open(tx),
            Err(TransportError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn open_outside_runtime_is_rejected() {
        let transport = WebSocketTransport::new(WebSocketConfig::new("ws://127.0.0.1:1"));
        let (tx, _rx) = mpsc::channel(1);
        assert!(matches!(transport.open(tx), Err(TransportError::NoRuntime)));
    }

    #[tokio::test]
    async fn loopback_exchange() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.send(Message::Text("~m~4~m~~h~1".into())).await.unwrap();
            let reply = ws.next().await.unwrap().unwrap();
            ws.close(None).await.unwrap();
            reply.into_text().unwrap().to_string()
        });

        let transport = WebSocketTransport::new(WebSocketConfig::new(format!("ws://{addr}")));
        let (tx, mut rx) = mpsc::channel(16);
        transport.open(tx).unwrap();

        assert_eq!(rx.recv().await, Some(TransportEvent::Opened));
        assert_eq!(
            rx.recv().await,
            Some(TransportEvent::Message("~m~4~m~~h~1".to_string()))
        );

        transport.send("~m~4~m~~h~1".to_string()).unwrap();
        assert_eq!(server.await.unwrap(), "~m~4~m~~h~1");
        assert!(matches!(rx.recv().await, Some(TransportEvent::Closed { .. })));

        transport.close();
    }
}
