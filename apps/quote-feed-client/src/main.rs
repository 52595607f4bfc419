//! Quote Feed Client Binary
//!
//! Connects to the quote feed, subscribes the configured symbols, and logs
//! every quote update until shutdown.
//!
//! # Usage
//!
//! ```bash
//! QUOTE_FEED_SYMBOLS=NASDAQ:AAPL,BINANCE:BTCUSDT cargo run --bin quote-feed-client
//! ```
//!
//! # Environment Variables
//!
//! - `QUOTE_FEED_SYMBOLS`: Comma separated symbols to subscribe
//! - `QUOTE_FEED_URL`: WebSocket URL (default: `wss://data.tradingview.com/socket.io/websocket`)
//! - `QUOTE_FEED_ORIGIN`: `Origin` header (default: <https://data.tradingview.com>)
//! - `QUOTE_FEED_AUTH_TOKEN`: User token (default: anonymous)
//! - `QUOTE_FEED_CONNECT_TIMEOUT_MS`: Transport open timeout (default: 3000)
//! - `QUOTE_FEED_SESSION_TIMEOUT_MS`: Handshake timeout (default: 3000)
//! - `QUOTE_FEED_EVENT_CAPACITY`: Event channel capacity (default: 10000)
//! - `QUOTE_FEED_FIELDS` / `QUOTE_FEED_FIELDS_FILE`: Requested quote fields
//! - `QUOTE_FEED_METRICS_PORT`: Prometheus metrics port (default: 0, disabled)
//! - `OTEL_ENABLED`: Export spans via OTLP (default: false)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use anyhow::Context;
use quote_feed_client::infrastructure::telemetry;
use quote_feed_client::{
    FeedConfig, QuoteEvent, QuoteFeedClient, QuoteUpdate, SessionConfig, WebSocketConfig,
    WebSocketTransport, init_metrics,
};
use tokio::signal;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("failed to install rustls crypto provider");
    }

    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Quote Feed Client");

    let config = FeedConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    if config.metrics_port != 0 {
        init_metrics(config.metrics_port).context("failed to start metrics exporter")?;
        tracing::info!(port = config.metrics_port, "Prometheus metrics exporter started");
    }

    let transport = Arc::new(WebSocketTransport::new(WebSocketConfig::from_settings(
        &config.endpoint,
    )));
    let (event_tx, mut event_rx) = mpsc::channel(config.session.event_capacity);
    let client = QuoteFeedClient::new(SessionConfig::from_feed_config(&config), transport, event_tx);

    client.set_auth_token(config.auth_token.clone());
    client.connect().await.context("failed to connect to quote feed")?;

    for symbol in &config.symbols {
        if let Err(e) = client.register_symbol(symbol.as_str()) {
            tracing::error!(symbol, error = %e, "Failed to subscribe");
        }
    }

    let shutdown = await_shutdown();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => break,
            event = event_rx.recv() => {
                match event {
                    Some(QuoteEvent::Ready { session_id }) => {
                        tracing::info!(%session_id, "Quote session ready");
                    }
                    Some(QuoteEvent::Quote(update)) => log_quote(&update),
                    Some(QuoteEvent::Error(msg)) => {
                        tracing::warn!(error = %msg, "Dropped frame");
                    }
                    Some(QuoteEvent::Closed) => {
                        tracing::warn!("Quote feed closed the connection");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    client.disconnect();
    tracing::info!("Quote Feed Client stopped");
    Ok(())
}

fn log_quote(update: &QuoteUpdate) {
    if !update.is_ok() {
        tracing::warn!(symbol = %update.symbol, status = %update.status, "Symbol not available");
        return;
    }

    match update.decimal("lp") {
        Some(last) => tracing::info!(symbol = %update.symbol, %last, "Quote"),
        None => tracing::debug!(
            symbol = %update.symbol,
            fields = update.values.len(),
            "Quote update"
        ),
    }
}

/// Log the parsed configuration.
fn log_config(config: &FeedConfig) {
    tracing::info!(
        url = %config.endpoint.url,
        symbols = config.symbols.len(),
        fields = config.fields.len(),
        anonymous = config.auth_token.is_anonymous(),
        metrics_port = config.metrics_port,
        "Configuration loaded"
    );
    tracing::debug!(
        connect_timeout_ms = config.session.connect_timeout.as_millis(),
        session_timeout_ms = config.session.session_timeout.as_millis(),
        "Session timeouts"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
