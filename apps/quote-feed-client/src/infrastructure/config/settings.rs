//! Quote Feed Configuration Settings
//!
//! Configuration types for the quote feed client, loaded from environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::infrastructure::feed::auth::{AuthError, AuthToken};

/// Default WebSocket endpoint of the quote feed.
pub const DEFAULT_FEED_URL: &str = "wss://data.tradingview.com/socket.io/websocket";

/// Default `Origin` header sent on the upgrade request.
pub const DEFAULT_FEED_ORIGIN: &str = "https://data.tradingview.com";

/// Every quote field the feed publishes.
pub const DEFAULT_QUOTE_FIELDS: &[&str] = &[
    "ch",
    "chp",
    "current_session",
    "description",
    "local_description",
    "language",
    "exchange",
    "fractional",
    "is_tradable",
    "lp",
    "lp_time",
    "minmov",
    "minmove2",
    "original_name",
    "pricescale",
    "pro_name",
    "short_name",
    "type",
    "update_mode",
    "volume",
    "currency_code",
    "ask",
    "bid",
    "fundamentals",
    "high_price",
    "low_price",
    "open_price",
    "prev_close_price",
    "rch",
    "rchp",
    "rtc",
    "rtc_time",
    "status",
    "basic_eps_net_income",
    "beta_1_year",
    "earnings_per_share_basic_ttm",
    "industry",
    "market_cap_basic",
    "price_earnings_ttm",
    "sector",
    "dividends_yield",
    "timezone",
];

/// Quote fields requested from the server, in request order without duplicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteFields(Vec<String>);

impl Default for QuoteFields {
    fn default() -> Self {
        Self::new(DEFAULT_QUOTE_FIELDS.iter().map(ToString::to_string))
    }
}

impl QuoteFields {
    /// Create a field list, dropping blanks and repeated names.
    #[must_use]
    pub fn new(fields: impl IntoIterator<Item = String>) -> Self {
        let mut unique: Vec<String> = Vec::new();
        for field in fields {
            let field = field.trim();
            if !field.is_empty() && !unique.iter().any(|f| f == field) {
                unique.push(field.to_string());
            }
        }
        Self(unique)
    }

    /// Parse a comma separated list.
    #[must_use]
    pub fn parse_list(list: &str) -> Self {
        Self::new(list.split(',').map(str::to_string))
    }

    /// Parse a field file: one field per line, `#` starts a comment.
    #[must_use]
    pub fn parse_lines(text: &str) -> Self {
        Self::new(
            text.lines()
                .map(|line| line.split('#').next().unwrap_or_default().to_string()),
        )
    }

    /// Load a field file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::FieldsFile {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse_lines(&text))
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if no fields are requested.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate fields in request order.
    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }
}

/// Feed endpoint settings.
#[derive(Debug, Clone)]
pub struct EndpointSettings {
    /// WebSocket URL.
    pub url: String,
    /// `Origin` header value.
    pub origin: String,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_FEED_URL.to_string(),
            origin: DEFAULT_FEED_ORIGIN.to_string(),
        }
    }
}

/// Session timing and buffering settings.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Bound on waiting for the transport to open.
    pub connect_timeout: Duration,
    /// Bound on waiting for the handshake once open.
    pub session_timeout: Duration,
    /// Capacity of the consumer event channel.
    pub event_capacity: usize,
    /// Capacity of the inbound transport event channel.
    pub inbound_capacity: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(3000),
            session_timeout: Duration::from_millis(3000),
            event_capacity: 10_000,
            inbound_capacity: 1_024,
        }
    }
}

/// Complete quote feed configuration.
#[derive(Debug, Clone, Default)]
pub struct FeedConfig {
    /// Endpoint settings.
    pub endpoint: EndpointSettings,
    /// Session settings.
    pub session: SessionSettings,
    /// Requested quote fields.
    pub fields: QuoteFields,
    /// Token sent during the handshake.
    pub auth_token: AuthToken,
    /// Symbols subscribed at startup.
    pub symbols: Vec<String>,
    /// Prometheus metrics port (0 = disabled).
    pub metrics_port: u16,
}

impl FeedConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a set variable is empty where a value is required,
    /// the auth token is blank, or the fields file cannot be read.
    pub fn from_env() -> Result<Self, ConfigError> {
        let endpoint = EndpointSettings {
            url: parse_env_string("QUOTE_FEED_URL", DEFAULT_FEED_URL)?,
            origin: parse_env_string("QUOTE_FEED_ORIGIN", DEFAULT_FEED_ORIGIN)?,
        };

        let session = SessionSettings {
            connect_timeout: parse_env_duration_millis(
                "QUOTE_FEED_CONNECT_TIMEOUT_MS",
                SessionSettings::default().connect_timeout,
            ),
            session_timeout: parse_env_duration_millis(
                "QUOTE_FEED_SESSION_TIMEOUT_MS",
                SessionSettings::default().session_timeout,
            ),
            event_capacity: parse_env_usize(
                "QUOTE_FEED_EVENT_CAPACITY",
                SessionSettings::default().event_capacity,
            )
            .max(1),
            inbound_capacity: SessionSettings::default().inbound_capacity,
        };

        let fields = if let Ok(path) = std::env::var("QUOTE_FEED_FIELDS_FILE") {
            QuoteFields::from_file(path)?
        } else if let Ok(list) = std::env::var("QUOTE_FEED_FIELDS") {
            QuoteFields::parse_list(&list)
        } else {
            QuoteFields::default()
        };
        if fields.is_empty() {
            return Err(ConfigError::EmptyValue("QUOTE_FEED_FIELDS".to_string()));
        }

        let symbols = std::env::var("QUOTE_FEED_SYMBOLS")
            .map(|list| parse_symbols(&list))
            .unwrap_or_default();

        Ok(Self {
            endpoint,
            session,
            fields,
            auth_token: AuthToken::from_env()?,
            symbols,
            metrics_port: parse_env_u16("QUOTE_FEED_METRICS_PORT", 0),
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Field list file could not be read.
    #[error("failed to read quote fields from {}: {source}", path.display())]
    FieldsFile {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Invalid auth token.
    #[error("invalid auth token: {0}")]
    Auth(#[from] AuthError),
}

fn parse_symbols(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn parse_env_string(key: &str, default: &str) -> Result<String, ConfigError> {
    match std::env::var(key) {
        Ok(value) if value.trim().is_empty() => Err(ConfigError::EmptyValue(key.to_string())),
        Ok(value) => Ok(value.trim().to_string()),
        Err(_) => Ok(default.to_string()),
    }
}

fn parse_env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
