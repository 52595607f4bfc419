//! Configuration Module
//!
//! Configuration loading for the quote feed client.

mod settings;

pub use settings::{
    ConfigError, DEFAULT_FEED_ORIGIN, DEFAULT_FEED_URL, DEFAULT_QUOTE_FIELDS, EndpointSettings,
    FeedConfig, QuoteFields, SessionSettings,
};
