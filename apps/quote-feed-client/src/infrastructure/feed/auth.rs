//! Quote Feed Authentication
//!
//! The feed authenticates per connection with a single `set_auth_token`
//! call, sent as the first reaction to the server handshake. Anonymous
//! sessions send a fixed sentinel token and receive delayed data.
//!
//! # Authentication Flow
//!
//! 1. Connect to the WebSocket endpoint
//! 2. Receive the handshake frame (`{"session_id": ...}`)
//! 3. Send `{"m":"set_auth_token","p":["<token>"]}`
//! 4. Create the quote session and configure fields
//!
//! The token is read once per handshake, so it must be set before
//! `connect()` to take effect.

use thiserror::Error;

/// Token sent by sessions without a user login.
pub const UNAUTHORIZED_USER_TOKEN: &str = "unauthorized_user_token";

/// Environment variable holding the user token.
pub const AUTH_TOKEN_ENV: &str = "QUOTE_FEED_AUTH_TOKEN";

/// Errors that can occur while building an auth token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The token was empty or whitespace.
    #[error("auth token cannot be empty")]
    Empty,
}

/// User auth token for the quote feed.
///
/// The `Debug` implementation redacts user tokens for safe logging.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl Default for AuthToken {
    fn default() -> Self {
        Self::anonymous()
    }
}

impl AuthToken {
    /// Create a user token.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is empty.
    pub fn new(token: impl Into<String>) -> Result<Self, AuthError> {
        let token = token.into();
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(AuthError::Empty);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The unauthenticated sentinel token.
    #[must_use]
    pub fn anonymous() -> Self {
        Self(UNAUTHORIZED_USER_TOKEN.to_string())
    }

    /// Read the token from `QUOTE_FEED_AUTH_TOKEN`.
    ///
    /// Falls back to the anonymous token when the variable is not set.
    ///
    /// # Errors
    ///
    /// Returns an error if the variable is set but empty.
    pub fn from_env() -> Result<Self, AuthError> {
        std::env::var(AUTH_TOKEN_ENV).map_or_else(|_| Ok(Self::anonymous()), Self::new)
    }

    /// Check if this is the unauthenticated sentinel.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.0 == UNAUTHORIZED_USER_TOKEN
    }

    /// Get the token text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_anonymous() {
            f.debug_tuple("AuthToken").field(&self.0).finish()
        } else {
            f.debug_tuple("AuthToken").field(&"[REDACTED]").finish()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_anonymous() {
        let token = AuthToken::default();
        assert!(token.is_anonymous());
        assert_eq!(token.as_str(), UNAUTHORIZED_USER_TOKEN);
    }

    #[test]
    fn new_rejects_empty() {
        assert_eq!(AuthToken::new(""), Err(AuthError::Empty));
        assert_eq!(AuthToken::new("   "), Err(AuthError::Empty));
    }

    #[test]
    fn new_trims_whitespace() {
        let token = AuthToken::new(" abc.def \n").unwrap();
        assert_eq!(token.as_str(), "abc.def");
        assert!(!token.is_anonymous());
    }

    #[test]
    fn debug_redacts_user_token() {
        let token = AuthToken::new("secret-jwt").unwrap();
        let debug = format!("{token:?}");
        assert!(!debug.contains("secret-jwt"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn debug_shows_sentinel() {
        let debug = format!("{:?}", AuthToken::anonymous());
        assert!(debug.contains(UNAUTHORIZED_USER_TOKEN));
    }
}
