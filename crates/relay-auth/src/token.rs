//! Issued access tokens.

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};

/// A time-bounded vendor access token.
///
/// Immutable once issued; a refresh produces a new value.
#[derive(Clone)]
pub struct AccessToken {
    token: SecretString,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Create a token valid from `issued_at` until `expires_at`
    pub fn new(token: impl Into<String>, issued_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: SecretString::new(token.into()),
            issued_at,
            expires_at,
        }
    }

    /// Create a token valid for `ttl` from `issued_at`
    pub fn with_ttl(token: impl Into<String>, issued_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self::new(token, issued_at, issued_at + ttl)
    }

    /// The bearer value
    #[must_use]
    pub fn secret(&self) -> &str {
        self.token.expose_secret()
    }

    /// When the token was issued
    #[must_use]
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// When the token stops being valid
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Whether the token is expired at `now`
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Whether the token expires within `window` of `now`
    #[must_use]
    pub fn expires_within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.expires_at - now <= window
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"[REDACTED]")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
