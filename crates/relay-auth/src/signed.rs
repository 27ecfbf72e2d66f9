//! Self-signed time-limited token issuer (Zhipu).
//!
//! The credential key is `api_id.api_secret`. A compact JWS is built locally
//! with header `{"alg":"HS256","sign_type":"SIGN"}` and millisecond `exp` and
//! `timestamp` claims, then signed with HMAC-SHA256 keyed by the secret. No
//! network call is made.

use crate::clock::{Clock, SystemClock};
use crate::issuer::CredentialIssuer;
use crate::key::CredentialKey;
use crate::token::AccessToken;
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use relay_core::RelayError;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

/// Default validity of a signed token
pub const DEFAULT_SIGNED_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Serialize)]
struct Header {
    alg: &'static str,
    sign_type: &'static str,
}

/// Claims carried by a signed token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedClaims {
    /// API id half of the credential
    pub api_key: String,
    /// Expiry, Unix milliseconds
    pub exp: i64,
    /// Issue time, Unix milliseconds
    pub timestamp: i64,
}

/// Issues locally signed HS256 tokens
pub struct SignedTokenIssuer {
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl SignedTokenIssuer {
    /// Issuer with the default 24h validity
    pub fn new() -> Self {
        Self {
            ttl: DEFAULT_SIGNED_TTL,
            clock: Arc::new(SystemClock),
        }
    }

    /// Override token validity
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Override the clock
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Configured validity
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn sign(secret: &str, signing_input: &str) -> Result<String, RelayError> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
            .map_err(|e| RelayError::internal(format!("HMAC key rejected: {e}")))?;
        mac.update(signing_input.as_bytes());
        Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
    }
}

impl Default for SignedTokenIssuer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SignedTokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedTokenIssuer")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CredentialIssuer for SignedTokenIssuer {
    fn name(&self) -> &'static str {
        "signed"
    }

    async fn issue(&self, key: &CredentialKey) -> Result<AccessToken, RelayError> {
        let (api_id, secret) = key.split_pair('.')?;

        let ttl = chrono::Duration::from_std(self.ttl)
            .map_err(|e| RelayError::configuration(format!("Signed token TTL out of range: {e}")))?;
        let issued_at = self.clock.now();
        let expires_at = issued_at + ttl;

        let header = Header {
            alg: "HS256",
            sign_type: "SIGN",
        };
        let claims = SignedClaims {
            api_key: api_id.to_string(),
            exp: expires_at.timestamp_millis(),
            timestamp: issued_at.timestamp_millis(),
        };

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?)
        );
        let signature = Self::sign(secret, &signing_input)?;

        Ok(AccessToken::new(
            format!("{signing_input}.{signature}"),
            issued_at,
            expires_at,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn decode_segment(segment: &str) -> serde_json::Value {
        let bytes = URL_SAFE_NO_PAD.decode(segment).expect("base64url");
        serde_json::from_slice(&bytes).expect("json")
    }

    #[tokio::test]
    async fn test_signature_verifies() {
        let start = chrono::Utc
            .timestamp_millis_opt(1_700_000_000_123)
            .single()
            .expect("valid");
        let issuer = SignedTokenIssuer::new().with_clock(Arc::new(ManualClock::new(start)));

        let token = issuer
            .issue(&CredentialKey::new("my-id.my-secret"))
            .await
            .expect("signed");

        let parts: Vec<&str> = token.secret().split('.').collect();
        assert_eq!(parts.len(), 3);

        let header = decode_segment(parts[0]);
        assert_eq!(header["alg"], "HS256");
        assert_eq!(header["sign_type"], "SIGN");

        let claims: SignedClaims =
            serde_json::from_value(decode_segment(parts[1])).expect("claims");
        assert_eq!(claims.api_key, "my-id");
        assert_eq!(claims.timestamp, 1_700_000_000_123);
        assert_eq!(claims.exp - claims.timestamp, 24 * 60 * 60 * 1000);

        let mut mac = <HmacSha256 as Mac>::new_from_slice(b"my-secret").expect("key");
        mac.update(format!("{}.{}", parts[0], parts[1]).as_bytes());
        let expected = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        assert_eq!(parts[2], expected);

        assert_eq!(token.issued_at(), start);
        assert_eq!(token.expires_at() - start, chrono::Duration::hours(24));
    }

    #[tokio::test]
    async fn test_custom_ttl() {
        let issuer = SignedTokenIssuer::new().with_ttl(Duration::from_secs(60));
        let token = issuer
            .issue(&CredentialKey::new("id.secret"))
            .await
            .expect("signed");

        assert_eq!(
            token.expires_at() - token.issued_at(),
            chrono::Duration::seconds(60)
        );
    }

    #[tokio::test]
    async fn test_malformed_key() {
        let issuer = SignedTokenIssuer::new();
        for raw in ["no-separator", "a.b.c"] {
            let result = issuer.issue(&CredentialKey::new(raw)).await;
            assert!(matches!(result, Err(RelayError::MalformedCredential { .. })));
        }
    }
}
