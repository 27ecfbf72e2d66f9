//! OAuth2 client-credentials issuer (Baidu `/oauth/2.0/token`).

use crate::clock::{Clock, SystemClock};
use crate::issuer::CredentialIssuer;
use crate::key::CredentialKey;
use crate::token::AccessToken;
use async_trait::async_trait;
use http::Method;
use relay_core::{HttpTransport, RelayError, TransportRequest};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// Default token endpoint host
pub const DEFAULT_OAUTH_BASE_URL: &str = "https://aip.baidubce.com";

/// Path of the token endpoint below the base URL
const TOKEN_PATH: &str = "/oauth/2.0/token";

/// Token endpoint response
#[derive(Debug, Default, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    expires_in: i64,
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: String,
}

/// Issues tokens with the client-credentials grant.
///
/// The credential key is `client_id|client_secret`; both values are sent as
/// query parameters.
pub struct OAuthIssuer {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    method: Method,
    clock: Arc<dyn Clock>,
}

impl OAuthIssuer {
    /// Issuer against [`DEFAULT_OAUTH_BASE_URL`]
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            base_url: DEFAULT_OAUTH_BASE_URL.to_string(),
            method: Method::POST,
            clock: Arc::new(SystemClock),
        }
    }

    /// Override the endpoint base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the HTTP method (POST by default)
    #[must_use]
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Override the clock
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn token_url(&self, client_id: &str, client_secret: &str) -> Result<String, RelayError> {
        let base = self.base_url.trim_end_matches('/');
        let mut url = Url::parse(&format!("{base}{TOKEN_PATH}"))
            .map_err(|e| RelayError::configuration(format!("Invalid OAuth base URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("grant_type", "client_credentials")
            .append_pair("client_id", client_id)
            .append_pair("client_secret", client_secret);
        Ok(url.into())
    }
}

impl std::fmt::Debug for OAuthIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthIssuer")
            .field("base_url", &self.base_url)
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CredentialIssuer for OAuthIssuer {
    fn name(&self) -> &'static str {
        "oauth"
    }

    async fn issue(&self, key: &CredentialKey) -> Result<AccessToken, RelayError> {
        let (client_id, client_secret) = key.split_pair('|')?;
        let url = self.token_url(client_id, client_secret)?;

        let request = TransportRequest::new(self.method.clone(), url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json");

        debug!(credential = %key.redacted(), "Requesting OAuth access token");

        let response = self
            .transport
            .execute(request)
            .await
            .map_err(|e| RelayError::issuance(format!("token request failed: {e}")))?;
        let status = response.status;
        let body = response
            .bytes()
            .await
            .map_err(|e| RelayError::issuance(format!("token response unreadable: {e}")))?;

        let parsed: TokenResponse = serde_json::from_slice(&body).map_err(|e| {
            warn!(status, error = %e, "Undecodable token response");
            RelayError::issuance(format!("token response undecodable (HTTP {status}): {e}"))
        })?;

        if !parsed.error.is_empty() {
            return Err(RelayError::issuance(format!(
                "{}: {}",
                parsed.error, parsed.error_description
            )));
        }
        if parsed.access_token.is_empty() {
            return Err(RelayError::issuance("empty access token in token response"));
        }

        let issued_at = self.clock.now();
        Ok(AccessToken::with_ttl(
            parsed.access_token,
            issued_at,
            chrono::Duration::seconds(parsed.expires_in.max(0)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use relay_core::TransportResponse;

    #[derive(Default)]
    struct RecordingTransport {
        seen: Mutex<Vec<TransportRequest>>,
        body: String,
    }

    #[async_trait]
    impl HttpTransport for RecordingTransport {
        async fn execute(
            &self,
            request: TransportRequest,
        ) -> Result<TransportResponse, RelayError> {
            self.seen.lock().push(request);
            Ok(TransportResponse::from_bytes(200, self.body.clone()))
        }
    }

    #[tokio::test]
    async fn test_malformed_key_makes_no_call() {
        let transport = Arc::new(RecordingTransport::default());
        let issuer = OAuthIssuer::new(transport.clone());

        let result = issuer.issue(&CredentialKey::new("a|b|c")).await;

        assert!(matches!(result, Err(RelayError::MalformedCredential { .. })));
        assert!(transport.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_query_encoding_and_method() {
        let transport = Arc::new(RecordingTransport {
            body: r#"{"access_token":"tok","expires_in":60}"#.to_string(),
            ..Default::default()
        });
        let issuer = OAuthIssuer::new(transport.clone())
            .with_base_url("http://localhost:1/")
            .with_method(Method::GET);

        let token = issuer
            .issue(&CredentialKey::new("id 1|s&cret"))
            .await
            .expect("issued");

        assert_eq!(token.secret(), "tok");
        assert_eq!(token.expires_at() - token.issued_at(), chrono::Duration::seconds(60));

        let seen = transport.seen.lock();
        assert_eq!(seen[0].method, Method::GET);
        assert_eq!(
            seen[0].url,
            "http://localhost:1/oauth/2.0/token?grant_type=client_credentials&client_id=id+1&client_secret=s%26cret"
        );
        assert_eq!(seen[0].header_value("accept"), Some("application/json"));
    }
}
