//! OAuth client-credentials issuer against a mock token endpoint.

use relay_auth::{CredentialIssuer, CredentialKey, OAuthIssuer};
use relay_core::{RelayError, ReqwestTransport, TransportConfig};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn issuer_for(server: &MockServer) -> OAuthIssuer {
    let transport = ReqwestTransport::new(&TransportConfig::default()).expect("transport");
    OAuthIssuer::new(Arc::new(transport)).with_base_url(server.uri())
}

#[tokio::test]
async fn test_issues_token_with_query_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/2.0/token"))
        .and(query_param("grant_type", "client_credentials"))
        .and(query_param("client_id", "my-client"))
        .and(query_param("client_secret", "my-secret"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "24.abc",
            "expires_in": 2_592_000
        })))
        .expect(1)
        .mount(&server)
        .await;

    let token = issuer_for(&server)
        .issue(&CredentialKey::new("my-client|my-secret"))
        .await
        .expect("token");

    assert_eq!(token.secret(), "24.abc");
    assert_eq!(
        token.expires_at() - token.issued_at(),
        chrono::Duration::seconds(2_592_000)
    );
}

#[tokio::test]
async fn test_vendor_error_is_issuance_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/2.0/token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_client",
            "error_description": "unknown client id"
        })))
        .mount(&server)
        .await;

    let err = issuer_for(&server)
        .issue(&CredentialKey::new("bad|secret"))
        .await
        .expect_err("must fail");

    assert!(matches!(err, RelayError::Issuance { .. }));
    assert!(err.is_retryable());
    assert!(err.to_string().contains("invalid_client: unknown client id"));
}

#[tokio::test]
async fn test_empty_access_token_is_issuance_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/2.0/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "",
            "expires_in": 100
        })))
        .mount(&server)
        .await;

    let err = issuer_for(&server)
        .issue(&CredentialKey::new("id|secret"))
        .await
        .expect_err("must fail");

    assert!(matches!(err, RelayError::Issuance { .. }));
}

#[tokio::test]
async fn test_malformed_credential_never_reaches_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = issuer_for(&server)
        .issue(&CredentialKey::new("only-one-part"))
        .await
        .expect_err("must fail");

    assert!(matches!(err, RelayError::MalformedCredential { .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_unreachable_endpoint_is_retryable() {
    let transport = ReqwestTransport::new(&TransportConfig::default()).expect("transport");
    let issuer = OAuthIssuer::new(Arc::new(transport)).with_base_url("http://127.0.0.1:9");

    let err = issuer
        .issue(&CredentialKey::new("id|secret"))
        .await
        .expect_err("must fail");

    assert!(matches!(err, RelayError::Issuance { .. }));
    assert!(err.is_retryable());
}
