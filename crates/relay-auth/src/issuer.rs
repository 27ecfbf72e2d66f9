//! Credential issuer seam.

use crate::key::CredentialKey;
use crate::token::AccessToken;
use async_trait::async_trait;
use relay_core::RelayError;

/// Exchanges a vendor credential for a fresh access token
#[async_trait]
pub trait CredentialIssuer: Send + Sync {
    /// Short issuer name for logs
    fn name(&self) -> &'static str;

    /// Issue a new token for `key`.
    ///
    /// # Errors
    /// `MalformedCredential` if the key cannot be split into its components
    /// (permanent), `Issuance` for transport or vendor-reported failures.
    async fn issue(&self, key: &CredentialKey) -> Result<AccessToken, RelayError>;
}
