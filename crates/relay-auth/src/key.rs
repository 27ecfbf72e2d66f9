//! Credential identifiers.

use relay_core::RelayError;
use serde::{Deserialize, Serialize};

/// Opaque vendor credential identifier, e.g. `client_id|client_secret` or
/// `api_id.api_secret`. Equality is exact-string.
///
/// The raw value contains secret material, so `Debug` shows only a short
/// prefix.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialKey(String);

impl CredentialKey {
    /// Wrap a raw credential string
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The raw credential string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split into exactly two non-empty components around `separator`.
    ///
    /// # Errors
    /// Returns `MalformedCredential` for any other component count, or if
    /// either component is empty.
    pub fn split_pair(&self, separator: char) -> Result<(&str, &str), RelayError> {
        let mut parts = self.0.split(separator);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(id), Some(secret), None) if !id.is_empty() && !secret.is_empty() => {
                Ok((id, secret))
            }
            _ => Err(RelayError::malformed_credential(format!(
                "expected two components separated by '{separator}'"
            ))),
        }
    }

    /// Log-safe rendering: the first few characters followed by `***`
    #[must_use]
    pub fn redacted(&self) -> String {
        let prefix: String = self.0.chars().take(4).collect();
        format!("{prefix}***")
    }
}

impl std::fmt::Debug for CredentialKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CredentialKey").field(&self.redacted()).finish()
    }
}

impl From<&str> for CredentialKey {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for CredentialKey {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_pair() {
        let key = CredentialKey::new("client|secret");
        assert_eq!(key.split_pair('|').ok(), Some(("client", "secret")));
    }

    #[test]
    fn test_split_pair_rejects_wrong_count() {
        for raw in ["nosep", "a|b|c", "|secret", "id|", ""] {
            let key = CredentialKey::new(raw);
            assert!(
                matches!(key.split_pair('|'), Err(RelayError::MalformedCredential { .. })),
                "{raw:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_debug_redacts() {
        let key = CredentialKey::new("abcdefgh.topsecret");
        let debug = format!("{key:?}");
        assert!(!debug.contains("topsecret"));
        assert!(debug.contains("abcd***"));
    }
}
