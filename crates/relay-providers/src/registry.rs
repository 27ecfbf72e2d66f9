//! Registry of configured providers and the credentials they call with.

use crate::adapter::CallContext;
use crate::provider::Provider;
use dashmap::DashMap;
use relay_auth::CredentialKey;
use relay_core::{ProviderKind, RelayError};
use std::sync::Arc;
use tracing::info;

/// A provider together with its channel credential
#[derive(Debug)]
pub struct ProviderEntry {
    /// The provider
    pub provider: Provider,
    /// Credential used for calls through this entry
    pub credential: CredentialKey,
}

impl ProviderEntry {
    /// Create an entry
    pub fn new(provider: impl Into<Provider>, credential: impl Into<CredentialKey>) -> Self {
        Self {
            provider: provider.into(),
            credential: credential.into(),
        }
    }

    /// Call context for a request with `prompt_tokens` prompt tokens
    #[must_use]
    pub fn context(&self, prompt_tokens: u32) -> CallContext {
        CallContext {
            credential: self.credential.clone(),
            prompt_tokens,
        }
    }
}

/// Thread-safe provider lookup by id
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    providers: DashMap<String, Arc<ProviderEntry>>,
}

impl ProviderRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entry under its provider id
    ///
    /// # Errors
    /// `Configuration` if the id is already taken
    pub fn register(&self, entry: ProviderEntry) -> Result<(), RelayError> {
        let id = entry.provider.id().to_string();
        match self.providers.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(RelayError::configuration(format!(
                "Provider '{id}' is already registered"
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                info!(provider = %entry.provider.kind(), id = %id, "Registered provider");
                slot.insert(Arc::new(entry));
                Ok(())
            }
        }
    }

    /// Look up a provider by id
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<ProviderEntry>> {
        self.providers.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Remove a provider
    pub fn remove(&self, id: &str) -> Option<Arc<ProviderEntry>> {
        self.providers.remove(id).map(|(_, entry)| entry)
    }

    /// Registered ids, sorted
    #[must_use]
    pub fn provider_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Ids of providers of one vendor family, sorted
    #[must_use]
    pub fn ids_of_kind(&self, kind: ProviderKind) -> Vec<String> {
        let mut ids: Vec<String> = self
            .providers
            .iter()
            .filter(|e| e.value().provider.kind() == kind)
            .map(|e| e.key().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Number of registered providers
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palm::{PalmConfig, PalmProvider};
    use relay_core::{ReqwestTransport, TransportConfig};

    fn palm(id: &str) -> PalmProvider {
        let transport = ReqwestTransport::new(&TransportConfig::default()).expect("transport");
        PalmProvider::new(PalmConfig::new(id), Arc::new(transport))
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = ProviderRegistry::new();
        registry
            .register(ProviderEntry::new(palm("palm-b"), "key-b"))
            .expect("register");
        registry
            .register(ProviderEntry::new(palm("palm-a"), "key-a"))
            .expect("register");

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.provider_ids(), vec!["palm-a", "palm-b"]);
        assert_eq!(registry.ids_of_kind(ProviderKind::Palm).len(), 2);
        assert!(registry.ids_of_kind(ProviderKind::Baidu).is_empty());

        let entry = registry.get("palm-a").expect("entry");
        let ctx = entry.context(12);
        assert_eq!(ctx.credential.as_str(), "key-a");
        assert_eq!(ctx.prompt_tokens, 12);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let registry = ProviderRegistry::new();
        registry
            .register(ProviderEntry::new(palm("palm"), "k1"))
            .expect("register");

        let err = registry
            .register(ProviderEntry::new(palm("palm"), "k2"))
            .expect_err("duplicate");
        assert!(matches!(err, RelayError::Configuration { .. }));

        assert!(registry.remove("palm").is_some());
        assert!(registry.is_empty());
    }
}
