//! Credential store with proactive background renewal.
//!
//! Tokens are cached per [`CredentialKey`]. A token expiring within the
//! lookahead window is still handed out, but a refresh is queued to the
//! store's worker task which replaces the entry once the issuer succeeds.
//! Readers never wait on a background refresh.

use crate::clock::{Clock, SystemClock};
use crate::issuer::CredentialIssuer;
use crate::key::CredentialKey;
use crate::token::AccessToken;
use dashmap::DashMap;
use relay_core::RelayError;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Default refresh lookahead
pub const DEFAULT_LOOKAHEAD: Duration = Duration::from_secs(60 * 60);

/// Store tuning
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Tokens expiring within this window trigger a background refresh
    pub lookahead: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lookahead: DEFAULT_LOOKAHEAD,
        }
    }
}

struct StoreInner {
    tokens: DashMap<CredentialKey, AccessToken>,
    issuer: Arc<dyn CredentialIssuer>,
    clock: Arc<dyn Clock>,
    lookahead: chrono::Duration,
}

/// Cache of vendor access tokens.
///
/// Cloning is cheap and clones share the cache and refresh worker. The worker
/// stops once every clone has been dropped and in-flight refreshes finish.
///
/// Concurrent first-time issuance for the same key is not de-duplicated; the
/// last result to land wins.
#[derive(Clone)]
pub struct CredentialStore {
    inner: Arc<StoreInner>,
    refresh_tx: mpsc::UnboundedSender<CredentialKey>,
}

impl CredentialStore {
    /// Create a store backed by `issuer` with default settings.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(issuer: Arc<dyn CredentialIssuer>) -> Self {
        Self::with_config(issuer, StoreConfig::default(), Arc::new(SystemClock))
    }

    /// Create a store with explicit settings and clock.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn with_config(
        issuer: Arc<dyn CredentialIssuer>,
        config: StoreConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let lookahead = match chrono::Duration::from_std(config.lookahead) {
            Ok(lookahead) => lookahead,
            Err(e) => {
                warn!(
                    requested = ?config.lookahead,
                    error = %e,
                    "Refresh lookahead out of range, using the default"
                );
                fallback_lookahead()
            }
        };
        let inner = Arc::new(StoreInner {
            tokens: DashMap::new(),
            issuer,
            clock,
            lookahead,
        });

        let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_refresh_worker(Arc::clone(&inner), refresh_rx));

        Self { inner, refresh_tx }
    }

    /// Return a valid token for `key`.
    ///
    /// A cached, unexpired token is returned without waiting; if it expires
    /// within the lookahead window a background refresh is queued as well.
    /// Without a usable entry the issuer is called and awaited.
    ///
    /// # Errors
    /// Propagates issuer errors. No entry is created on failure, and an
    /// expired entry is left untouched.
    pub async fn get_token(&self, key: &CredentialKey) -> Result<AccessToken, RelayError> {
        let now = self.inner.clock.now();
        let cached = self.inner.tokens.get(key).map(|entry| entry.value().clone());

        if let Some(token) = cached {
            if !token.is_expired(now) {
                if token.expires_within(now, self.inner.lookahead) {
                    self.request_refresh(key);
                }
                return Ok(token);
            }
            debug!(credential = %key.redacted(), "Cached token expired");
        }

        let token = self.inner.issuer.issue(key).await.map_err(|e| {
            warn!(
                issuer = self.inner.issuer.name(),
                credential = %key.redacted(),
                error = %e,
                "Token issuance failed"
            );
            e
        })?;

        debug!(
            issuer = self.inner.issuer.name(),
            credential = %key.redacted(),
            expires_at = %token.expires_at(),
            "Issued token"
        );
        self.inner.tokens.insert(key.clone(), token.clone());
        Ok(token)
    }

    /// Effective refresh lookahead
    #[must_use]
    pub fn lookahead(&self) -> Duration {
        self.inner.lookahead.to_std().unwrap_or(DEFAULT_LOOKAHEAD)
    }

    /// Queue a background refresh for `key`
    pub fn request_refresh(&self, key: &CredentialKey) {
        if self.refresh_tx.send(key.clone()).is_err() {
            error!(credential = %key.redacted(), "Refresh worker has stopped");
        }
    }

    /// Seed or replace the cached token for `key`
    pub fn insert(&self, key: CredentialKey, token: AccessToken) {
        self.inner.tokens.insert(key, token);
    }

    /// Currently cached token for `key`, valid or not
    #[must_use]
    pub fn cached(&self, key: &CredentialKey) -> Option<AccessToken> {
        self.inner.tokens.get(key).map(|entry| entry.value().clone())
    }

    /// Number of cached entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.tokens.len()
    }

    /// Whether nothing is cached
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.tokens.is_empty()
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("issuer", &self.inner.issuer.name())
            .field("entries", &self.inner.tokens.len())
            .field("lookahead", &self.inner.lookahead)
            .finish()
    }
}

fn fallback_lookahead() -> chrono::Duration {
    chrono::Duration::from_std(DEFAULT_LOOKAHEAD).unwrap_or_else(|_| chrono::Duration::hours(1))
}

type RefreshOutcome = (CredentialKey, Result<AccessToken, RelayError>);

async fn run_refresh_worker(
    inner: Arc<StoreInner>,
    mut requests: mpsc::UnboundedReceiver<CredentialKey>,
) {
    let mut in_flight: HashSet<CredentialKey> = HashSet::new();
    let mut tasks: JoinSet<RefreshOutcome> = JoinSet::new();

    loop {
        tokio::select! {
            request = requests.recv() => {
                let Some(key) = request else { break };
                if !in_flight.insert(key.clone()) {
                    continue;
                }
                let issuer = Arc::clone(&inner.issuer);
                tasks.spawn(refresh_one(issuer, key));
            }
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                apply_refresh(&inner, &mut in_flight, joined);
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        apply_refresh(&inner, &mut in_flight, joined);
    }
    info!("Credential refresh worker stopped");
}

/// Runs one issuance in its own task so a panicking issuer still reports
/// which key it was refreshing.
async fn refresh_one(issuer: Arc<dyn CredentialIssuer>, key: CredentialKey) -> RefreshOutcome {
    let task_key = key.clone();
    let result = match tokio::spawn(async move { issuer.issue(&task_key).await }).await {
        Ok(result) => result,
        Err(e) => Err(RelayError::internal(format!("refresh task failed: {e}"))),
    };
    (key, result)
}

fn apply_refresh(
    inner: &StoreInner,
    in_flight: &mut HashSet<CredentialKey>,
    joined: Result<RefreshOutcome, tokio::task::JoinError>,
) {
    let (key, result) = match joined {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(error = %e, "Refresh task aborted");
            return;
        }
    };
    in_flight.remove(&key);

    match result {
        Ok(token) => {
            debug!(
                credential = %key.redacted(),
                expires_at = %token.expires_at(),
                "Background refresh replaced token"
            );
            inner.tokens.insert(key, token);
        }
        Err(e) => {
            warn!(credential = %key.redacted(), error = %e, "Background refresh failed");
        }
    }
}
