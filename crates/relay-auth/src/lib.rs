//! # Relay Auth
//!
//! Vendor credential lifecycle for the LLM relay.
//!
//! - [`CredentialStore`]: per-credential token cache with background renewal
//! - [`OAuthIssuer`]: OAuth2 client-credentials exchange
//! - [`SignedTokenIssuer`]: locally signed HS256 tokens
//! - [`Clock`]: injectable time source

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod clock;
pub mod issuer;
pub mod key;
pub mod oauth;
pub mod signed;
pub mod store;
pub mod token;

pub use clock::{Clock, ManualClock, SystemClock};
pub use issuer::CredentialIssuer;
pub use key::CredentialKey;
pub use oauth::{OAuthIssuer, DEFAULT_OAUTH_BASE_URL};
pub use signed::{SignedClaims, SignedTokenIssuer, DEFAULT_SIGNED_TTL};
pub use store::{CredentialStore, StoreConfig, DEFAULT_LOOKAHEAD};
pub use token::AccessToken;
