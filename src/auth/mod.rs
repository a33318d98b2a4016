//! Session credential handling
//!
//! The backend issues a bearer access token plus an optional refresh token
//! at login. Both are kept behind the [`token_store::TokenStore`] trait so
//! the REST client and the chat connection read credentials from an
//! injected store instead of ambient global state.

pub mod token_store;

pub use token_store::{AuthTokens, KeyringTokenStore, MemoryTokenStore, TokenStore};

use std::sync::Arc;

use crate::config::{AuthConfig, TokenStoreKind};

/// Build the token store selected by configuration.
///
/// # Examples
///
/// ```
/// use astrochat::auth::build_token_store;
/// use astrochat::config::{AuthConfig, TokenStoreKind};
///
/// let config = AuthConfig {
///     token_store: TokenStoreKind::Memory,
///     ..AuthConfig::default()
/// };
/// let store = build_token_store(&config);
/// assert!(store.load().unwrap().is_none());
/// ```
pub fn build_token_store(config: &AuthConfig) -> Arc<dyn TokenStore> {
    match config.token_store {
        TokenStoreKind::Keyring => Arc::new(KeyringTokenStore::new(&config.keyring_service)),
        TokenStoreKind::Memory => Arc::new(MemoryTokenStore::new()),
    }
}
