//! Session token persistence
//!
//! [`AuthTokens`] is the access/refresh pair returned by the backend's login
//! and refresh endpoints. [`TokenStore`] is the get/set/clear seam both the
//! REST client and the chat session depend on.
//!
//! Two stores are provided:
//!
//! - [`KeyringTokenStore`] -- the OS native credential store (Keychain on
//!   macOS, Secret Service on Linux, Windows Credential Manager on Windows).
//!   Tokens are serialized to JSON before storage.
//! - [`MemoryTokenStore`] -- process memory, for tests and throwaway
//!   sessions.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AstroChatError, Result};

// ---------------------------------------------------------------------------
// AuthTokens
// ---------------------------------------------------------------------------

/// Bearer credentials for the backend.
///
/// # Examples
///
/// ```
/// use astrochat::auth::AuthTokens;
///
/// let tokens = AuthTokens::new("access");
/// // A token with no expiry is never considered expired.
/// assert!(!tokens.is_expired());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTokens {
    /// The bearer token sent on REST calls and the chat handshake.
    pub access_token: String,

    /// Token exchanged for a fresh access token after a `401`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// UTC timestamp at which the access token expires.
    ///
    /// When `None`, the token is treated as non-expiring.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_seconds_option"
    )]
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthTokens {
    /// Tokens with only an access token set.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
        }
    }

    /// Returns `true` when the access token is expired or about to expire.
    ///
    /// A 60-second buffer is applied so a connection is never opened with a
    /// token the server will reject moments later.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            None => false,
            Some(expires_at) => Utc::now() >= expires_at - chrono::Duration::seconds(60),
        }
    }
}

// ---------------------------------------------------------------------------
// TokenStore
// ---------------------------------------------------------------------------

/// Get/set/clear access to the current session's tokens.
#[cfg_attr(test, mockall::automock)]
pub trait TokenStore: Send + Sync {
    /// Load the stored tokens, `Ok(None)` when logged out.
    fn load(&self) -> Result<Option<AuthTokens>>;

    /// Replace the stored tokens.
    fn save(&self, tokens: &AuthTokens) -> Result<()>;

    /// Forget the stored tokens. A no-op when nothing is stored.
    fn clear(&self) -> Result<()>;
}

/// In-memory [`TokenStore`].
///
/// # Examples
///
/// ```
/// use astrochat::auth::{AuthTokens, MemoryTokenStore, TokenStore};
///
/// let store = MemoryTokenStore::with_tokens(AuthTokens::new("abc"));
/// assert_eq!(store.load().unwrap().unwrap().access_token, "abc");
/// store.clear().unwrap();
/// assert!(store.load().unwrap().is_none());
/// ```
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<Option<AuthTokens>>,
}

impl MemoryTokenStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-populated with `tokens`.
    pub fn with_tokens(tokens: AuthTokens) -> Self {
        Self {
            tokens: RwLock::new(Some(tokens)),
        }
    }
}

fn poisoned() -> AstroChatError {
    AstroChatError::MissingCredentials("token store lock poisoned".to_string())
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<AuthTokens>> {
        Ok(self.tokens.read().map_err(|_| poisoned())?.clone())
    }

    fn save(&self, tokens: &AuthTokens) -> Result<()> {
        *self.tokens.write().map_err(|_| poisoned())? = Some(tokens.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.tokens.write().map_err(|_| poisoned())? = None;
        Ok(())
    }
}

/// [`TokenStore`] backed by the OS keyring.
///
/// The keyring is stateless; this struct only carries the service name the
/// entry is filed under.
#[derive(Debug, Clone)]
pub struct KeyringTokenStore {
    service: String,
}

/// Keyring account name for the session entry.
const KEYRING_ACCOUNT: &str = "session";

impl KeyringTokenStore {
    /// Accessor for the entry filed under `service`.
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry> {
        Ok(keyring::Entry::new(&self.service, KEYRING_ACCOUNT)
            .map_err(AstroChatError::Keyring)?)
    }
}

impl TokenStore for KeyringTokenStore {
    fn load(&self) -> Result<Option<AuthTokens>> {
        match self.entry()?.get_password() {
            Ok(json_str) => Ok(Some(serde_json::from_str(&json_str)?)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(AstroChatError::Keyring(e).into()),
        }
    }

    fn save(&self, tokens: &AuthTokens) -> Result<()> {
        let json_str = serde_json::to_string(tokens)?;
        self.entry()?
            .set_password(&json_str)
            .map_err(AstroChatError::Keyring)?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match self.entry()?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(AstroChatError::Keyring(e).into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
