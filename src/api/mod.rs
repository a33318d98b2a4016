//! REST client for the astrology backend
//!
//! [`ApiClient`] wraps `reqwest` with the backend's conventions:
//!
//! - every path is relative to `api.base_url`
//! - authenticated calls carry `Authorization: Bearer <access token>` read
//!   from the injected [`TokenStore`]
//! - an access token already past its expiry is refreshed before use;
//!   otherwise a `401` triggers one token refresh and one retry. A failed
//!   refresh clears the stored tokens
//! - non-success statuses become [`AstroChatError::Api`] with the server's
//!   `detail` / `message` / `error` text
//!
//! Endpoint groups live in submodules as further `impl ApiClient` blocks.

mod auth;
mod billing;
mod charts;
mod conversations;
pub mod types;

pub use types::{
    BirthChart, CheckoutSession, ConversationDetail, ConversationSummary, NewBirthChart, Plan,
    StoredMessage, Subscription, User,
};

use std::sync::Arc;

use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::auth::{AuthTokens, TokenStore};
use crate::config::ApiConfig;
use crate::error::{AstroChatError, Result};

/// HTTP client for the backend REST API
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    tokens: Arc<dyn TokenStore>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Create a client for the configured backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use astrochat::api::ApiClient;
    /// use astrochat::auth::MemoryTokenStore;
    /// use astrochat::config::ApiConfig;
    ///
    /// let client = ApiClient::new(&ApiConfig::default(), Arc::new(MemoryTokenStore::new()));
    /// assert!(client.is_ok());
    /// ```
    pub fn new(config: &ApiConfig, tokens: Arc<dyn TokenStore>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("astrochat/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AstroChatError::Config(format!("Failed to create HTTP client: {}", e)))?;

        tracing::debug!(base_url = %config.base_url, "initialized API client");

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            tokens,
        })
    }

    /// The token store this client reads and updates.
    pub fn token_store(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    /// Stored tokens whose access token is usable right now.
    ///
    /// An expired access token is exchanged once through
    /// `POST /api/auth/refresh` before it is returned. The chat connection
    /// calls this before its handshake, since a WebSocket upgrade has no
    /// `401` to retry on.
    ///
    /// # Errors
    ///
    /// [`AstroChatError::MissingCredentials`] when nothing is stored, and
    /// [`AstroChatError::Authentication`] when the refresh fails (the store
    /// is cleared in that case).
    pub async fn ensure_fresh_token(&self) -> Result<AuthTokens> {
        Ok(self.current_tokens().await?.0)
    }

    /// Load the stored tokens, refreshing an expired access token.
    ///
    /// The flag is `true` when a refresh already happened.
    async fn current_tokens(&self) -> Result<(AuthTokens, bool)> {
        let tokens = self.tokens.load()?.ok_or_else(|| {
            AstroChatError::MissingCredentials("not logged in; run `astrochat auth login`".into())
        })?;
        if !tokens.is_expired() {
            return Ok((tokens, false));
        }

        tracing::info!("access token expired, refreshing");
        let refreshed = self.refresh_or_logout(&tokens).await?;
        Ok((refreshed, true))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn execute<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        bearer: Option<&str>,
    ) -> Result<Response> {
        let mut request = self.client.request(method.clone(), self.url(path));
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        tracing::debug!(%method, path, "API request");
        let response = request.send().await.map_err(|e| {
            tracing::warn!(%method, path, "API request failed: {}", e);
            AstroChatError::Http(e)
        })?;
        tracing::debug!(%method, path, status = response.status().as_u16(), "API response");
        Ok(response)
    }

    /// Send a request without credentials.
    async fn public<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response> {
        self.execute(method, path, body, None).await
    }

    /// Send a request with the stored access token, refreshing once on `401`.
    async fn authed<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response> {
        let (tokens, already_refreshed) = self.current_tokens().await?;

        let response = self
            .execute(method.clone(), path, body, Some(&tokens.access_token))
            .await?;
        // At most one refresh per call.
        if response.status() != StatusCode::UNAUTHORIZED || already_refreshed {
            return Ok(response);
        }

        tracing::info!(path, "access token rejected, refreshing");
        let refreshed = self.refresh_or_logout(&tokens).await?;

        self.execute(method, path, body, Some(&refreshed.access_token))
            .await
    }

    /// [`ApiClient::refresh`], clearing the store when it fails.
    async fn refresh_or_logout(&self, current: &AuthTokens) -> Result<AuthTokens> {
        match self.refresh(current).await {
            Ok(refreshed) => Ok(refreshed),
            Err(e) => {
                tracing::warn!("token refresh failed: {}", e);
                if let Err(clear_err) = self.tokens.clear() {
                    tracing::warn!("failed to clear stored tokens: {}", clear_err);
                }
                Err(AstroChatError::Authentication("please log in again".into()).into())
            }
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.authed::<()>(Method::GET, path, None).await?;
        decode(response).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let response = self.authed(Method::POST, path, Some(body)).await?;
        decode(response).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let response = self.authed::<()>(Method::DELETE, path, None).await?;
        ensure_success(response).await
    }

    /// Exchange the refresh token for a new access token and store it.
    async fn refresh(&self, current: &AuthTokens) -> Result<AuthTokens> {
        let refresh_token = current.refresh_token.clone().ok_or_else(|| {
            AstroChatError::Authentication("no refresh token available".to_string())
        })?;
        let body = serde_json::json!({ "refresh_token": refresh_token });
        let response = self
            .public(Method::POST, "/api/auth/refresh", Some(&body))
            .await?;
        let token_response: types::TokenResponse = decode(response).await?;
        let tokens = token_response.into_tokens(Some(refresh_token));
        self.tokens.save(&tokens)?;
        tracing::info!("access token refreshed");
        Ok(tokens)
    }
}

async fn ensure_success(response: Response) -> Result<()> {
    if response.status().is_success() {
        Ok(())
    } else {
        Err(api_error(response).await)
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    if !response.status().is_success() {
        return Err(api_error(response).await);
    }
    let text = response.text().await.map_err(AstroChatError::Http)?;
    serde_json::from_str(&text).map_err(|e| {
        tracing::error!("failed to parse API response: {}", e);
        AstroChatError::Protocol(format!("unexpected API response: {}", e)).into()
    })
}

async fn api_error(response: Response) -> anyhow::Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    });
    tracing::warn!(status = status.as_u16(), "API error: {}", message);
    AstroChatError::Api {
        status: status.as_u16(),
        message,
    }
    .into()
}

/// Pull the human-readable message out of an error body.
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["detail", "message", "error"].iter().find_map(|key| {
        match value.get(*key)? {
            serde_json::Value::String(s) => Some(s.clone()),
            // Validation errors arrive as a list of objects with `msg`.
            serde_json::Value::Array(items) => {
                let parts: Vec<&str> = items
                    .iter()
                    .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                    .collect();
                (!parts.is_empty()).then(|| parts.join("; "))
            }
            _ => None,
        }
    })
}
