//! Account endpoints

use reqwest::Method;

use super::types::{LoginRequest, SignupRequest, TokenResponse, User};
use super::{decode, ApiClient};
use crate::auth::AuthTokens;
use crate::error::Result;

impl ApiClient {
    /// Log in and persist the returned tokens.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthTokens> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let response = self
            .public(Method::POST, "/api/auth/login", Some(&body))
            .await?;
        let tokens = decode::<TokenResponse>(response).await?.into_tokens(None);
        self.tokens.save(&tokens)?;
        tracing::info!(email, "logged in");
        Ok(tokens)
    }

    /// Create an account and persist the returned tokens.
    pub async fn signup(
        &self,
        email: &str,
        password: &str,
        full_name: Option<&str>,
    ) -> Result<AuthTokens> {
        let body = SignupRequest {
            email: email.to_string(),
            password: password.to_string(),
            full_name: full_name.map(str::to_string),
        };
        let response = self
            .public(Method::POST, "/api/auth/signup", Some(&body))
            .await?;
        let tokens = decode::<TokenResponse>(response).await?.into_tokens(None);
        self.tokens.save(&tokens)?;
        tracing::info!(email, "account created");
        Ok(tokens)
    }

    /// The logged-in account.
    pub async fn me(&self) -> Result<User> {
        self.get("/api/auth/me").await
    }

    /// Log out on the server and forget the local tokens.
    ///
    /// The local tokens are cleared even when the server call fails.
    pub async fn logout(&self) -> Result<()> {
        if self.tokens.load()?.is_some() {
            match self
                .authed::<()>(Method::POST, "/api/auth/logout", None)
                .await
            {
                Ok(response) if !response.status().is_success() => {
                    tracing::warn!(status = response.status().as_u16(), "server logout failed");
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("server logout failed: {}", e),
            }
        }
        self.tokens.clear()?;
        tracing::info!("logged out");
        Ok(())
    }
}
