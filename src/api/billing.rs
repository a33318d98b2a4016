//! Subscription and usage endpoints

use async_trait::async_trait;

use super::types::{CheckoutRequest, CheckoutSession, Plan, Subscription};
use super::ApiClient;
use crate::chat::{UsageSnapshot, UsageSource};
use crate::config::BillingConfig;
use crate::error::Result;

impl ApiClient {
    /// The user's current subscription.
    pub async fn subscription(&self) -> Result<Subscription> {
        self.get("/api/subscription").await
    }

    /// Messages used and remaining in the current period.
    pub async fn usage(&self) -> Result<UsageSnapshot> {
        self.get("/api/subscription/usage").await
    }

    /// Plans available for purchase.
    pub async fn plans(&self) -> Result<Vec<Plan>> {
        self.get("/api/subscription/plans").await
    }

    /// Start a hosted checkout for `plan_id`.
    ///
    /// The returned URL must be opened in a browser; the payment processor
    /// sends the user back to one of the configured return URLs.
    pub async fn create_checkout(
        &self,
        plan_id: &str,
        billing: &BillingConfig,
    ) -> Result<CheckoutSession> {
        let body = CheckoutRequest {
            plan_id: plan_id.to_string(),
            success_url: billing.success_url.clone(),
            cancel_url: billing.cancel_url.clone(),
        };
        let session: CheckoutSession = self.post("/api/subscription/checkout", &body).await?;
        tracing::info!(plan_id, "checkout session created");
        Ok(session)
    }

    /// Cancel the subscription at the end of the current period.
    pub async fn cancel_subscription(&self) -> Result<Subscription> {
        let subscription: Subscription = self
            .post("/api/subscription/cancel", &serde_json::json!({}))
            .await?;
        tracing::info!(status = %subscription.status, "subscription cancelled");
        Ok(subscription)
    }
}

#[async_trait]
impl UsageSource for ApiClient {
    async fn fetch_usage(&self) -> Result<UsageSnapshot> {
        self.usage().await
    }
}
