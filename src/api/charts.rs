//! Birth chart endpoints

use super::types::{BirthChart, NewBirthChart};
use super::ApiClient;
use crate::error::Result;

impl ApiClient {
    /// Every chart the user has saved.
    pub async fn list_charts(&self) -> Result<Vec<BirthChart>> {
        self.get("/api/charts").await
    }

    /// One chart with its computed data.
    pub async fn get_chart(&self, chart_id: &str) -> Result<BirthChart> {
        self.get(&format!("/api/charts/{}", chart_id)).await
    }

    /// Save a new chart; the server computes the placements.
    pub async fn create_chart(&self, chart: &NewBirthChart) -> Result<BirthChart> {
        let created: BirthChart = self.post("/api/charts", chart).await?;
        tracing::info!(chart_id = %created.id, "chart created");
        Ok(created)
    }

    /// Delete a chart.
    pub async fn delete_chart(&self, chart_id: &str) -> Result<()> {
        self.delete(&format!("/api/charts/{}", chart_id)).await?;
        tracing::info!(chart_id, "chart deleted");
        Ok(())
    }
}
