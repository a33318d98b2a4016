//! Conversation history endpoints

use super::types::{ConversationDetail, ConversationSummary};
use super::ApiClient;
use crate::error::Result;

impl ApiClient {
    /// Past conversations, most recent first.
    pub async fn list_conversations(&self) -> Result<Vec<ConversationSummary>> {
        self.get("/api/conversations").await
    }

    /// One conversation with all of its messages.
    pub async fn get_conversation(&self, conversation_id: &str) -> Result<ConversationDetail> {
        self.get(&format!("/api/conversations/{}", conversation_id))
            .await
    }

    /// Delete a conversation and its messages.
    pub async fn delete_conversation(&self, conversation_id: &str) -> Result<()> {
        self.delete(&format!("/api/conversations/{}", conversation_id))
            .await?;
        tracing::info!(conversation_id, "conversation deleted");
        Ok(())
    }
}
