//! Agent endpoints: identity, history, message submission.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use lumen_types::{AgentId, InteractionId, TaskId};

use crate::{ApiClient, ClientError};

const AGENTS_PATH: &str = "/v1/agents";

/// Billing attribution header carried on credit-consuming requests.
pub const INTERACTION_ID_HEADER: &str = "X-Interaction-Id";

#[derive(Debug, Clone, Deserialize)]
pub struct AgentProfile {
    pub agent_id: AgentId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// One prior exchange in the agent's conversation history.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Acknowledgement of a submitted message. `task_id`, when present, keys the
/// reasoning-stream events this message will produce.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageReceipt {
    pub message_id: String,
    #[serde(default)]
    pub task_id: Option<TaskId>,
    pub interaction_id: InteractionId,
}

#[derive(Serialize)]
struct MessageBody<'a> {
    content: &'a str,
}

pub struct AgentApi<'a> {
    client: &'a ApiClient,
}

impl<'a> AgentApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    pub async fn identity(&self, agent_id: &AgentId) -> Result<AgentProfile, ClientError> {
        self.client
            .get_json(&format!("{AGENTS_PATH}/{agent_id}"))
            .await
    }

    pub async fn history(&self, agent_id: &AgentId) -> Result<Vec<HistoryEntry>, ClientError> {
        self.client
            .get_json(&format!("{AGENTS_PATH}/{agent_id}/history"))
            .await
    }

    /// Submit a user message to the agent.
    ///
    /// Every submission carries an interaction id for billing attribution;
    /// one is minted when the caller does not supply one.
    pub async fn submit_message(
        &self,
        agent_id: &AgentId,
        content: &str,
        interaction_id: Option<InteractionId>,
    ) -> Result<MessageReceipt, ClientError> {
        if content.trim().is_empty() {
            return Err(ClientError::Validation(
                "message content must not be empty".to_owned(),
            ));
        }

        let interaction_id =
            interaction_id.unwrap_or_else(|| InteractionId::new(Uuid::new_v4().to_string()));
        let url = self
            .client
            .endpoint(&format!("{AGENTS_PATH}/{agent_id}/messages"))?;

        let response = self
            .client
            .send(|| {
                self.client
                    .unary(reqwest::Method::POST, url.clone())
                    .header(INTERACTION_ID_HEADER, interaction_id.as_str())
                    .json(&MessageBody { content })
            })
            .await?;

        Ok(response.json().await?)
    }
}
