//! Data Subject Access Request (DSAR) endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lumen_types::TicketId;

use crate::{ApiClient, ClientError};

pub const DSAR_PATH: &str = "/v1/privacy/dsar";

/// The kind of privacy request being filed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DsarRequestType {
    Access,
    Deletion,
    Correction,
    Portability,
}

impl DsarRequestType {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "access" => Some(Self::Access),
            "deletion" => Some(Self::Deletion),
            "correction" => Some(Self::Correction),
            "portability" => Some(Self::Portability),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Deletion => "deletion",
            Self::Correction => "correction",
            Self::Portability => "portability",
        }
    }
}

/// A new DSAR, as submitted by the client.
#[derive(Debug, Clone, Serialize)]
pub struct DsarSubmission {
    pub request_type: DsarRequestType,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// A DSAR ticket as the server reports it.
///
/// `status` stays a free string: the server owns the status vocabulary and
/// the client only displays it.
#[derive(Debug, Clone, Deserialize)]
pub struct DsarTicket {
    pub ticket_id: TicketId,
    pub status: String,
    pub request_type: DsarRequestType,
    pub email: String,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct StatusUpdateBody<'a> {
    status: &'a str,
}

pub struct DsarApi<'a> {
    client: &'a ApiClient,
}

impl<'a> DsarApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    /// File a new DSAR. The subject email is validated locally first.
    pub async fn submit(&self, submission: &DsarSubmission) -> Result<DsarTicket, ClientError> {
        let email = submission.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(ClientError::Validation(format!(
                "{email:?} is not a valid subject email"
            )));
        }

        self.client.post_json(DSAR_PATH, submission).await
    }

    /// Fetch the current state of one ticket.
    pub async fn check_status(&self, ticket_id: &TicketId) -> Result<DsarTicket, ClientError> {
        self.client
            .get_json(&format!("{DSAR_PATH}/{ticket_id}"))
            .await
    }

    /// All tickets visible to the current identity.
    pub async fn list(&self) -> Result<Vec<DsarTicket>, ClientError> {
        self.client.get_json(DSAR_PATH).await
    }

    /// Move a ticket to a new status (operator surface).
    pub async fn update_status(
        &self,
        ticket_id: &TicketId,
        status: &str,
    ) -> Result<DsarTicket, ClientError> {
        if status.trim().is_empty() {
            return Err(ClientError::Validation(
                "ticket status must not be empty".to_owned(),
            ));
        }
        self.client
            .patch_json(
                &format!("{DSAR_PATH}/{ticket_id}"),
                &StatusUpdateBody { status },
            )
            .await
    }
}
