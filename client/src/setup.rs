//! Setup-wizard endpoints.
//!
//! A freshly provisioned workspace must pick a model provider and template
//! before the assistant will accept work; other endpoints answer with a
//! `setup_required` error code until [`SetupApi::complete`] succeeds (see
//! [`crate::ClientError::SetupRequired`]).

use serde::{Deserialize, Serialize};

use crate::{ApiClient, ClientError};

pub const STATUS_PATH: &str = "/v1/setup/status";
pub const PROVIDERS_PATH: &str = "/v1/setup/providers";
pub const TEMPLATES_PATH: &str = "/v1/setup/templates";
pub const VALIDATE_PATH: &str = "/v1/setup/validate";
pub const COMPLETE_PATH: &str = "/v1/setup/complete";

#[derive(Debug, Clone, Deserialize)]
pub struct SetupStatus {
    pub required: bool,
    #[serde(default)]
    pub completed_steps: Vec<String>,
}

/// A model provider the workspace can be configured against.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderDescriptor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub requires_api_key: bool,
}

/// An assistant configuration template.
#[derive(Debug, Clone, Deserialize)]
pub struct SetupTemplate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// The wizard's answers, sent to validate and complete.
#[derive(Debug, Clone, Serialize)]
pub struct SetupSubmission {
    pub provider_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    #[serde(default)]
    pub issues: Vec<String>,
}

pub struct SetupApi<'a> {
    client: &'a ApiClient,
}

impl<'a> SetupApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    pub async fn status(&self) -> Result<SetupStatus, ClientError> {
        self.client.get_json(STATUS_PATH).await
    }

    pub async fn providers(&self) -> Result<Vec<ProviderDescriptor>, ClientError> {
        self.client.get_json(PROVIDERS_PATH).await
    }

    pub async fn templates(&self) -> Result<Vec<SetupTemplate>, ClientError> {
        self.client.get_json(TEMPLATES_PATH).await
    }

    /// Dry-run the submission server-side without committing it.
    pub async fn validate(
        &self,
        submission: &SetupSubmission,
    ) -> Result<ValidationReport, ClientError> {
        self.validate_input(submission)?;
        self.client.post_json(VALIDATE_PATH, submission).await
    }

    /// Commit the wizard. After success, `setup_required` gates lift.
    pub async fn complete(&self, submission: &SetupSubmission) -> Result<SetupStatus, ClientError> {
        self.validate_input(submission)?;
        self.client.post_json(COMPLETE_PATH, submission).await
    }

    fn validate_input(&self, submission: &SetupSubmission) -> Result<(), ClientError> {
        if submission.provider_id.trim().is_empty() {
            return Err(ClientError::Validation(
                "provider_id must not be empty".to_owned(),
            ));
        }
        Ok(())
    }
}
