//! Billing endpoints.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::{ApiClient, ClientError};

pub const CREDITS_PATH: &str = "/v1/billing/credits";

/// Credit balance for the current identity.
#[derive(Debug, Clone, Deserialize)]
pub struct CreditStatus {
    pub credits_remaining: u64,
    pub monthly_allowance: u64,
    pub plan: String,
    #[serde(default)]
    pub renews_at: Option<DateTime<Utc>>,
}

impl CreditStatus {
    /// True when the identity can still start credit-consuming work.
    #[must_use]
    pub fn has_credit(&self) -> bool {
        self.credits_remaining > 0
    }
}

pub struct BillingApi<'a> {
    client: &'a ApiClient,
}

impl<'a> BillingApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    pub async fn credit_status(&self) -> Result<CreditStatus, ClientError> {
        self.client.get_json(CREDITS_PATH).await
    }
}
