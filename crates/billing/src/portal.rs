//! Stripe Billing Portal

use serde::Serialize;
use stripe::{BillingPortalSession, CreateBillingPortalSession, CustomerId};
use uuid::Uuid;

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};
use crate::records::BillingRecordStore;

/// Portal service for Stripe billing portal sessions
pub struct PortalService {
    stripe: StripeClient,
    records: BillingRecordStore,
}

impl PortalService {
    pub fn new(stripe: StripeClient, records: BillingRecordStore) -> Self {
        Self { stripe, records }
    }

    /// Create a hosted billing portal session for a tenant
    pub async fn create_portal_session(
        &self,
        tenant_id: Uuid,
        tenant_slug: &str,
    ) -> BillingResult<PortalResponse> {
        let record = self
            .records
            .get(tenant_id)
            .await?
            .ok_or(BillingError::TenantNotFound(tenant_id))?;

        let customer_id = record
            .stripe_customer_id
            .ok_or_else(|| BillingError::Internal("No Stripe customer on file".to_string()))?
            .parse::<CustomerId>()
            .map_err(|e| BillingError::StripeApi(format!("Invalid customer ID: {}", e)))?;

        let return_url = format!(
            "{}/{}/billing",
            self.stripe.config().app_base_url,
            tenant_slug
        );

        let mut params = CreateBillingPortalSession::new(customer_id);
        params.return_url = Some(&return_url);

        let session = BillingPortalSession::create(self.stripe.inner(), params).await?;

        tracing::info!(
            tenant_id = %tenant_id,
            customer_id = %session.customer,
            "Created billing portal session"
        );

        Ok(PortalResponse { url: session.url })
    }
}

/// Response for creating a portal session
#[derive(Debug, Serialize)]
pub struct PortalResponse {
    pub url: String,
}
