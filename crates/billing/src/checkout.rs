//! Stripe Checkout sessions
//!
//! Entry point for tenants subscribing (or resubscribing) with no
//! subscription on file. The only local mutation on this path is
//! persisting the Stripe customer reference, which happens before the
//! session is created so a retry never recreates the customer.

use serde::Serialize;
use stripe::{
    CheckoutSession, CheckoutSessionMode, CreateCheckoutSession, CreateCheckoutSessionLineItems,
    CreateCustomer, Customer, CustomerId,
};
use uuid::Uuid;

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};
use crate::records::BillingRecordStore;
use crate::tier::{BillingInterval, PlanTier};

/// Tenant identity passed in by the caller (auth is upstream)
#[derive(Debug, Clone)]
pub struct TenantProfile {
    pub tenant_id: Uuid,
    /// URL slug used to build return URLs
    pub slug: String,
    pub email: String,
    pub name: String,
}

/// Checkout service for creating Stripe checkout sessions
pub struct CheckoutService {
    stripe: StripeClient,
    records: BillingRecordStore,
}

impl CheckoutService {
    pub fn new(stripe: StripeClient, records: BillingRecordStore) -> Self {
        Self { stripe, records }
    }

    /// Create a hosted checkout session for a new subscription
    ///
    /// The session metadata carries the tenant id and target tier; it
    /// is the authority used later to attribute the resulting
    /// subscription and must never be omitted.
    pub async fn create_subscription_checkout(
        &self,
        tenant: &TenantProfile,
        tier: PlanTier,
        interval: BillingInterval,
    ) -> BillingResult<CheckoutResponse> {
        let price_id = self
            .stripe
            .config()
            .require_price_id(tier, interval)?
            .to_string();

        let customer = self.get_or_create_customer(tenant).await?;

        let base_url = &self.stripe.config().app_base_url;
        let success_url = format!(
            "{}/{}/billing/success?session_id={{CHECKOUT_SESSION_ID}}",
            base_url, tenant.slug
        );
        let cancel_url = format!("{}/{}/billing/plans", base_url, tenant.slug);

        let mut metadata = std::collections::HashMap::new();
        metadata.insert("tenant_id".to_string(), tenant.tenant_id.to_string());
        metadata.insert("tier".to_string(), tier.as_str().to_string());
        metadata.insert("interval".to_string(), interval.as_str().to_string());

        let params = CreateCheckoutSession {
            customer: Some(customer),
            mode: Some(CheckoutSessionMode::Subscription),
            line_items: Some(vec![CreateCheckoutSessionLineItems {
                price: Some(price_id),
                quantity: Some(1),
                ..Default::default()
            }]),
            success_url: Some(&success_url),
            cancel_url: Some(&cancel_url),
            metadata: Some(metadata),
            allow_promotion_codes: Some(true),
            ..Default::default()
        };

        let session = CheckoutSession::create(self.stripe.inner(), params).await?;

        tracing::info!(
            tenant_id = %tenant.tenant_id,
            session_id = %session.id,
            tier = %tier,
            interval = %interval,
            "Created checkout session"
        );

        Ok(session.into())
    }

    /// Resolve the tenant's Stripe customer, creating one if absent.
    /// The reference is persisted immediately so a failed checkout
    /// attempt never leads to a duplicate customer on retry.
    async fn get_or_create_customer(&self, tenant: &TenantProfile) -> BillingResult<CustomerId> {
        if let Some(record) = self.records.get(tenant.tenant_id).await? {
            if let Some(customer_id) = record.stripe_customer_id {
                return customer_id
                    .parse::<CustomerId>()
                    .map_err(|e| BillingError::StripeApi(format!("Invalid customer ID: {}", e)));
            }
        }

        let mut metadata = std::collections::HashMap::new();
        metadata.insert("tenant_id".to_string(), tenant.tenant_id.to_string());

        // Stripe rejects explicit empty strings; omit absent contact
        // details instead
        let params = CreateCustomer {
            email: non_empty(&tenant.email),
            name: non_empty(&tenant.name),
            metadata: Some(metadata),
            ..Default::default()
        };

        let customer = Customer::create(self.stripe.inner(), params).await?;

        self.records
            .set_customer_ref(tenant.tenant_id, customer.id.as_str())
            .await?;

        tracing::info!(
            tenant_id = %tenant.tenant_id,
            customer_id = %customer.id,
            "Created new Stripe customer"
        );

        Ok(customer.id)
    }
}

fn non_empty(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

/// Response for creating a checkout session
#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: Option<String>,
}

impl From<CheckoutSession> for CheckoutResponse {
    fn from(session: CheckoutSession) -> Self {
        Self {
            session_id: session.id.to_string(),
            url: session.url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_contact_details_are_omitted() {
        // Gateways may forward tenants with no email or display name;
        // those must be omitted from customer creation, not sent as ""
        assert_eq!(non_empty(""), None);
        assert_eq!(non_empty("   "), None);
        assert_eq!(non_empty("ops@north.example"), Some("ops@north.example"));
        assert_eq!(non_empty(" North Agency "), Some("North Agency"));
    }
}
