//! Subscription management
//!
//! Hosts the in-place proration upgrade and the shared projection
//! logic that turns a Stripe subscription read into the complete
//! target state for the billing record upsert.

use stripe::{Subscription, SubscriptionId, UpdateSubscription, UpdateSubscriptionItems};
// Import the proration behavior enum from the subscription module (not subscription_item)
use stripe::generated::billing::subscription::SubscriptionProrationBehavior;
use uuid::Uuid;

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};
use crate::records::{BillingRecordStore, ObservedSubscription};
use crate::tier::{BillingInterval, PlanTier};

/// Extract the Stripe customer id from a subscription's expandable
/// customer field
pub(crate) fn customer_id_of(subscription: &Subscription) -> String {
    match &subscription.customer {
        stripe::Expandable::Id(id) => id.to_string(),
        stripe::Expandable::Object(customer) => customer.id.to_string(),
    }
}

/// Price id on the subscription's first item, if any
pub(crate) fn price_id_of(subscription: &Subscription) -> Option<String> {
    subscription
        .items
        .data
        .first()
        .and_then(|item| item.price.as_ref())
        .map(|p| p.id.to_string())
}

/// Subscription service: proration upgrades and projection derivation
pub struct SubscriptionService {
    stripe: StripeClient,
    records: BillingRecordStore,
}

impl SubscriptionService {
    pub fn new(stripe: StripeClient, records: BillingRecordStore) -> Self {
        Self { stripe, records }
    }

    /// Derive the billing-record projection from one coherent
    /// subscription read
    pub fn observe(&self, subscription: &Subscription) -> ObservedSubscription {
        ObservedSubscription::derive(
            &self.stripe.config().prices,
            &customer_id_of(subscription),
            subscription.id.as_str(),
            price_id_of(subscription).as_deref(),
            subscription.current_period_end,
        )
    }

    /// Switch an existing subscription to a new price in place, with
    /// Stripe computing the prorated charge/credit.
    ///
    /// The local billing record is deliberately NOT updated here: the
    /// proration amount and the exact period boundaries are computed by
    /// Stripe, and the authoritative state arrives via the
    /// `customer.subscription.updated` webhook.
    pub async fn upgrade_subscription(
        &self,
        tenant_id: Uuid,
        tier: PlanTier,
        interval: BillingInterval,
    ) -> BillingResult<Subscription> {
        let record = self
            .records
            .get(tenant_id)
            .await?
            .ok_or(BillingError::TenantNotFound(tenant_id))?;

        // Upgrade-only path: never initial-subscribe
        let sub_id = match record.stripe_subscription_id.as_deref() {
            Some(id) if !id.is_empty() => id
                .parse::<SubscriptionId>()
                .map_err(|e| BillingError::StripeApi(format!("Invalid subscription ID: {}", e)))?,
            _ => return Err(BillingError::SubscriptionRequired),
        };

        let price_id = self
            .stripe
            .config()
            .require_price_id(tier, interval)?
            .to_string();

        let current = Subscription::retrieve(self.stripe.inner(), &sub_id, &[]).await?;

        // Idempotent no-op rejection: the caller must be told nothing changed
        if price_id_of(&current).as_deref() == Some(price_id.as_str()) {
            return Err(BillingError::AlreadyOnPlan(tier.as_str().to_string()));
        }

        let item_id = current
            .items
            .data
            .first()
            .map(|item| item.id.to_string())
            .ok_or_else(|| BillingError::Internal("No subscription items found".to_string()))?;

        let mut metadata = std::collections::HashMap::new();
        metadata.insert("tenant_id".to_string(), tenant_id.to_string());
        metadata.insert("tier".to_string(), tier.as_str().to_string());

        let params = UpdateSubscription {
            items: Some(vec![UpdateSubscriptionItems {
                id: Some(item_id),
                price: Some(price_id),
                ..Default::default()
            }]),
            metadata: Some(metadata),
            // Stripe computes and immediately charges/credits the prorated delta
            proration_behavior: Some(SubscriptionProrationBehavior::CreateProrations),
            ..Default::default()
        };

        let subscription = Subscription::update(self.stripe.inner(), &sub_id, params).await?;

        tracing::info!(
            tenant_id = %tenant_id,
            subscription_id = %subscription.id,
            tier = %tier,
            interval = %interval,
            "Requested prorated plan change; awaiting webhook confirmation"
        );

        Ok(subscription)
    }

    /// Retrieve a subscription by its Stripe id
    pub async fn retrieve(&self, subscription_id: &str) -> BillingResult<Subscription> {
        let sub_id = subscription_id
            .parse::<SubscriptionId>()
            .map_err(|e| BillingError::StripeApi(format!("Invalid subscription ID: {}", e)))?;
        let subscription = Subscription::retrieve(self.stripe.inner(), &sub_id, &[]).await?;
        Ok(subscription)
    }
}
