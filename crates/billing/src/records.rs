//! Billing record persistence
//!
//! One billing record per tenant, created implicitly when a tenant is
//! provisioned. All subscription-state mutation funnels through
//! [`BillingRecordStore::apply_observed`], a full-state upsert keyed by
//! tenant id: every writer computes its complete target state from a
//! single coherent Stripe read, so concurrent webhook deliveries and
//! session polls converge without locks or a dedup ledger.

use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::client::PriceCatalog;
use crate::error::BillingResult;
use crate::tier::PlanTier;

/// A tenant's billing record
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BillingRecord {
    pub tenant_id: Uuid,
    pub tier: String,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub subscription_period_end: Option<OffsetDateTime>,
    pub is_freemium: bool,
    pub freemium_expires_at: Option<OffsetDateTime>,
}

impl BillingRecord {
    pub fn tier(&self) -> PlanTier {
        PlanTier::from_str(&self.tier).unwrap_or_default()
    }

    /// Whether a subscription is currently on file
    pub fn has_subscription(&self) -> bool {
        self.stripe_subscription_id
            .as_deref()
            .is_some_and(|s| !s.is_empty())
    }
}

/// The derived projection of a Stripe subscription read: the complete
/// target state for one convergent upsert. Constructed from a single
/// coherent Stripe response, never assembled field-by-field from
/// multiple reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedSubscription {
    pub tier: PlanTier,
    pub customer_id: String,
    pub subscription_id: String,
    pub period_end: Option<OffsetDateTime>,
}

impl ObservedSubscription {
    /// Derive the projection from the raw pieces of a subscription
    /// read. Pure; an unrecognized price maps to Free via the catalog.
    pub fn derive(
        catalog: &PriceCatalog,
        customer_id: &str,
        subscription_id: &str,
        price_id: Option<&str>,
        period_end_unix: i64,
    ) -> Self {
        let tier = price_id
            .map(|p| catalog.tier_for_price_id(p))
            .unwrap_or_default();
        let period_end = OffsetDateTime::from_unix_timestamp(period_end_unix).ok();
        Self {
            tier,
            customer_id: customer_id.to_string(),
            subscription_id: subscription_id.to_string(),
            period_end,
        }
    }
}

/// Store for tenant billing records
#[derive(Clone)]
pub struct BillingRecordStore {
    pool: PgPool,
}

impl BillingRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the default record (free tier, no subscription) if the
    /// tenant does not have one yet
    pub async fn ensure_record(&self, tenant_id: Uuid) -> BillingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tenant_billing (tenant_id, tier)
            VALUES ($1, 'free')
            ON CONFLICT (tenant_id) DO NOTHING
            "#,
        )
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, tenant_id: Uuid) -> BillingResult<Option<BillingRecord>> {
        let record = sqlx::query_as::<_, BillingRecord>(
            r#"
            SELECT tenant_id, tier, stripe_customer_id, stripe_subscription_id,
                   subscription_period_end, is_freemium, freemium_expires_at
            FROM tenant_billing
            WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// Persist the Stripe customer reference. Set once on first
    /// checkout; never cleared by this subsystem.
    pub async fn set_customer_ref(&self, tenant_id: Uuid, customer_id: &str) -> BillingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tenant_billing (tenant_id, tier, stripe_customer_id)
            VALUES ($1, 'free', $2)
            ON CONFLICT (tenant_id) DO UPDATE SET
                stripe_customer_id = COALESCE(tenant_billing.stripe_customer_id, EXCLUDED.stripe_customer_id),
                updated_at = NOW()
            "#,
        )
        .bind(tenant_id)
        .bind(customer_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Resolve a tenant by its Stripe customer reference. Webhook
    /// handlers attribute by customer, not subscription id, since the
    /// subscription id can rotate across resubscribes.
    pub async fn find_tenant_by_customer(
        &self,
        customer_id: &str,
    ) -> BillingResult<Option<Uuid>> {
        let row: Option<(Uuid,)> =
            sqlx::query_as("SELECT tenant_id FROM tenant_billing WHERE stripe_customer_id = $1")
                .bind(customer_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(id,)| id))
    }

    /// The convergent upsert: replace tier, subscription ref, period
    /// end and customer ref together in one statement. Freemium fields
    /// are never touched here. Redelivery of the same observed state is
    /// a no-op by value, which is what makes webhook retries and
    /// session-poll races safe.
    pub async fn apply_observed(
        &self,
        tenant_id: Uuid,
        observed: &ObservedSubscription,
    ) -> BillingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tenant_billing (
                tenant_id, tier, stripe_customer_id, stripe_subscription_id,
                subscription_period_end
            ) VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (tenant_id) DO UPDATE SET
                tier = EXCLUDED.tier,
                stripe_customer_id = COALESCE(tenant_billing.stripe_customer_id, EXCLUDED.stripe_customer_id),
                stripe_subscription_id = EXCLUDED.stripe_subscription_id,
                subscription_period_end = EXCLUDED.subscription_period_end,
                updated_at = NOW()
            "#,
        )
        .bind(tenant_id)
        .bind(observed.tier.as_str())
        .bind(&observed.customer_id)
        .bind(&observed.subscription_id)
        .bind(observed.period_end)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            tenant_id = %tenant_id,
            tier = %observed.tier,
            subscription_id = %observed.subscription_id,
            period_end = ?observed.period_end,
            "Applied observed subscription state"
        );

        Ok(())
    }

    /// Terminal cancellation reset: back to free with cleared
    /// subscription fields. The customer reference is retained so a
    /// resubscribe reuses the same Stripe customer.
    pub async fn reset_to_free(&self, tenant_id: Uuid) -> BillingResult<()> {
        sqlx::query(
            r#"
            UPDATE tenant_billing
            SET tier = 'free',
                stripe_subscription_id = NULL,
                subscription_period_end = NULL,
                updated_at = NOW()
            WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;

        tracing::info!(tenant_id = %tenant_id, "Billing record reset to free tier");
        Ok(())
    }
}
