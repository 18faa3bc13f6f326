//! Checkout session reconciliation and the billing info read path
//!
//! Webhook delivery can lag the client's return from checkout. The
//! session reconciler is the idempotent polling fallback: it queries
//! Stripe for the session the client came back with and applies the
//! same derive-and-upsert logic as the webhook handler, so whichever
//! signal arrives first wins and the loser is a no-op.

use serde::Serialize;
use std::time::Duration;
use stripe::{CheckoutSession, CheckoutSessionStatus};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};
use crate::records::{BillingRecord, BillingRecordStore};
use crate::subscriptions::SubscriptionService;
use crate::tier::PlanTier;

/// Cap on processor calls made from the read path. Reconciliation is
/// an accelerator in front of an otherwise-fast record read and must
/// not stall page loads on a slow Stripe response.
const STRIPE_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Tenant-facing projection of the billing record
#[derive(Debug, Clone, Serialize)]
pub struct BillingInfo {
    pub tier: PlanTier,
    pub subscription_id: Option<String>,
    pub subscription_period_end: Option<OffsetDateTime>,
    pub customer_id: Option<String>,
    pub is_freemium: bool,
    pub freemium_expires_at: Option<OffsetDateTime>,
}

impl From<BillingRecord> for BillingInfo {
    fn from(record: BillingRecord) -> Self {
        let tier = record.tier();
        Self {
            tier,
            subscription_id: record.stripe_subscription_id,
            subscription_period_end: record.subscription_period_end,
            customer_id: record.stripe_customer_id,
            is_freemium: record.is_freemium,
            freemium_expires_at: record.freemium_expires_at,
        }
    }
}

/// Reconciliation service: best-effort session sync plus the single
/// read path all product surfaces use
pub struct ReconcileService {
    stripe: StripeClient,
    records: BillingRecordStore,
}

impl ReconcileService {
    pub fn new(stripe: StripeClient, records: BillingRecordStore) -> Self {
        Self { stripe, records }
    }

    /// Pull a completed checkout session's subscription state into the
    /// billing record, if it is not already reflected there.
    ///
    /// Skips silently when the record already holds a subscription ref
    /// (the webhook won the race), when the session is not complete,
    /// and when the session's metadata names a different tenant (a
    /// stale or replayed session ref is not an error).
    pub async fn reconcile_checkout_session(
        &self,
        tenant_id: Uuid,
        session_id: &str,
    ) -> BillingResult<()> {
        if let Some(record) = self.records.get(tenant_id).await? {
            if record.has_subscription() {
                tracing::debug!(
                    tenant_id = %tenant_id,
                    "Billing record already converged; skipping session lookup"
                );
                return Ok(());
            }
        }

        let session_id = session_id
            .parse::<stripe::CheckoutSessionId>()
            .map_err(|e| BillingError::StripeApi(format!("Invalid session ID: {}", e)))?;

        let session = tokio::time::timeout(
            STRIPE_READ_TIMEOUT,
            CheckoutSession::retrieve(self.stripe.inner(), &session_id, &["subscription"]),
        )
        .await
        .map_err(|_| BillingError::StripeApi("Checkout session lookup timed out".to_string()))??;

        if session.status != Some(CheckoutSessionStatus::Complete) {
            tracing::debug!(
                tenant_id = %tenant_id,
                session_id = %session.id,
                status = ?session.status,
                "Checkout session not complete yet"
            );
            return Ok(());
        }

        // A session ref is client-supplied; only apply it if its
        // metadata attributes it to the requesting tenant
        let metadata_tenant = session
            .metadata
            .as_ref()
            .and_then(|m| m.get("tenant_id"))
            .and_then(|s| Uuid::parse_str(s).ok());
        if metadata_tenant != Some(tenant_id) {
            tracing::warn!(
                tenant_id = %tenant_id,
                session_id = %session.id,
                metadata_tenant = ?metadata_tenant,
                "Checkout session tenant mismatch; ignoring"
            );
            return Ok(());
        }

        let subscription = match session.subscription {
            Some(stripe::Expandable::Object(sub)) => *sub,
            Some(stripe::Expandable::Id(id)) => {
                let sub_service =
                    SubscriptionService::new(self.stripe.clone(), self.records.clone());
                tokio::time::timeout(STRIPE_READ_TIMEOUT, sub_service.retrieve(id.as_str()))
                    .await
                    .map_err(|_| {
                        BillingError::StripeApi("Subscription lookup timed out".to_string())
                    })??
            }
            None => {
                tracing::debug!(
                    tenant_id = %tenant_id,
                    session_id = %session.id,
                    "Completed session carries no subscription"
                );
                return Ok(());
            }
        };

        let sub_service = SubscriptionService::new(self.stripe.clone(), self.records.clone());
        let observed = sub_service.observe(&subscription);
        self.records.apply_observed(tenant_id, &observed).await?;

        tracing::info!(
            tenant_id = %tenant_id,
            subscription_id = %subscription.id,
            tier = %observed.tier,
            "Reconciled checkout session into billing record"
        );

        Ok(())
    }

    /// The single read path for billing state.
    ///
    /// If a session ref is supplied, reconciliation is attempted first
    /// as a best-effort accelerator; its failure is logged and
    /// swallowed, and the read proceeds unconditionally from whatever
    /// the record currently holds.
    pub async fn get_billing_info(
        &self,
        tenant_id: Uuid,
        session_id: Option<&str>,
    ) -> BillingResult<BillingInfo> {
        if let Some(session_id) = session_id {
            if let Err(e) = self.reconcile_checkout_session(tenant_id, session_id).await {
                tracing::warn!(
                    tenant_id = %tenant_id,
                    session_id = %session_id,
                    error = %e,
                    "Session reconciliation failed; serving stored record"
                );
            }
        }

        self.records.ensure_record(tenant_id).await?;
        let record = self
            .records
            .get(tenant_id)
            .await?
            .ok_or(BillingError::TenantNotFound(tenant_id))?;

        Ok(record.into())
    }
}
