//! Stripe webhook handling
//!
//! Verifies inbound event authenticity, dispatches by event type, and
//! funnels subscription state through the same derive-and-upsert logic
//! as the session reconciler, so both paths converge on the same
//! billing record regardless of arrival order.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use stripe::{Event, EventObject, EventType, Invoice, Subscription, Webhook};

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};
use crate::records::BillingRecordStore;
use crate::subscriptions::{customer_id_of, SubscriptionService};

type HmacSha256 = Hmac<Sha256>;

/// Maximum age accepted for a signed payload (replay window)
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Verify a Stripe signature header against a payload and secret.
///
/// Parses the `t=timestamp,v1=signature` header format, enforces the
/// timestamp tolerance, and compares the HMAC-SHA256 of
/// `"{timestamp}.{payload}"`.
pub fn verify_signature(payload: &str, signature: &str, secret: &str) -> BillingResult<()> {
    verify_signature_at(payload, signature, secret, unix_now()?)
}

fn unix_now() -> BillingResult<i64> {
    Ok(std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|e| BillingError::Internal(format!("System time error: {}", e)))?
        .as_secs() as i64)
}

fn verify_signature_at(payload: &str, signature: &str, secret: &str, now: i64) -> BillingResult<()> {
    let mut timestamp: Option<i64> = None;
    let mut v1_signature: Option<String> = None;

    for part in signature.split(',') {
        let kv: Vec<&str> = part.splitn(2, '=').collect();
        if kv.len() == 2 {
            match kv[0] {
                "t" => timestamp = kv[1].parse().ok(),
                "v1" => v1_signature = Some(kv[1].to_string()),
                _ => {}
            }
        }
    }

    let timestamp = timestamp.ok_or_else(|| {
        tracing::warn!("Missing timestamp in signature header");
        BillingError::WebhookSignatureInvalid
    })?;
    let v1_signature = v1_signature.ok_or_else(|| {
        tracing::warn!("Missing v1 signature in signature header");
        BillingError::WebhookSignatureInvalid
    })?;

    if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        tracing::warn!(
            timestamp = timestamp,
            now = now,
            "Webhook timestamp outside tolerance"
        );
        return Err(BillingError::WebhookSignatureInvalid);
    }

    // The secret's "whsec_" prefix is not part of the key material
    let secret_key = secret.strip_prefix("whsec_").unwrap_or(secret);
    let signed_payload = format!("{}.{}", timestamp, payload);

    let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes())
        .map_err(|_| BillingError::WebhookSignatureInvalid)?;
    mac.update(signed_payload.as_bytes());
    let computed = hex::encode(mac.finalize().into_bytes());

    if computed != v1_signature {
        tracing::warn!("Webhook signature mismatch");
        return Err(BillingError::WebhookSignatureInvalid);
    }

    Ok(())
}

/// Webhook handler for Stripe billing events
pub struct WebhookHandler {
    stripe: StripeClient,
    records: BillingRecordStore,
}

impl WebhookHandler {
    pub fn new(stripe: StripeClient, records: BillingRecordStore) -> Self {
        Self { stripe, records }
    }

    /// Event types this handler acts on; everything else is
    /// acknowledged and ignored for forward compatibility
    pub fn handles(event_type: &EventType) -> bool {
        matches!(
            event_type,
            EventType::CheckoutSessionCompleted
                | EventType::CustomerSubscriptionUpdated
                | EventType::CustomerSubscriptionDeleted
                | EventType::InvoicePaymentFailed
        )
    }

    /// Verify and parse a Stripe webhook event
    ///
    /// Uses manual signature verification as a fallback to work around
    /// async-stripe version incompatibility with newer Stripe API
    /// versions.
    pub fn verify_event(&self, payload: &str, signature: &str) -> BillingResult<Event> {
        let webhook_secret = &self.stripe.config().webhook_secret;

        match Webhook::construct_event(payload, signature, webhook_secret) {
            Ok(event) => return Ok(event),
            Err(e) => {
                tracing::debug!(
                    stripe_error = %e,
                    "Standard webhook parsing failed, trying manual verification"
                );
            }
        }

        verify_signature(payload, signature, webhook_secret)?;

        let event: Event = serde_json::from_str(payload).map_err(|e| {
            tracing::error!(parse_error = %e, "Failed to parse webhook event JSON");
            BillingError::WebhookSignatureInvalid
        })?;

        Ok(event)
    }

    /// Handle a verified Stripe event
    ///
    /// Every handler's terminal action is an upsert keyed by tenant id,
    /// so redelivery of the same event is safe without a dedup ledger.
    pub async fn handle_event(&self, event: Event) -> BillingResult<()> {
        tracing::info!(
            event_type = %event.type_,
            event_id = %event.id,
            "Processing Stripe webhook event"
        );

        match (event.type_, event.data.object) {
            (EventType::CheckoutSessionCompleted, EventObject::CheckoutSession(session)) => {
                self.handle_checkout_completed(session).await
            }
            (EventType::CustomerSubscriptionUpdated, EventObject::Subscription(subscription)) => {
                self.handle_subscription_updated(subscription).await
            }
            (EventType::CustomerSubscriptionDeleted, EventObject::Subscription(subscription)) => {
                self.handle_subscription_deleted(subscription).await
            }
            (EventType::InvoicePaymentFailed, EventObject::Invoice(invoice)) => {
                self.handle_invoice_payment_failed(invoice).await
            }
            (event_type, _) if Self::handles(&event_type) => {
                // Redelivery cannot fix a payload whose object does not
                // match its event type; acknowledge like any other
                // unfixable data problem
                tracing::warn!(
                    event_type = %event_type,
                    event_id = %event.id,
                    "Stripe event payload shape mismatch - acknowledging"
                );
                Ok(())
            }
            (event_type, _) => {
                // Log at info level so we can track which events we're
                // not handling; new event types must never be errors
                tracing::info!(
                    event_type = %event_type,
                    event_id = %event.id,
                    "Received unhandled Stripe event type - no handler configured"
                );
                Ok(())
            }
        }
    }

    async fn handle_checkout_completed(&self, session: stripe::CheckoutSession) -> BillingResult<()> {
        let tenant_id = session
            .metadata
            .as_ref()
            .and_then(|m| m.get("tenant_id"))
            .and_then(|s| uuid::Uuid::parse_str(s).ok());

        let tenant_id = match tenant_id {
            Some(id) => id,
            None => {
                // A missing mapping cannot be fixed by Stripe retrying
                tracing::warn!(
                    session_id = %session.id,
                    "Checkout session completed without tenant_id metadata - acknowledging"
                );
                return Ok(());
            }
        };

        let subscription_id = match &session.subscription {
            Some(stripe::Expandable::Id(id)) => id.to_string(),
            Some(stripe::Expandable::Object(sub)) => sub.id.to_string(),
            None => {
                tracing::warn!(
                    tenant_id = %tenant_id,
                    session_id = %session.id,
                    "Checkout session completed without a subscription - acknowledging"
                );
                return Ok(());
            }
        };

        let sub_service = SubscriptionService::new(self.stripe.clone(), self.records.clone());
        let subscription = sub_service.retrieve(&subscription_id).await?;
        let observed = sub_service.observe(&subscription);
        self.records.apply_observed(tenant_id, &observed).await?;

        tracing::info!(
            tenant_id = %tenant_id,
            subscription_id = %subscription.id,
            tier = %observed.tier,
            "Checkout completed, subscription state applied"
        );

        Ok(())
    }

    async fn handle_subscription_updated(&self, subscription: Subscription) -> BillingResult<()> {
        let customer_id = customer_id_of(&subscription);

        // Attribute by customer ref: subscription ids rotate across
        // cancel/resubscribe cycles, the customer does not
        let tenant_id = match self.records.find_tenant_by_customer(&customer_id).await? {
            Some(id) => id,
            None => {
                tracing::warn!(
                    customer_id = %customer_id,
                    subscription_id = %subscription.id,
                    "Subscription update for unknown customer - acknowledging"
                );
                return Ok(());
            }
        };

        if subscription.cancel_at_period_end {
            // Entitlement continues until the period lapses; the
            // deleted event performs the terminal reset
            tracing::info!(
                tenant_id = %tenant_id,
                subscription_id = %subscription.id,
                period_end = subscription.current_period_end,
                "Subscription set to cancel at period end; no tier change yet"
            );
            return Ok(());
        }

        let sub_service = SubscriptionService::new(self.stripe.clone(), self.records.clone());
        let observed = sub_service.observe(&subscription);
        self.records.apply_observed(tenant_id, &observed).await?;

        tracing::info!(
            tenant_id = %tenant_id,
            subscription_id = %subscription.id,
            tier = %observed.tier,
            "Subscription updated"
        );

        Ok(())
    }

    async fn handle_subscription_deleted(&self, subscription: Subscription) -> BillingResult<()> {
        let customer_id = customer_id_of(&subscription);

        let tenant_id = match self.records.find_tenant_by_customer(&customer_id).await? {
            Some(id) => id,
            None => {
                tracing::warn!(
                    customer_id = %customer_id,
                    subscription_id = %subscription.id,
                    "Subscription deletion for unknown customer - acknowledging"
                );
                return Ok(());
            }
        };

        self.records.reset_to_free(tenant_id).await?;

        tracing::info!(
            tenant_id = %tenant_id,
            subscription_id = %subscription.id,
            "Subscription deleted, tenant downgraded to free tier"
        );

        Ok(())
    }

    async fn handle_invoice_payment_failed(&self, invoice: Invoice) -> BillingResult<()> {
        // Operational visibility only; dunning is out of scope and no
        // state changes until Stripe cancels the subscription
        let customer = match &invoice.customer {
            Some(stripe::Expandable::Id(id)) => id.to_string(),
            Some(stripe::Expandable::Object(c)) => c.id.to_string(),
            None => "(none)".to_string(),
        };

        tracing::warn!(
            invoice_id = %invoice.id,
            customer_id = %customer,
            amount_due = invoice.amount_due,
            "Invoice payment failed"
        );

        Ok(())
    }

}
