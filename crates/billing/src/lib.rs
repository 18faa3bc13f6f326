// Billing crate clippy configuration
// These are intentional patterns in this crate:
#![allow(clippy::too_many_arguments)] // Some Stripe operations require many parameters
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Atelier Billing
//!
//! Subscription billing reconciliation for agency tenants, built on
//! Stripe. Three independent input channels (webhook deliveries,
//! post-checkout session polling, and agency-initiated plan changes)
//! converge on a single billing record per tenant through one
//! full-state upsert.
//!
//! ## Components
//!
//! - **Tier catalog**: static (tier, interval) ↔ Stripe price mapping
//! - **Billing records**: one row per tenant, tenant-keyed upsert
//! - **Checkout**: hosted sessions for subscribe/resubscribe
//! - **Subscriptions**: in-place prorated plan changes
//! - **Reconcile**: session polling fallback + the billing read path
//! - **Webhooks**: signed Stripe event processing
//! - **Portal**: hosted billing portal sessions
//! - **Invariants**: read-only consistency checks

pub mod checkout;
pub mod client;
pub mod error;
pub mod invariants;
pub mod portal;
pub mod reconcile;
pub mod records;
pub mod subscriptions;
pub mod tier;
pub mod webhooks;

#[cfg(test)]
mod edge_case_tests;

// Checkout
pub use checkout::{CheckoutResponse, CheckoutService, TenantProfile};

// Client
pub use client::{PriceCatalog, StripeClient, StripeConfig};

// Error
pub use error::{BillingError, BillingResult};

// Invariants
pub use invariants::{
    InvariantCheckSummary, InvariantChecker, InvariantViolation, ViolationSeverity,
};

// Portal
pub use portal::{PortalResponse, PortalService};

// Reconcile
pub use reconcile::{BillingInfo, ReconcileService};

// Records
pub use records::{BillingRecord, BillingRecordStore, ObservedSubscription};

// Subscriptions
pub use subscriptions::SubscriptionService;

// Tier
pub use tier::{BillingInterval, PlanTier};

// Webhooks
pub use webhooks::{verify_signature, WebhookHandler};

use sqlx::PgPool;

/// Main billing service that combines all billing functionality
pub struct BillingService {
    pub checkout: CheckoutService,
    pub portal: PortalService,
    pub reconcile: ReconcileService,
    pub records: BillingRecordStore,
    pub subscriptions: SubscriptionService,
    pub webhooks: WebhookHandler,
}

impl BillingService {
    /// Create a new billing service from environment variables
    pub fn from_env(pool: PgPool) -> BillingResult<Self> {
        let stripe = StripeClient::from_env()?;
        Ok(Self::with_client(stripe, pool))
    }

    /// Create a new billing service with explicit config
    pub fn new(config: StripeConfig, pool: PgPool) -> Self {
        Self::with_client(StripeClient::new(config), pool)
    }

    fn with_client(stripe: StripeClient, pool: PgPool) -> Self {
        let records = BillingRecordStore::new(pool);
        Self {
            checkout: CheckoutService::new(stripe.clone(), records.clone()),
            portal: PortalService::new(stripe.clone(), records.clone()),
            reconcile: ReconcileService::new(stripe.clone(), records.clone()),
            subscriptions: SubscriptionService::new(stripe.clone(), records.clone()),
            webhooks: WebhookHandler::new(stripe, records.clone()),
            records,
        }
    }
}
