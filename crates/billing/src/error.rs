//! Billing error types

use thiserror::Error;
use uuid::Uuid;

use crate::tier::{BillingInterval, PlanTier};

/// Errors produced by the billing crate
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Tier/interval pair has no price mapped in the catalog.
    /// Surfaced to the caller, never silently defaulted.
    #[error("No price configured for tier '{tier}' with {interval}ly billing")]
    PriceNotConfigured {
        tier: PlanTier,
        interval: BillingInterval,
    },

    /// Upgrade requested for a tenant with no subscription on file
    #[error("No active subscription - use the checkout flow to subscribe")]
    SubscriptionRequired,

    /// Upgrade requested to the price the tenant is already on
    #[error("Already subscribed to the '{0}' plan")]
    AlreadyOnPlan(String),

    #[error("No billing record found for tenant {0}")]
    TenantNotFound(Uuid),

    #[error("Webhook signature verification failed")]
    WebhookSignatureInvalid,

    #[error("Stripe API error: {0}")]
    StripeApi(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<stripe::StripeError> for BillingError {
    fn from(e: stripe::StripeError) -> Self {
        BillingError::StripeApi(e.to_string())
    }
}

impl From<sqlx::Error> for BillingError {
    fn from(e: sqlx::Error) -> Self {
        BillingError::Database(e.to_string())
    }
}

pub type BillingResult<T> = Result<T, BillingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_not_configured_message() {
        let err = BillingError::PriceNotConfigured {
            tier: PlanTier::Growth,
            interval: BillingInterval::Year,
        };
        assert_eq!(
            err.to_string(),
            "No price configured for tier 'growth' with yearly billing"
        );
    }

    #[test]
    fn test_already_on_plan_message() {
        let err = BillingError::AlreadyOnPlan("starter".to_string());
        assert!(err.to_string().contains("starter"));
    }
}
