//! Stripe client configuration and the tier/price catalog

use stripe::Client;

use crate::error::{BillingError, BillingResult};
use crate::tier::{BillingInterval, PlanTier};

/// Configuration for Stripe billing
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Stripe secret API key
    pub secret_key: String,
    /// Signing secret for the billing webhook stream
    pub webhook_secret: String,
    /// Price IDs per tier and billing interval
    pub prices: PriceCatalog,
    /// Base URL for success/cancel/return redirects
    pub app_base_url: String,
}

/// Static bidirectional mapping between (tier, interval) and Stripe
/// price IDs. Resolved once at startup and passed by reference; no
/// ambient global state.
#[derive(Debug, Clone, Default)]
pub struct PriceCatalog {
    pub starter_month: Option<String>,
    pub starter_year: Option<String>,
    pub growth_month: Option<String>,
    pub growth_year: Option<String>,
    pub enterprise_month: Option<String>,
    pub enterprise_year: Option<String>,
}

impl PriceCatalog {
    /// Forward lookup. `None` means "not configured" and is surfaced by
    /// callers as a configuration error, never silently defaulted.
    /// Free has no price by definition.
    pub fn price_id_for(&self, tier: PlanTier, interval: BillingInterval) -> Option<&str> {
        let slot = match (tier, interval) {
            (PlanTier::Free, _) => &None,
            (PlanTier::Starter, BillingInterval::Month) => &self.starter_month,
            (PlanTier::Starter, BillingInterval::Year) => &self.starter_year,
            (PlanTier::Growth, BillingInterval::Month) => &self.growth_month,
            (PlanTier::Growth, BillingInterval::Year) => &self.growth_year,
            (PlanTier::Enterprise, BillingInterval::Month) => &self.enterprise_month,
            (PlanTier::Enterprise, BillingInterval::Year) => &self.enterprise_year,
        };
        slot.as_deref()
    }

    /// Reverse lookup. Unrecognized prices map to Free rather than an
    /// error so that billing display never breaks on a price this
    /// deployment does not know about.
    pub fn tier_for_price_id(&self, price_id: &str) -> PlanTier {
        let pairs = [
            (&self.starter_month, PlanTier::Starter),
            (&self.starter_year, PlanTier::Starter),
            (&self.growth_month, PlanTier::Growth),
            (&self.growth_year, PlanTier::Growth),
            (&self.enterprise_month, PlanTier::Enterprise),
            (&self.enterprise_year, PlanTier::Enterprise),
        ];
        for (slot, tier) in pairs {
            if slot.as_deref() == Some(price_id) {
                return tier;
            }
        }
        PlanTier::Free
    }

    /// All (tier, interval) pairs that have a price configured
    pub fn configured_pairs(&self) -> Vec<(PlanTier, BillingInterval)> {
        let all = [
            (PlanTier::Starter, BillingInterval::Month),
            (PlanTier::Starter, BillingInterval::Year),
            (PlanTier::Growth, BillingInterval::Month),
            (PlanTier::Growth, BillingInterval::Year),
            (PlanTier::Enterprise, BillingInterval::Month),
            (PlanTier::Enterprise, BillingInterval::Year),
        ];
        all.into_iter()
            .filter(|(t, i)| self.price_id_for(*t, *i).is_some())
            .collect()
    }
}

impl StripeConfig {
    /// Create config from environment variables
    pub fn from_env() -> BillingResult<Self> {
        Ok(Self {
            secret_key: std::env::var("STRIPE_SECRET_KEY")
                .map_err(|_| BillingError::Config("STRIPE_SECRET_KEY not set".to_string()))?,
            // A distinct secret may be configured for the billing event
            // stream vs. other webhook streams from the same account
            webhook_secret: std::env::var("STRIPE_BILLING_WEBHOOK_SECRET")
                .or_else(|_| std::env::var("STRIPE_WEBHOOK_SECRET"))
                .map_err(|_| {
                    BillingError::Config("STRIPE_BILLING_WEBHOOK_SECRET not set".to_string())
                })?,
            prices: PriceCatalog {
                starter_month: std::env::var("STRIPE_PRICE_STARTER_MONTH").ok(),
                starter_year: std::env::var("STRIPE_PRICE_STARTER_YEAR").ok(),
                growth_month: std::env::var("STRIPE_PRICE_GROWTH_MONTH").ok(),
                growth_year: std::env::var("STRIPE_PRICE_GROWTH_YEAR").ok(),
                enterprise_month: std::env::var("STRIPE_PRICE_ENTERPRISE_MONTH").ok(),
                enterprise_year: std::env::var("STRIPE_PRICE_ENTERPRISE_YEAR").ok(),
            },
            app_base_url: std::env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
        })
    }

    /// Forward lookup that surfaces a missing mapping as an error
    pub fn require_price_id(
        &self,
        tier: PlanTier,
        interval: BillingInterval,
    ) -> BillingResult<&str> {
        self.prices
            .price_id_for(tier, interval)
            .ok_or(BillingError::PriceNotConfigured { tier, interval })
    }
}

/// Stripe billing client
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    config: StripeConfig,
}

impl StripeClient {
    /// Create a new Stripe client from config
    pub fn new(config: StripeConfig) -> Self {
        let client = Client::new(&config.secret_key);
        Self { client, config }
    }

    /// Create a new Stripe client from environment variables
    pub fn from_env() -> BillingResult<Self> {
        let config = StripeConfig::from_env()?;
        Ok(Self::new(config))
    }

    /// Get the inner Stripe client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Get the config
    pub fn config(&self) -> &StripeConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn fixture_catalog() -> PriceCatalog {
        PriceCatalog {
            starter_month: Some("price_starter_m".to_string()),
            starter_year: Some("price_starter_y".to_string()),
            growth_month: Some("price_growth_m".to_string()),
            growth_year: Some("price_growth_y".to_string()),
            enterprise_month: Some("price_ent_m".to_string()),
            enterprise_year: None,
        }
    }

    #[test]
    fn test_forward_and_reverse_are_inverses() {
        let catalog = fixture_catalog();
        for (tier, interval) in catalog.configured_pairs() {
            let price_id = catalog.price_id_for(tier, interval).unwrap();
            assert_eq!(
                catalog.tier_for_price_id(price_id),
                tier,
                "tier_for_price_id(price_id_for({tier}, {interval})) must round-trip"
            );
        }
    }

    #[test]
    fn test_unknown_price_defaults_to_free() {
        let catalog = fixture_catalog();
        assert_eq!(catalog.tier_for_price_id("price_unknown"), PlanTier::Free);
        assert_eq!(catalog.tier_for_price_id(""), PlanTier::Free);
    }

    #[test]
    fn test_free_has_no_price() {
        let catalog = fixture_catalog();
        assert_eq!(catalog.price_id_for(PlanTier::Free, BillingInterval::Month), None);
        assert_eq!(catalog.price_id_for(PlanTier::Free, BillingInterval::Year), None);
    }

    #[test]
    fn test_unconfigured_pair_is_error() {
        let config = StripeConfig {
            secret_key: "sk_test".to_string(),
            webhook_secret: "whsec_test".to_string(),
            prices: fixture_catalog(),
            app_base_url: "http://localhost:3000".to_string(),
        };
        let err = config
            .require_price_id(PlanTier::Enterprise, BillingInterval::Year)
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::BillingError::PriceNotConfigured {
                tier: PlanTier::Enterprise,
                interval: BillingInterval::Year,
            }
        ));
    }

    #[test]
    #[serial]
    fn test_from_env_requires_secret_key() {
        std::env::remove_var("STRIPE_SECRET_KEY");
        std::env::remove_var("STRIPE_BILLING_WEBHOOK_SECRET");
        std::env::remove_var("STRIPE_WEBHOOK_SECRET");
        assert!(StripeConfig::from_env().is_err());
    }

    #[test]
    #[serial]
    fn test_from_env_accepts_stream_specific_secret() {
        std::env::set_var("STRIPE_SECRET_KEY", "sk_test_123");
        std::env::remove_var("STRIPE_WEBHOOK_SECRET");
        std::env::set_var("STRIPE_BILLING_WEBHOOK_SECRET", "whsec_billing");
        let config = StripeConfig::from_env().unwrap();
        assert_eq!(config.webhook_secret, "whsec_billing");
        std::env::remove_var("STRIPE_SECRET_KEY");
        std::env::remove_var("STRIPE_BILLING_WEBHOOK_SECRET");
    }
}
