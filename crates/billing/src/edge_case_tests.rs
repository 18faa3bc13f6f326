// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge case tests for the billing reconciliation engine
//!
//! Covers boundary conditions in:
//! - Tier catalog lookups
//! - Observed-state projection (the input to the convergent upsert)
//! - Billing info read projection

#[cfg(test)]
mod catalog_tests {
    use crate::client::{PriceCatalog, StripeConfig};
    use crate::error::BillingError;
    use crate::tier::{BillingInterval, PlanTier};

    fn full_catalog() -> PriceCatalog {
        PriceCatalog {
            starter_month: Some("price_1Starter_m".to_string()),
            starter_year: Some("price_1Starter_y".to_string()),
            growth_month: Some("price_1Growth_m".to_string()),
            growth_year: Some("price_1Growth_y".to_string()),
            enterprise_month: Some("price_1Ent_m".to_string()),
            enterprise_year: Some("price_1Ent_y".to_string()),
        }
    }

    // =========================================================================
    // Every configured (tier, interval) pair must round-trip
    // =========================================================================
    #[test]
    fn test_catalog_round_trip_all_pairs() {
        let catalog = full_catalog();
        let pairs = catalog.configured_pairs();
        assert_eq!(pairs.len(), 6, "fixture configures all six pairs");
        for (tier, interval) in pairs {
            let price = catalog.price_id_for(tier, interval).unwrap();
            assert_eq!(catalog.tier_for_price_id(price), tier);
        }
    }

    // =========================================================================
    // Month and year prices for the same tier map back to the same tier
    // =========================================================================
    #[test]
    fn test_both_intervals_map_to_same_tier() {
        let catalog = full_catalog();
        assert_eq!(catalog.tier_for_price_id("price_1Growth_m"), PlanTier::Growth);
        assert_eq!(catalog.tier_for_price_id("price_1Growth_y"), PlanTier::Growth);
    }

    // =========================================================================
    // Empty catalog: every forward lookup is a configuration error,
    // every reverse lookup falls back to free
    // =========================================================================
    #[test]
    fn test_empty_catalog() {
        let config = StripeConfig {
            secret_key: "sk_test".to_string(),
            webhook_secret: "whsec_test".to_string(),
            prices: PriceCatalog::default(),
            app_base_url: "http://localhost:3000".to_string(),
        };
        for tier in [PlanTier::Starter, PlanTier::Growth, PlanTier::Enterprise] {
            for interval in [BillingInterval::Month, BillingInterval::Year] {
                assert!(matches!(
                    config.require_price_id(tier, interval),
                    Err(BillingError::PriceNotConfigured { .. })
                ));
            }
        }
        assert_eq!(config.prices.tier_for_price_id("price_anything"), PlanTier::Free);
    }

    // =========================================================================
    // Partially configured catalog only reports configured pairs
    // =========================================================================
    #[test]
    fn test_partial_catalog_configured_pairs() {
        let catalog = PriceCatalog {
            growth_month: Some("price_g_m".to_string()),
            ..Default::default()
        };
        assert_eq!(
            catalog.configured_pairs(),
            vec![(PlanTier::Growth, BillingInterval::Month)]
        );
    }
}

#[cfg(test)]
mod projection_tests {
    use crate::client::PriceCatalog;
    use crate::records::ObservedSubscription;
    use crate::tier::PlanTier;
    use time::OffsetDateTime;

    fn catalog() -> PriceCatalog {
        PriceCatalog {
            starter_month: Some("price_starter_m".to_string()),
            growth_year: Some("price_growth_y".to_string()),
            ..Default::default()
        }
    }

    // =========================================================================
    // The projection is a pure function of one coherent read: webhook
    // and session-poll paths deriving from the same subscription state
    // produce identical target states, so the upsert converges
    // regardless of which path runs first (or runs twice).
    // =========================================================================
    #[test]
    fn test_projection_convergence_across_paths() {
        let from_webhook = ObservedSubscription::derive(
            &catalog(),
            "cus_agency",
            "sub_abc",
            Some("price_growth_y"),
            1_893_456_000,
        );
        let from_session_poll = ObservedSubscription::derive(
            &catalog(),
            "cus_agency",
            "sub_abc",
            Some("price_growth_y"),
            1_893_456_000,
        );
        assert_eq!(from_webhook, from_session_poll);
        assert_eq!(from_webhook.tier, PlanTier::Growth);
    }

    // =========================================================================
    // A yearly subscription created now carries a period end about one
    // year out
    // =========================================================================
    #[test]
    fn test_period_end_preserved_exactly() {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let one_year_out = now + 365 * 24 * 60 * 60;
        let observed = ObservedSubscription::derive(
            &catalog(),
            "cus_agency",
            "sub_abc",
            Some("price_growth_y"),
            one_year_out,
        );
        let period_end = observed.period_end.unwrap();
        assert_eq!(period_end.unix_timestamp(), one_year_out);
        let days_out = (period_end - OffsetDateTime::now_utc()).whole_days();
        assert!((360..=366).contains(&days_out));
    }

    // =========================================================================
    // Out-of-range timestamps degrade to no period end, not a panic
    // =========================================================================
    #[test]
    fn test_unrepresentable_period_end_is_none() {
        let observed = ObservedSubscription::derive(
            &catalog(),
            "cus_agency",
            "sub_abc",
            Some("price_starter_m"),
            i64::MAX,
        );
        assert!(observed.period_end.is_none());
    }

    // =========================================================================
    // A plan change observed via webhook replaces the tier wholesale
    // =========================================================================
    #[test]
    fn test_plan_change_projects_new_tier() {
        let before = ObservedSubscription::derive(
            &catalog(),
            "cus_agency",
            "sub_abc",
            Some("price_starter_m"),
            1_893_456_000,
        );
        let after = ObservedSubscription::derive(
            &catalog(),
            "cus_agency",
            "sub_abc",
            Some("price_growth_y"),
            1_896_048_000,
        );
        assert_eq!(before.tier, PlanTier::Starter);
        assert_eq!(after.tier, PlanTier::Growth);
        // Same subscription id throughout an in-place price swap
        assert_eq!(before.subscription_id, after.subscription_id);
    }
}

#[cfg(test)]
mod billing_info_tests {
    use crate::records::BillingRecord;
    use crate::reconcile::BillingInfo;
    use crate::tier::PlanTier;
    use uuid::Uuid;

    fn free_record() -> BillingRecord {
        BillingRecord {
            tenant_id: Uuid::new_v4(),
            tier: "free".to_string(),
            stripe_customer_id: None,
            stripe_subscription_id: None,
            subscription_period_end: None,
            is_freemium: false,
            freemium_expires_at: None,
        }
    }

    // =========================================================================
    // A freshly provisioned tenant projects as free with no
    // subscription fields
    // =========================================================================
    #[test]
    fn test_default_record_projection() {
        let info: BillingInfo = free_record().into();
        assert_eq!(info.tier, PlanTier::Free);
        assert!(info.subscription_id.is_none());
        assert!(info.subscription_period_end.is_none());
        assert!(info.customer_id.is_none());
        assert!(!info.is_freemium);
    }

    // =========================================================================
    // The terminal reset shape: free tier with subscription fields
    // cleared but the customer reference retained for resubscribes
    // =========================================================================
    #[test]
    fn test_post_cancellation_projection_keeps_customer() {
        let mut record = free_record();
        record.stripe_customer_id = Some("cus_kept".to_string());
        let info: BillingInfo = record.into();
        assert_eq!(info.tier, PlanTier::Free);
        assert!(info.subscription_id.is_none());
        assert_eq!(info.customer_id.as_deref(), Some("cus_kept"));
    }

    // =========================================================================
    // Freemium override is carried through the read path untouched,
    // independent of the stored tier
    // =========================================================================
    #[test]
    fn test_freemium_override_independent_of_tier() {
        let mut record = free_record();
        record.is_freemium = true;
        let info: BillingInfo = record.into();
        assert_eq!(info.tier, PlanTier::Free);
        assert!(info.is_freemium);
    }
}
