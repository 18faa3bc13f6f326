//! Plan tiers and billing intervals
//!
//! The tier stored on a tenant's billing record is always derived from
//! the price attached to the most recently observed subscription state.

use serde::{Deserialize, Serialize};

/// Subscription plan tier
/// Tier hierarchy: Free (no price) → Starter → Growth → Enterprise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    #[default]
    Free,
    Starter,
    Growth,
    Enterprise,
}

impl PlanTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Starter => "starter",
            PlanTier::Growth => "growth",
            PlanTier::Enterprise => "enterprise",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "free" => Some(Self::Free),
            "starter" => Some(Self::Starter),
            "growth" => Some(Self::Growth),
            "enterprise" => Some(Self::Enterprise),
            _ => None,
        }
    }

    /// Whether this tier carries a paid subscription
    pub fn is_paid(&self) -> bool {
        !matches!(self, PlanTier::Free)
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Billing interval for subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BillingInterval {
    #[default]
    Month,
    Year,
}

impl BillingInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingInterval::Month => "month",
            BillingInterval::Year => "year",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "month" | "monthly" => Some(Self::Month),
            "year" | "yearly" | "annual" => Some(Self::Year),
            _ => None,
        }
    }
}

impl std::fmt::Display for BillingInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_round_trip() {
        for tier in [
            PlanTier::Free,
            PlanTier::Starter,
            PlanTier::Growth,
            PlanTier::Enterprise,
        ] {
            assert_eq!(PlanTier::from_str(tier.as_str()), Some(tier));
        }
    }

    #[test]
    fn test_tier_default_is_free() {
        assert_eq!(PlanTier::default(), PlanTier::Free);
        assert!(!PlanTier::Free.is_paid());
        assert!(PlanTier::Growth.is_paid());
    }

    #[test]
    fn test_tier_unknown_string() {
        assert_eq!(PlanTier::from_str("platinum"), None);
        assert_eq!(PlanTier::from_str(""), None);
    }

    #[test]
    fn test_interval_aliases() {
        assert_eq!(BillingInterval::from_str("month"), Some(BillingInterval::Month));
        assert_eq!(BillingInterval::from_str("monthly"), Some(BillingInterval::Month));
        assert_eq!(BillingInterval::from_str("year"), Some(BillingInterval::Year));
        assert_eq!(BillingInterval::from_str("annual"), Some(BillingInterval::Year));
        assert_eq!(BillingInterval::from_str("weekly"), None);
    }

    #[test]
    fn test_serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&PlanTier::Growth).ok().as_deref(),
            Some("\"growth\"")
        );
        assert_eq!(
            serde_json::to_string(&BillingInterval::Year).ok().as_deref(),
            Some("\"year\"")
        );
    }
}
