//! Billing invariant checks
//!
//! Runnable consistency checks over the billing records. These can be
//! run after any mutation or webhook replay to confirm the system is
//! in a valid state. Checks only read, never write.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::BillingResult;

/// Result of running a single invariant check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantViolation {
    /// Which invariant was violated
    pub invariant: String,
    /// Tenant(s) affected
    pub tenant_ids: Vec<Uuid>,
    /// Human-readable description of the violation
    pub description: String,
    /// Severity level
    pub severity: ViolationSeverity,
}

/// Severity of an invariant violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationSeverity {
    /// Critical - a tenant may be charged or provisioned incorrectly
    Critical,
    /// High - data inconsistency that needs attention
    High,
    /// Medium - potential issue, should investigate
    Medium,
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationSeverity::Critical => write!(f, "CRITICAL"),
            ViolationSeverity::High => write!(f, "HIGH"),
            ViolationSeverity::Medium => write!(f, "MEDIUM"),
        }
    }
}

/// Summary of all invariant checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantCheckSummary {
    pub checked_at: OffsetDateTime,
    pub checks_run: usize,
    pub checks_passed: usize,
    pub checks_failed: usize,
    pub violations: Vec<InvariantViolation>,
    pub healthy: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct TenantTierRow {
    tenant_id: Uuid,
    tier: String,
}

#[derive(Debug, sqlx::FromRow)]
struct TenantSubRow {
    tenant_id: Uuid,
    stripe_subscription_id: Option<String>,
}

/// Service for running billing invariant checks
pub struct InvariantChecker {
    pool: PgPool,
}

impl InvariantChecker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run all invariant checks and return a summary
    pub async fn run_all_checks(&self) -> BillingResult<InvariantCheckSummary> {
        let now = OffsetDateTime::now_utc();
        let mut violations = Vec::new();

        violations.extend(self.check_paid_tier_has_subscription().await?);
        violations.extend(self.check_subscription_has_period_end().await?);
        violations.extend(self.check_paid_tier_has_customer().await?);
        violations.extend(self.check_freemium_not_expired().await?);

        let checks_run = 4;
        let checks_failed = violations
            .iter()
            .map(|v| &v.invariant)
            .collect::<std::collections::HashSet<_>>()
            .len();
        let checks_passed = checks_run - checks_failed;

        Ok(InvariantCheckSummary {
            checked_at: now,
            checks_run,
            checks_passed,
            checks_failed,
            healthy: violations.is_empty(),
            violations,
        })
    }

    /// Paid tier implies a subscription on file (unless the tenant is
    /// on a freemium override). A paid tier with no subscription means
    /// we are provisioning access nobody is paying for.
    async fn check_paid_tier_has_subscription(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<TenantTierRow> = sqlx::query_as(
            r#"
            SELECT tenant_id, tier
            FROM tenant_billing
            WHERE tier != 'free'
              AND (stripe_subscription_id IS NULL OR stripe_subscription_id = '')
              AND is_freemium = false
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "paid_tier_has_subscription".to_string(),
                tenant_ids: vec![row.tenant_id],
                description: format!(
                    "Tenant on tier '{}' has no subscription reference",
                    row.tier
                ),
                severity: ViolationSeverity::Critical,
            })
            .collect())
    }

    /// A subscription reference implies a known period end, otherwise
    /// we cannot tell when entitlement lapses
    async fn check_subscription_has_period_end(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<TenantSubRow> = sqlx::query_as(
            r#"
            SELECT tenant_id, stripe_subscription_id
            FROM tenant_billing
            WHERE stripe_subscription_id IS NOT NULL
              AND stripe_subscription_id != ''
              AND subscription_period_end IS NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "subscription_has_period_end".to_string(),
                tenant_ids: vec![row.tenant_id],
                description: format!(
                    "Subscription '{}' on file with no period end",
                    row.stripe_subscription_id.as_deref().unwrap_or("(none)")
                ),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Paid tiers should have a Stripe customer reference
    async fn check_paid_tier_has_customer(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<TenantTierRow> = sqlx::query_as(
            r#"
            SELECT tenant_id, tier
            FROM tenant_billing
            WHERE tier != 'free'
              AND stripe_customer_id IS NULL
              AND is_freemium = false
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "paid_tier_has_customer".to_string(),
                tenant_ids: vec![row.tenant_id],
                description: format!("Tenant on tier '{}' has no Stripe customer", row.tier),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// The freemium flag should be cleared once its expiry passes
    async fn check_freemium_not_expired(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<TenantTierRow> = sqlx::query_as(
            r#"
            SELECT tenant_id, tier
            FROM tenant_billing
            WHERE is_freemium = true
              AND freemium_expires_at IS NOT NULL
              AND freemium_expires_at < NOW()
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "freemium_not_expired".to_string(),
                tenant_ids: vec![row.tenant_id],
                description: "Freemium override still set past its expiry".to_string(),
                severity: ViolationSeverity::Medium,
            })
            .collect())
    }

    /// Run a single invariant check by name
    pub async fn run_check(&self, name: &str) -> BillingResult<Vec<InvariantViolation>> {
        match name {
            "paid_tier_has_subscription" => self.check_paid_tier_has_subscription().await,
            "subscription_has_period_end" => self.check_subscription_has_period_end().await,
            "paid_tier_has_customer" => self.check_paid_tier_has_customer().await,
            "freemium_not_expired" => self.check_freemium_not_expired().await,
            _ => Ok(vec![]),
        }
    }

    /// Get list of all available invariant checks
    pub fn available_checks() -> Vec<&'static str> {
        vec![
            "paid_tier_has_subscription",
            "subscription_has_period_end",
            "paid_tier_has_customer",
            "freemium_not_expired",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_severity_display() {
        assert_eq!(ViolationSeverity::Critical.to_string(), "CRITICAL");
        assert_eq!(ViolationSeverity::High.to_string(), "HIGH");
        assert_eq!(ViolationSeverity::Medium.to_string(), "MEDIUM");
    }

    #[test]
    fn test_available_checks() {
        let checks = InvariantChecker::available_checks();
        assert_eq!(checks.len(), 4);
        assert!(checks.contains(&"paid_tier_has_subscription"));
        assert!(checks.contains(&"freemium_not_expired"));
    }
}
