//! Billing routes for Stripe integration

use axum::{
    extract::{Extension, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;

use atelier_billing::{BillingInterval, PlanTier, TenantProfile};

use crate::{auth::AuthTenant, error::ApiError, state::AppState};

/// Request to create a checkout session
#[derive(Debug, Deserialize)]
pub struct CreateCheckoutRequest {
    pub tier: String,
    /// Billing interval (month or year); defaults to month
    pub interval: Option<String>,
}

/// Response from creating a checkout session
#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: Option<String>,
}

/// Request to upgrade an existing subscription in place
#[derive(Debug, Deserialize)]
pub struct UpgradeRequest {
    pub tier: String,
    pub interval: Option<String>,
}

/// Response from an in-place subscription upgrade
#[derive(Debug, Serialize)]
pub struct UpgradeResponse {
    pub subscription_id: String,
    pub tier: String,
    pub interval: String,
    pub message: String,
}

/// Response from creating a portal session
#[derive(Debug, Serialize)]
pub struct PortalResponse {
    pub portal_url: String,
}

/// Query parameters for the billing info endpoint
#[derive(Debug, Deserialize)]
pub struct BillingInfoQuery {
    /// Checkout session ref returned on the success redirect; triggers
    /// a best-effort reconciliation before the read
    pub session_id: Option<String>,
}

/// Tenant billing state as served to the dashboard
#[derive(Debug, Serialize)]
pub struct BillingInfoResponse {
    pub tier: String,
    pub has_subscription: bool,
    pub subscription_id: Option<String>,
    pub customer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_period_end: Option<String>,
    pub is_freemium: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freemium_expires_at: Option<String>,
}

impl From<atelier_billing::BillingInfo> for BillingInfoResponse {
    fn from(info: atelier_billing::BillingInfo) -> Self {
        Self {
            tier: info.tier.as_str().to_string(),
            has_subscription: info.subscription_id.is_some(),
            subscription_id: info.subscription_id,
            customer_id: info.customer_id,
            subscription_period_end: info
                .subscription_period_end
                .and_then(|t| t.format(&Rfc3339).ok()),
            is_freemium: info.is_freemium,
            freemium_expires_at: info.freemium_expires_at.and_then(|t| t.format(&Rfc3339).ok()),
        }
    }
}

fn parse_plan(tier: &str, interval: Option<&str>) -> Result<(PlanTier, BillingInterval), ApiError> {
    let tier = PlanTier::from_str(tier)
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown tier '{}'", tier)))?;
    if !tier.is_paid() {
        return Err(ApiError::BadRequest(
            "The free tier has no checkout".to_string(),
        ));
    }
    let interval = match interval {
        Some(s) => BillingInterval::from_str(s)
            .ok_or_else(|| ApiError::BadRequest(format!("Unknown billing interval '{}'", s)))?,
        None => BillingInterval::default(),
    };
    Ok((tier, interval))
}

/// Create a hosted checkout session for a new subscription
pub async fn create_checkout(
    State(state): State<AppState>,
    Extension(tenant): Extension<AuthTenant>,
    Json(req): Json<CreateCheckoutRequest>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let billing = state.billing.as_ref().ok_or(ApiError::ServiceUnavailable)?;
    let (tier, interval) = parse_plan(&req.tier, req.interval.as_deref())?;

    let profile = TenantProfile {
        tenant_id: tenant.tenant_id,
        slug: tenant.slug.clone(),
        email: tenant.email.clone(),
        name: tenant.name.clone(),
    };

    tracing::info!(
        tenant_id = %tenant.tenant_id,
        tier = %tier,
        interval = %interval,
        "Creating checkout session"
    );

    let session = billing
        .checkout
        .create_subscription_checkout(&profile, tier, interval)
        .await?;

    Ok(Json(CheckoutResponse {
        session_id: session.session_id,
        url: session.url,
    }))
}

/// Upgrade an existing subscription in place with proration
pub async fn upgrade_subscription(
    State(state): State<AppState>,
    Extension(tenant): Extension<AuthTenant>,
    Json(req): Json<UpgradeRequest>,
) -> Result<Json<UpgradeResponse>, ApiError> {
    let billing = state.billing.as_ref().ok_or(ApiError::ServiceUnavailable)?;
    let (tier, interval) = parse_plan(&req.tier, req.interval.as_deref())?;

    let subscription = billing
        .subscriptions
        .upgrade_subscription(tenant.tenant_id, tier, interval)
        .await?;

    Ok(Json(UpgradeResponse {
        subscription_id: subscription.id.to_string(),
        tier: tier.as_str().to_string(),
        interval: interval.as_str().to_string(),
        message: "Plan change submitted; the new tier takes effect once Stripe confirms it"
            .to_string(),
    }))
}

/// Create a billing portal session for self-service management
pub async fn create_portal(
    State(state): State<AppState>,
    Extension(tenant): Extension<AuthTenant>,
) -> Result<Json<PortalResponse>, ApiError> {
    let billing = state.billing.as_ref().ok_or(ApiError::ServiceUnavailable)?;

    let session = billing
        .portal
        .create_portal_session(tenant.tenant_id, &tenant.slug)
        .await?;

    Ok(Json(PortalResponse {
        portal_url: session.url,
    }))
}

/// Get the tenant's current billing state
pub async fn get_billing_info(
    State(state): State<AppState>,
    Extension(tenant): Extension<AuthTenant>,
    Query(query): Query<BillingInfoQuery>,
) -> Result<Json<BillingInfoResponse>, ApiError> {
    let billing = state.billing.as_ref().ok_or(ApiError::ServiceUnavailable)?;

    let info = billing
        .reconcile
        .get_billing_info(tenant.tenant_id, query.session_id.as_deref())
        .await?;

    Ok(Json(info.into()))
}

/// Handle Stripe webhook events
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<StatusCode, ApiError> {
    tracing::info!(body_len = body.len(), "Stripe webhook received");

    let billing = state.billing.as_ref().ok_or(ApiError::ServiceUnavailable)?;

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Stripe webhook missing signature header");
            ApiError::BadRequest("Missing Stripe signature".to_string())
        })?;

    let event = billing
        .webhooks
        .verify_event(&body, signature)
        .map_err(|e| {
            tracing::warn!(error = ?e, "Stripe webhook signature verification failed");
            ApiError::BadRequest("Invalid webhook signature".to_string())
        })?;

    tracing::info!(
        event_type = %event.type_,
        event_id = %event.id,
        "Stripe webhook event verified"
    );

    // Errors here make Stripe redeliver; attribution failures are
    // already swallowed inside the handler since a retry cannot fix
    // them
    billing.webhooks.handle_event(event).await?;

    Ok(StatusCode::OK)
}

/// Run the billing invariant checks and report violations
pub async fn run_invariant_checks(
    State(state): State<AppState>,
) -> Result<Json<atelier_billing::InvariantCheckSummary>, ApiError> {
    let checker = atelier_billing::InvariantChecker::new(state.pool.clone());
    let summary = checker.run_all_checks().await?;

    if !summary.healthy {
        tracing::warn!(
            checks_failed = summary.checks_failed,
            violations = summary.violations.len(),
            "Billing invariant violations detected"
        );
    }

    Ok(Json(summary))
}
