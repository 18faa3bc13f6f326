//! API error types and HTTP response mapping

use atelier_billing::BillingError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errors surfaced by API handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Missing tenant context")]
    MissingTenant,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Billing service unavailable")]
    ServiceUnavailable,

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            // Caller picked a plan this deployment does not sell
            BillingError::PriceNotConfigured { .. } => Self::BadRequest(err.to_string()),
            BillingError::WebhookSignatureInvalid => Self::BadRequest(err.to_string()),
            BillingError::SubscriptionRequired | BillingError::AlreadyOnPlan(_) => {
                Self::Conflict(err.to_string())
            }
            BillingError::TenantNotFound(id) => Self::NotFound(format!("tenant {id}")),
            // Upstream/internal failures: log the detail, return a
            // generic message so Stripe and database internals never
            // leak to clients
            BillingError::Config(_)
            | BillingError::StripeApi(_)
            | BillingError::Database(_)
            | BillingError::Internal(_) => {
                tracing::error!(error = %err, "Billing operation failed");
                Self::Internal(anyhow::anyhow!("billing operation failed"))
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::MissingTenant => (
                StatusCode::UNAUTHORIZED,
                "Missing tenant context".to_string(),
            ),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            Self::ServiceUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Billing service unavailable".to_string(),
            ),
            Self::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_billing::{BillingInterval, PlanTier};

    #[test]
    fn test_precondition_failures_map_to_conflict() {
        let err: ApiError = BillingError::SubscriptionRequired.into();
        assert!(matches!(err, ApiError::Conflict(_)));

        let err: ApiError = BillingError::AlreadyOnPlan("price_123".to_string()).into();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[test]
    fn test_unconfigured_price_maps_to_bad_request() {
        let err: ApiError = BillingError::PriceNotConfigured {
            tier: PlanTier::Enterprise,
            interval: BillingInterval::Year,
        }
        .into();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn test_webhook_path_reserves_400_for_signature_failure() {
        // The notification endpoint answers 400 only when the
        // signature does not verify; verified events that cannot be
        // processed either ack (handled inside the billing crate) or
        // surface a retryable 500.
        let err: ApiError = BillingError::WebhookSignatureInvalid.into();
        assert!(matches!(err, ApiError::BadRequest(_)));

        let err: ApiError = BillingError::Database("connection reset".to_string()).into();
        assert!(matches!(err, ApiError::Internal(_)));

        let err: ApiError = BillingError::StripeApi("rate limited".to_string()).into();
        assert!(matches!(err, ApiError::Internal(_)));
    }

    #[test]
    fn test_internal_failures_do_not_leak_detail() {
        let err: ApiError = BillingError::Config("STRIPE_SECRET_KEY not set".to_string()).into();
        match err {
            ApiError::Internal(inner) => {
                assert!(!inner.to_string().contains("STRIPE_SECRET_KEY"));
            }
            other => panic!("expected Internal, got {other:?}"),
        }
    }
}
