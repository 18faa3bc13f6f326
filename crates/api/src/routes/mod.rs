//! HTTP route definitions

pub mod billing;

use axum::{
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use crate::{auth, state::AppState};

/// Build the application router
pub fn create_router(state: AppState) -> Router {
    // Tenant-scoped billing surface; identity arrives from the gateway
    let tenant_routes = Router::new()
        .route("/billing", get(billing::get_billing_info))
        .route("/billing/checkout", post(billing::create_checkout))
        .route("/billing/upgrade", post(billing::upgrade_subscription))
        .route("/billing/portal", post(billing::create_portal))
        .route_layer(middleware::from_fn(auth::tenant_context));

    Router::new()
        .route("/health", get(health))
        // Stripe calls this directly; authenticated by signature, not
        // by tenant headers
        .route("/billing/webhook", post(billing::webhook))
        // Only routed on the internal network; used by ops tooling
        // after webhook replays or manual corrections
        .route(
            "/internal/billing/invariants",
            get(billing::run_invariant_checks),
        )
        .merge(tenant_routes)
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
