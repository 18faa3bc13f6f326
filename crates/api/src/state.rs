//! Application state

use sqlx::PgPool;
use std::sync::Arc;

use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    /// Billing service (None when Stripe is not configured)
    pub billing: Option<Arc<atelier_billing::BillingService>>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        // Billing comes up only if the Stripe env vars are present;
        // a deployment without them still serves everything else
        let billing = match atelier_billing::BillingService::from_env(pool.clone()) {
            Ok(svc) => {
                tracing::info!("Stripe billing service initialized");
                Some(Arc::new(svc))
            }
            Err(e) => {
                tracing::warn!("Stripe billing not configured: {}", e);
                None
            }
        };

        Self {
            pool,
            config,
            billing,
        }
    }
}
