//! Tenant context extraction
//!
//! The API sits behind the platform gateway, which authenticates the
//! caller and forwards the resolved tenant identity in trusted
//! headers. This module turns those headers into an [`AuthTenant`]
//! extension for billing handlers; it does not perform authentication
//! itself.

use axum::{
    extract::Request,
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::error::ApiError;

const TENANT_ID_HEADER: &str = "x-tenant-id";
const TENANT_SLUG_HEADER: &str = "x-tenant-slug";
const TENANT_EMAIL_HEADER: &str = "x-tenant-email";
const TENANT_NAME_HEADER: &str = "x-tenant-name";

/// The tenant on whose behalf a billing request runs
#[derive(Debug, Clone)]
pub struct AuthTenant {
    pub tenant_id: Uuid,
    pub slug: String,
    pub email: String,
    pub name: String,
}

impl AuthTenant {
    /// Parse the gateway headers. Id and slug are required; email and
    /// name are used for Stripe customer creation and may be empty.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let tenant_id = headers
            .get(TENANT_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s).ok())?;
        let slug = headers
            .get(TENANT_SLUG_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|s| !s.is_empty())?
            .to_string();
        let email = headers
            .get(TENANT_EMAIL_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let name = headers
            .get(TENANT_NAME_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        Some(Self {
            tenant_id,
            slug,
            email,
            name,
        })
    }
}

/// Middleware that requires a tenant context on the request
pub async fn tenant_context(mut request: Request, next: Next) -> Result<Response, ApiError> {
    let tenant = AuthTenant::from_headers(request.headers()).ok_or_else(|| {
        tracing::warn!(
            path = %request.uri().path(),
            "Request missing tenant identity headers"
        );
        ApiError::MissingTenant
    })?;

    request.extensions_mut().insert(tenant);
    Ok(next.run(request).await)
}
