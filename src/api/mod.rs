//! HTTP API for the Trust Registry
//!
//! Provides:
//! - Registry API (enroll, reputation adjustment, client reads, events)
//! - Security middleware (caller authentication, rate limiting, headers)

pub mod middleware;
pub mod registry;

use axum::{Router, middleware as axum_middleware, routing::get};
use tower_http::trace::TraceLayer;

pub use middleware::{
    RateLimiter, SecurityMiddlewareConfig, SecurityState, auth_middleware, body_size_middleware,
    rate_limit_middleware, sanitize_for_log, security_headers_middleware,
};
pub use registry::{RegistryApiState, create_router as create_registry_router};

/// Assemble the full application router with security layers applied
pub fn build_app(registry_state: RegistryApiState, security_state: SecurityState) -> Router {
    Router::new()
        .merge(create_registry_router(registry_state))
        .route("/health", get(|| async { "OK" }))
        // Later layers wrap earlier ones
        .layer(axum_middleware::from_fn_with_state(
            security_state.clone(),
            body_size_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(
            security_state.clone(),
            auth_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(
            security_state,
            rate_limit_middleware,
        ))
        .layer(axum_middleware::from_fn(security_headers_middleware))
        .layer(TraceLayer::new_for_http())
}
