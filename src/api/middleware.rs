//! Security Middleware for the Registry API
//!
//! Provides:
//! - API key authentication, resolving each key to its bound caller identity
//! - Rate limiting per IP
//! - Request size limits
//! - Security headers

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::registry::{Caller, Identity};

/// Security configuration for middleware
#[derive(Debug, Clone)]
pub struct SecurityMiddlewareConfig {
    /// Enable API key authentication
    pub enable_auth: bool,
    /// API key -> authenticated caller
    pub api_keys: HashMap<String, Caller>,
    /// Rate limit: requests per minute per IP
    pub rate_limit_per_minute: u32,
    /// Maximum request body size in bytes
    pub max_request_size: usize,
    /// Sanitize sensitive data in logs
    pub sanitize_logs: bool,
    /// Paths that don't require authentication
    pub public_paths: Vec<String>,
}

impl SecurityMiddlewareConfig {
    /// Bind each API key to the caller identity it authenticates as
    pub fn with_api_key_bindings(mut self, bindings: &HashMap<String, String>) -> Self {
        self.api_keys = bindings
            .iter()
            .map(|(key, identity)| {
                (
                    key.clone(),
                    Caller::authenticated(Identity::new(identity.clone())),
                )
            })
            .collect();
        self
    }
}

impl Default for SecurityMiddlewareConfig {
    fn default() -> Self {
        Self {
            enable_auth: true,
            api_keys: HashMap::new(),
            rate_limit_per_minute: 60,
            max_request_size: 1024 * 1024, // 1MB
            sanitize_logs: true,
            public_paths: vec!["/health".to_string()],
        }
    }
}

/// Rate limiter state - tracks requests per IP
#[derive(Debug)]
pub struct RateLimiter {
    /// Map of IP -> (request count, window start)
    requests: DashMap<String, (u32, Instant)>,
    /// Requests allowed per window
    limit: u32,
    /// Window duration
    window: Duration,
}

impl RateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            requests: DashMap::new(),
            limit: requests_per_minute,
            window: Duration::from_secs(60),
        }
    }

    /// Check if request is allowed and update counter
    /// Returns (allowed, remaining, reset_after_secs)
    pub fn check_request(&self, ip: &str) -> (bool, u32, u64) {
        let now = Instant::now();

        let mut entry = self.requests.entry(ip.to_string()).or_insert((0, now));
        let (count, window_start) = entry.value_mut();

        if now.duration_since(*window_start) >= self.window {
            *count = 0;
            *window_start = now;
        }

        let remaining = self.limit.saturating_sub(*count);
        let reset_after = self
            .window
            .checked_sub(now.duration_since(*window_start))
            .map(|d| d.as_secs())
            .unwrap_or(0);

        if *count >= self.limit {
            return (false, 0, reset_after);
        }

        *count += 1;
        (true, remaining.saturating_sub(1), reset_after)
    }

    /// Drop entries whose window has long expired
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.requests
            .retain(|_, (_, window_start)| now.duration_since(*window_start) < self.window * 2);
    }
}

/// Shared state for security middleware
#[derive(Clone)]
pub struct SecurityState {
    pub config: Arc<SecurityMiddlewareConfig>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl SecurityState {
    pub fn new(config: SecurityMiddlewareConfig) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit_per_minute));
        Self {
            config: Arc::new(config),
            rate_limiter,
        }
    }

    fn resolve(&self, api_key: &str) -> Option<&Caller> {
        self.config.api_keys.get(api_key)
    }
}

/// Extract client IP from request, handling proxies
fn get_client_ip(headers: &HeaderMap, addr: Option<&SocketAddr>) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(value) = forwarded.to_str() {
            // Take the first IP (original client)
            if let Some(ip) = value.split(',').next() {
                return ip.trim().to_string();
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip) = real_ip.to_str() {
            return ip.trim().to_string();
        }
    }

    addr.map(|a| a.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Sanitize value for logging (mask sensitive data)
pub fn sanitize_for_log(value: &str) -> String {
    let len = value.chars().count();
    if len <= 8 {
        return "*".repeat(len);
    }
    let head: String = value.chars().take(4).collect();
    let tail: String = value.chars().skip(len - 4).collect();
    format!("{}...{}", head, tail)
}

/// Check if path is public (doesn't require auth)
fn is_public_path(path: &str, public_paths: &[String]) -> bool {
    public_paths.iter().any(|p| path.starts_with(p))
}

fn extract_api_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-api-key")
        .or_else(|| headers.get("authorization"))
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim_start_matches("Bearer ").trim().to_string())
}

/// Authentication middleware.
///
/// A recognised key attaches its `Caller` to the request. With auth
/// disabled, unauthenticated requests pass through without a caller and
/// can only reach read endpoints.
pub async fn auth_middleware(
    State(state): State<SecurityState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let path = request.uri().path().to_string();

    if let Some(key) = extract_api_key(&headers) {
        match state.resolve(&key) {
            Some(caller) => {
                debug!(caller = %caller.identity(), path = %path, "API key authenticated");
                request.extensions_mut().insert(caller.clone());
                return Ok(next.run(request).await);
            }
            None if state.config.enable_auth && !is_public_path(&path, &state.config.public_paths) => {
                let shown = if state.config.sanitize_logs {
                    sanitize_for_log(&key)
                } else {
                    key
                };
                warn!(path = %path, api_key = %shown, "Invalid API key attempt");
                return Err(StatusCode::UNAUTHORIZED);
            }
            None => {}
        }
    }

    if !state.config.enable_auth || is_public_path(&path, &state.config.public_paths) {
        return Ok(next.run(request).await);
    }

    warn!("Missing API key for path: {}", path);
    Err(StatusCode::UNAUTHORIZED)
}

/// Extracts the authenticated caller attached by `auth_middleware`
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Caller>().cloned().ok_or((
            StatusCode::UNAUTHORIZED,
            "An authenticated caller is required".to_string(),
        ))
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(state): State<SecurityState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    let addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client_ip = get_client_ip(&headers, addr.as_ref());
    let (allowed, remaining, reset_after) = state.rate_limiter.check_request(&client_ip);

    if !allowed {
        let shown = if state.config.sanitize_logs {
            sanitize_for_log(&client_ip)
        } else {
            client_ip
        };
        warn!(
            client_ip = %shown,
            path = %request.uri().path(),
            "Rate limit exceeded"
        );

        let mut response = StatusCode::TOO_MANY_REQUESTS.into_response();
        let headers = response.headers_mut();
        headers.insert(
            "X-RateLimit-Limit",
            HeaderValue::from(state.config.rate_limit_per_minute),
        );
        headers.insert("X-RateLimit-Remaining", HeaderValue::from(0u32));
        headers.insert("X-RateLimit-Reset", HeaderValue::from(reset_after));
        headers.insert("Retry-After", HeaderValue::from(reset_after));

        return Err(response);
    }

    let mut response = next.run(request).await;

    let headers = response.headers_mut();
    headers.insert(
        "X-RateLimit-Limit",
        HeaderValue::from(state.config.rate_limit_per_minute),
    );
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(remaining));
    headers.insert("X-RateLimit-Reset", HeaderValue::from(reset_after));

    Ok(response)
}

/// Security headers middleware
pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert(
        "X-Content-Type-Options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        "Strict-Transport-Security",
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );
    headers.insert(
        "Content-Security-Policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    headers.insert(
        "Cache-Control",
        HeaderValue::from_static("no-store, no-cache, must-revalidate"),
    );
    headers.remove("Server");

    response
}

/// Request body size validation middleware
pub async fn body_size_middleware(
    State(state): State<SecurityState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if let Some(content_length) = headers.get("content-length") {
        if let Ok(length_str) = content_length.to_str() {
            if let Ok(length) = length_str.parse::<usize>() {
                if length > state.config.max_request_size {
                    warn!(
                        "Request body too large: {} bytes (max: {})",
                        length, state.config.max_request_size
                    );
                    return Err(StatusCode::PAYLOAD_TOO_LARGE);
                }
            }
        }
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter() {
        let limiter = RateLimiter::new(3);

        assert!(limiter.check_request("127.0.0.1").0);
        assert!(limiter.check_request("127.0.0.1").0);
        assert!(limiter.check_request("127.0.0.1").0);

        let (allowed, remaining, _) = limiter.check_request("127.0.0.1");
        assert!(!allowed);
        assert_eq!(remaining, 0);

        // Different IP should still be allowed
        assert!(limiter.check_request("192.168.1.1").0);
    }

    #[test]
    fn test_sanitize_for_log() {
        assert_eq!(sanitize_for_log("short"), "*****");
        assert_eq!(sanitize_for_log("abcdefghij"), "abcd...ghij");
    }

    #[test]
    fn test_sanitize_for_log_multibyte() {
        assert_eq!(sanitize_for_log("aa日本語キー1234567890"), "aa日本...7890");
        assert_eq!(sanitize_for_log("日本語"), "***");
    }

    #[test]
    fn test_is_public_path() {
        let public = vec!["/health".to_string()];

        assert!(is_public_path("/health", &public));
        assert!(!is_public_path("/enroll", &public));
        assert!(!is_public_path("/clients/abc", &public));
    }

    #[test]
    fn test_api_key_bindings_resolve_to_callers() {
        let mut bindings = HashMap::new();
        bindings.insert("adminKey1234567890".to_string(), "admin".to_string());
        let state = SecurityState::new(
            SecurityMiddlewareConfig::default().with_api_key_bindings(&bindings),
        );

        let caller = state.resolve("adminKey1234567890").unwrap();
        assert_eq!(caller.identity().as_str(), "admin");
        assert!(state.resolve("unknown").is_none());
    }

    #[test]
    fn test_extract_api_key_variants() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer abc123"));
        assert_eq!(extract_api_key(&headers).as_deref(), Some("abc123"));

        headers.insert("x-api-key", HeaderValue::from_static("direct"));
        assert_eq!(extract_api_key(&headers).as_deref(), Some("direct"));
    }
}
