//! Axum Middleware for API-Key Authentication and Rate Limiting
//!
//! Authentication here is deliberately thin: a literal comparison of the
//! `X-API-Key` header against the configured key. Requests without a valid
//! key get 401. When no key is configured the middleware passes everything
//! through (dev mode).
//!
//! Rate limiting is keyed by client IP and enforced with a token-bucket
//! limiter per key; exceeding the quota returns 429 with a Retry-After
//! header.

use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use governor::{clock::DefaultClock, Quota, RateLimiter};

use crate::config::ApiConfig;
use crate::error::ApiError;

/// Header name for the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

// ============================================================================
// API KEY MIDDLEWARE
// ============================================================================

/// Shared state for the API-key middleware.
#[derive(Debug, Clone)]
pub struct ApiKeyState {
    api_key: Option<Arc<str>>,
}

impl ApiKeyState {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key: api_key.map(Arc::from),
        }
    }
}

/// Axum middleware enforcing the configured API key.
pub async fn api_key_middleware(
    State(state): State<ApiKeyState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiKeyError> {
    let Some(expected) = state.api_key.as_deref() else {
        // No key configured - authentication disabled.
        return Ok(next.run(request).await);
    };

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|h| h.to_str().ok());

    match provided {
        Some(key) if key == expected => Ok(next.run(request).await),
        Some(_) => Err(ApiKeyError(ApiError::unauthorized("Invalid API key"))),
        None => Err(ApiKeyError(ApiError::unauthorized(
            "The X-API-Key header is required",
        ))),
    }
}

/// Error wrapper for the API-key middleware that implements IntoResponse.
#[derive(Debug)]
pub struct ApiKeyError(pub ApiError);

impl IntoResponse for ApiKeyError {
    fn into_response(self) -> Response {
        self.0.into_response()
    }
}

// ============================================================================
// RATE LIMITING MIDDLEWARE
// ============================================================================

/// Type alias for the rate limiter we use.
type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    DefaultClock,
>;

/// State for rate limiting middleware.
#[derive(Clone)]
pub struct RateLimitState {
    enabled: bool,
    per_minute: u32,
    burst: u32,
    /// Per-IP rate limiters - DashMap for lock-free concurrent access.
    limiters: Arc<DashMap<IpAddr, Arc<DirectRateLimiter>>>,
}

impl RateLimitState {
    pub fn new(config: &ApiConfig) -> Self {
        Self {
            enabled: config.rate_limit_enabled,
            per_minute: config.rate_limit_per_minute,
            burst: config.rate_limit_burst,
            limiters: Arc::new(DashMap::new()),
        }
    }

    /// Get or create a limiter for the given client IP.
    fn limiter_for(&self, ip: IpAddr) -> Arc<DirectRateLimiter> {
        let limiter = self.limiters.entry(ip).or_insert_with(|| {
            let quota = Quota::per_minute(
                NonZeroU32::new(self.per_minute).unwrap_or(NonZeroU32::MIN),
            )
            .allow_burst(NonZeroU32::new(self.burst).unwrap_or(NonZeroU32::MIN));
            Arc::new(RateLimiter::direct(quota))
        });
        limiter.clone()
    }
}

/// Error type for rate limit middleware.
#[derive(Debug)]
pub struct RateLimitError {
    /// Seconds until the limiter admits another request.
    pub retry_after: u64,
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        let error = ApiError::too_many_requests(Some(self.retry_after));
        let mut response = (StatusCode::TOO_MANY_REQUESTS, axum::Json(error)).into_response();
        response.headers_mut().insert(
            axum::http::header::RETRY_AFTER,
            HeaderValue::from_str(&self.retry_after.to_string())
                .unwrap_or_else(|_| HeaderValue::from_static("60")),
        );
        response
    }
}

/// Extract client IP from request, considering proxy headers.
fn extract_client_ip(request: &Request, fallback: std::net::SocketAddr) -> IpAddr {
    // X-Forwarded-For can contain multiple IPs, take the first one
    if let Some(forwarded_for) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
    {
        if let Some(first_ip) = forwarded_for.split(',').next() {
            if let Ok(ip) = first_ip.trim().parse() {
                return ip;
            }
        }
    }

    if let Some(real_ip) = request
        .headers()
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
    {
        if let Ok(ip) = real_ip.trim().parse() {
            return ip;
        }
    }

    fallback.ip()
}

/// Rate limiting middleware, keyed by client IP.
///
/// When rate limited, returns 429 Too Many Requests with Retry-After header.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    axum::extract::ConnectInfo(addr): axum::extract::ConnectInfo<std::net::SocketAddr>,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitError> {
    if !state.enabled {
        return Ok(next.run(request).await);
    }

    let ip = extract_client_ip(&request, addr);
    let limiter = state.limiter_for(ip);

    match limiter.check() {
        Ok(_) => {
            let mut response = next.run(request).await;
            response.headers_mut().insert(
                axum::http::header::HeaderName::from_static("x-ratelimit-limit"),
                HeaderValue::from_str(&state.per_minute.to_string())
                    .unwrap_or_else(|_| HeaderValue::from_static("5")),
            );
            Ok(response)
        }
        Err(not_until) => {
            let retry_after = not_until
                .wait_time_from(governor::clock::Clock::now(&DefaultClock::default()))
                .as_secs()
                .max(1);
            Err(RateLimitError { retry_after })
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        extract::ConnectInfo,
        http::Request as HttpRequest,
        middleware,
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    fn auth_app(api_key: Option<&str>) -> Router {
        let state = ApiKeyState::new(api_key.map(str::to_string));
        Router::new()
            .route("/protected", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(state, api_key_middleware))
    }

    fn request(api_key: Option<&str>) -> HttpRequest<Body> {
        let mut builder = HttpRequest::builder().uri("/protected");
        if let Some(key) = api_key {
            builder = builder.header(API_KEY_HEADER, key);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn missing_key_is_unauthorized() {
        let response = auth_app(Some("segredo")).oneshot(request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn wrong_key_is_unauthorized() {
        let response = auth_app(Some("segredo"))
            .oneshot(request(Some("errado")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn valid_key_passes_through() {
        let response = auth_app(Some("segredo"))
            .oneshot(request(Some("segredo")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unconfigured_key_disables_auth() {
        let response = auth_app(None).oneshot(request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    fn rate_limit_app(per_minute: u32, burst: u32) -> Router {
        let config = ApiConfig {
            rate_limit_per_minute: per_minute,
            rate_limit_burst: burst,
            ..ApiConfig::default()
        };
        let state = RateLimitState::new(&config);
        Router::new()
            .route("/limited", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(state, rate_limit_middleware))
    }

    fn limited_request() -> HttpRequest<Body> {
        let mut request = HttpRequest::builder()
            .uri("/limited")
            .body(Body::empty())
            .unwrap();
        // ConnectInfo is normally injected by the server; tests provide it
        // directly.
        request
            .extensions_mut()
            .insert(ConnectInfo(std::net::SocketAddr::from(([127, 0, 0, 1], 9999))));
        request
    }

    #[tokio::test]
    async fn burst_exhaustion_returns_429_with_retry_after() {
        let app = rate_limit_app(1, 1);

        let first = app.clone().oneshot(limited_request()).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        assert!(first.headers().contains_key("x-ratelimit-limit"));

        let second = app.oneshot(limited_request()).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(second.headers().contains_key(axum::http::header::RETRY_AFTER));
    }

    #[tokio::test]
    async fn forwarded_header_overrides_connection_ip() {
        let app = rate_limit_app(1, 1);

        // Exhaust the quota for 10.0.0.1.
        let mut request = limited_request();
        request
            .headers_mut()
            .insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1"));
        assert_eq!(app.clone().oneshot(request).await.unwrap().status(), StatusCode::OK);

        // A different forwarded IP gets its own bucket.
        let mut request = limited_request();
        request
            .headers_mut()
            .insert("x-forwarded-for", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(app.oneshot(request).await.unwrap().status(), StatusCode::OK);
    }
}
