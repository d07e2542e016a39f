use crate::auth::bearer_token;
use crate::error::HttpAppError;
use crate::state::SecurityState;
use crate::utils::ip_extraction::extract_client_ip;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use pictor_core::AppError;
use pictor_infra::RateLimitDecision;
use std::net::SocketAddr;

pub const RATE_LIMIT_LIMIT_HEADER: &str = "X-RateLimit-Limit";
pub const RATE_LIMIT_REMAINING_HEADER: &str = "X-RateLimit-Remaining";
pub const RATE_LIMIT_RESET_HEADER: &str = "X-RateLimit-Reset";

/// Who a request is counted against: the authenticated user when the
/// request carries a valid token, otherwise the client address.
fn client_identifier(security: &SecurityState, request: &Request) -> String {
    if let Some(claims) =
        bearer_token(request.headers()).and_then(|t| security.jwt.validate_token(t).ok())
    {
        return format!("user:{}", claims.sub);
    }

    let socket_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    match extract_client_ip(
        request.headers(),
        socket_addr.as_ref(),
        security.trusted_proxy_count,
    ) {
        Some(ip) => format!("ip:{}", ip),
        None => "ip:unknown".to_string(),
    }
}

fn apply_headers(response: &mut Response, decision: &RateLimitDecision) {
    let headers = response.headers_mut();
    let values = [
        (RATE_LIMIT_LIMIT_HEADER, decision.limit.to_string()),
        (RATE_LIMIT_REMAINING_HEADER, decision.remaining.to_string()),
        (RATE_LIMIT_RESET_HEADER, decision.reset_at.to_string()),
    ];
    for (name, value) in values {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(name, value);
        }
    }
}

/// Fixed-window rate limiting over the shared key-value store.
///
/// # Headers
/// - `X-RateLimit-Limit`: requests allowed per window
/// - `X-RateLimit-Remaining`: requests left in the current window
/// - `X-RateLimit-Reset`: unix time at which the window ends
/// - `Retry-After`: seconds until the window ends (429 only)
///
/// When the store is down the request is admitted without headers.
pub async fn rate_limit_middleware(
    State(security): State<SecurityState>,
    request: Request,
    next: Next,
) -> Response {
    let client_id = client_identifier(&security, &request);
    let decision = security.rate_limiter.admit(&client_id).await;

    if !decision.allowed {
        tracing::warn!(
            client_id = %client_id,
            path = %request.uri().path(),
            limit = decision.limit,
            retry_after_secs = decision.retry_after_secs,
            "Rate limit exceeded"
        );
        let mut response = HttpAppError(AppError::RateLimitExceeded {
            retry_after_secs: decision.retry_after_secs,
        })
        .into_response();
        apply_headers(&mut response, &decision);
        return response;
    }

    let mut response = next.run(request).await;
    if !decision.degraded {
        apply_headers(&mut response, &decision);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::JwtService;
    use axum::body::Body;
    use pictor_db::MemoryKeyValueStore;
    use pictor_infra::FixedWindowRateLimiter;
    use std::sync::Arc;
    use std::time::Duration;
    use uuid::Uuid;

    const SECRET: &str = "rate-limit-test-secret-at-least-32-chars";

    fn security() -> SecurityState {
        SecurityState {
            jwt: Arc::new(JwtService::new(SECRET)),
            rate_limiter: Arc::new(FixedWindowRateLimiter::new(
                Arc::new(MemoryKeyValueStore::new()),
                10,
                Duration::from_secs(60),
            )),
            trusted_proxy_count: 1,
        }
    }

    #[test]
    fn test_valid_token_keys_by_user() {
        let security = security();
        let user = Uuid::new_v4();
        let token = security
            .jwt
            .issue_token(user, chrono::Duration::minutes(5))
            .unwrap();
        let request = axum::http::Request::builder()
            .header("Authorization", format!("Bearer {}", token))
            .header("X-Forwarded-For", "203.0.113.9")
            .body(Body::empty())
            .unwrap();

        assert_eq!(client_identifier(&security, &request), format!("user:{}", user));
    }

    #[test]
    fn test_invalid_token_falls_back_to_ip() {
        let security = security();
        let request = axum::http::Request::builder()
            .header("Authorization", "Bearer not-a-jwt")
            .header("X-Forwarded-For", "203.0.113.9")
            .body(Body::empty())
            .unwrap();

        assert_eq!(client_identifier(&security, &request), "ip:203.0.113.9");
    }

    #[test]
    fn test_rotating_forwarded_prefix_keeps_one_key() {
        let security = security();
        let keys: Vec<String> = ["6.6.6.1, 203.0.113.9", "6.6.6.2, 203.0.113.9"]
            .into_iter()
            .map(|forwarded| {
                let request = axum::http::Request::builder()
                    .header("X-Forwarded-For", forwarded)
                    .body(Body::empty())
                    .unwrap();
                client_identifier(&security, &request)
            })
            .collect();

        assert_eq!(keys[0], "ip:203.0.113.9");
        assert_eq!(keys[0], keys[1]);
    }

    #[test]
    fn test_socket_address_and_unknown_fallbacks() {
        let security = security();

        let mut request = axum::http::Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_identifier(&security, &request), "ip:unknown");

        let addr: SocketAddr = "198.51.100.7:5555".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        assert_eq!(client_identifier(&security, &request), "ip:198.51.100.7");
    }
}
