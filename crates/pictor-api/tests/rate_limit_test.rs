//! Fixed-window rate limiting at the HTTP edge.
//!
//! Run with: `cargo test -p pictor-api --test rate_limit_test`

mod helpers;

use axum::http::StatusCode;
use helpers::auth::test_user;
use helpers::{api_path, setup_test_app_with, test_settings};

fn header(response: &axum_test::TestResponse, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[tokio::test]
async fn test_requests_over_the_limit_get_429_with_retry_after() {
    let app = setup_test_app_with(test_settings(3));
    let user = test_user();

    for expected_remaining in ["2", "1", "0"] {
        let response = app
            .client()
            .get(&api_path("/images"))
            .authorization_bearer(&user.token)
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(header(&response, "x-ratelimit-limit").as_deref(), Some("3"));
        assert_eq!(
            header(&response, "x-ratelimit-remaining").as_deref(),
            Some(expected_remaining)
        );
        assert!(header(&response, "x-ratelimit-reset").is_some());
    }

    let rejected = app
        .client()
        .get(&api_path("/images"))
        .authorization_bearer(&user.token)
        .await;
    assert_eq!(rejected.status_code(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = header(&rejected, "retry-after").unwrap().parse().unwrap();
    assert!((1..=60).contains(&retry_after));
    assert_eq!(
        header(&rejected, "x-ratelimit-remaining").as_deref(),
        Some("0")
    );
}

#[tokio::test]
async fn test_limits_are_per_user() {
    let app = setup_test_app_with(test_settings(1));
    let alice = test_user();
    let bob = test_user();

    let a1 = app
        .client()
        .get(&api_path("/images"))
        .authorization_bearer(&alice.token)
        .await;
    let a2 = app
        .client()
        .get(&api_path("/images"))
        .authorization_bearer(&alice.token)
        .await;
    let b1 = app
        .client()
        .get(&api_path("/images"))
        .authorization_bearer(&bob.token)
        .await;

    assert_eq!(a1.status_code(), StatusCode::OK);
    assert_eq!(a2.status_code(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(b1.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_health_is_not_rate_limited() {
    let app = setup_test_app_with(test_settings(1));

    for _ in 0..5 {
        let response = app.client().get("/health").await;
        assert_eq!(response.status_code(), StatusCode::OK);
        assert!(header(&response, "x-ratelimit-limit").is_none());
    }
}

#[tokio::test]
async fn test_store_outage_fails_open() {
    let app = setup_test_app_with(test_settings(1));
    let user = test_user();
    app.kv.set_unavailable(true);

    for _ in 0..3 {
        let response = app
            .client()
            .get(&api_path("/images"))
            .authorization_bearer(&user.token)
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
    }
}
