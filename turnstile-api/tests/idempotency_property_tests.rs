//! Property and scenario tests for idempotent writes through the full router
//!
//! **Property: At-Most-Once Execution**
//!
//! For any idempotent route, two sequential requests with the same method,
//! path, and idempotency token SHALL return an identical status and body,
//! AND the underlying operation SHALL execute exactly once. Once the key's
//! window expires the operation executes afresh.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use proptest::prelude::*;
use tower::ServiceExt;

use turnstile_api::{
    create_api_router, default_registry, ApiConfig, AppState, IdempotencyState, UserRepo,
    API_KEY_HEADER, IDEMPOTENCY_KEY_HEADER, IDEMPOTENCY_REPLAY_HEADER,
};
use turnstile_core::{Coordinator, InMemoryIdempotencyStore, ManualClock};

// ============================================================================
// TEST CONFIGURATION
// ============================================================================

struct TestApp {
    router: Router,
    state: AppState,
    clock: Arc<ManualClock>,
}

fn test_app(config: ApiConfig) -> TestApp {
    let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
    let store = Arc::new(InMemoryIdempotencyStore::new(
        clock.clone(),
        config.reservation_ttl,
    ));
    let coordinator = Arc::new(Coordinator::new(store, config.unavailable_policy));
    let idempotency = IdempotencyState::new(
        Arc::new(default_registry(&config)),
        coordinator,
        config.max_cached_body_bytes,
    );

    let state = AppState::new(Arc::new(UserRepo::new()));
    let router = create_api_router(state.clone(), &config, idempotency);
    TestApp {
        router,
        state,
        clock,
    }
}

fn create_user_request(token: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/usuarios")
        .header("content-type", "application/json")
        .header(IDEMPOTENCY_KEY_HEADER, token)
        .body(Body::from(
            r#"{"nome": "Maria Silva", "email": "maria@example.com"}"#,
        ))
        .unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

// ============================================================================
// SCENARIO TESTS
// ============================================================================

/// The documented contract: POST /usuarios with `X-Idempotency-Key: abc-123`
/// creates once, replays within the hour, and creates again after expiry.
#[tokio::test]
async fn create_user_replays_within_the_window_and_resets_after() {
    let app = test_app(ApiConfig::default());

    let first = app
        .router
        .clone()
        .oneshot(create_user_request("abc-123"))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);
    let first_body = body_bytes(first).await;
    assert_eq!(app.state.repo.user_count(), 1);

    // Second call within the hour: identical body, no second user.
    app.clock.advance_secs(1800);
    let second = app
        .router
        .clone()
        .oneshot(create_user_request("abc-123"))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CREATED);
    assert_eq!(
        second.headers().get(IDEMPOTENCY_REPLAY_HEADER).unwrap(),
        "true"
    );
    let second_body = body_bytes(second).await;
    assert_eq!(first_body, second_body);
    assert_eq!(app.state.repo.user_count(), 1);

    // Third call after the window: a second user is created.
    app.clock.advance_secs(1801);
    let third = app
        .router
        .clone()
        .oneshot(create_user_request("abc-123"))
        .await
        .unwrap();
    assert_eq!(third.status(), StatusCode::CREATED);
    let third_body = body_bytes(third).await;
    assert_ne!(first_body, third_body);
    assert_eq!(app.state.repo.user_count(), 2);
}

#[tokio::test]
async fn missing_idempotency_key_is_rejected_before_the_handler() {
    let app = test_app(ApiConfig::default());

    let request = Request::builder()
        .method("POST")
        .uri("/usuarios")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"nome": "Maria", "email": "m@example.com"}"#))
        .unwrap();

    let response = app.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.state.repo.user_count(), 0);
}

#[tokio::test]
async fn api_key_is_enforced_on_user_routes_but_not_health() {
    let config = ApiConfig {
        api_key: Some("segredo".to_string()),
        ..ApiConfig::default()
    };
    let app = test_app(config);

    let unauthenticated = app
        .router
        .clone()
        .oneshot(create_user_request("abc-123"))
        .await
        .unwrap();
    assert_eq!(unauthenticated.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(app.state.repo.user_count(), 0);

    let mut authenticated = create_user_request("abc-123");
    authenticated
        .headers_mut()
        .insert(API_KEY_HEADER, "segredo".parse().unwrap());
    let response = app.router.clone().oneshot(authenticated).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let health = Request::builder()
        .uri("/health/ping")
        .body(Body::empty())
        .unwrap();
    let response = app.router.oneshot(health).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn delete_is_idempotent_within_the_window() {
    let app = test_app(ApiConfig::default());
    let user = app.state.repo.create(turnstile_api::CreateUserRequest {
        nome: "Maria".to_string(),
        email: "maria@example.com".to_string(),
    });

    let delete_request = || {
        Request::builder()
            .method("DELETE")
            .uri(format!("/usuarios/{}", user.user_id))
            .header(IDEMPOTENCY_KEY_HEADER, "del-1")
            .body(Body::empty())
            .unwrap()
    };

    let first = app.router.clone().oneshot(delete_request()).await.unwrap();
    assert_eq!(first.status(), StatusCode::NO_CONTENT);

    // The retry replays 204 instead of reporting 404.
    let second = app.router.clone().oneshot(delete_request()).await.unwrap();
    assert_eq!(second.status(), StatusCode::NO_CONTENT);
    assert!(second.headers().contains_key(IDEMPOTENCY_REPLAY_HEADER));
}

// ============================================================================
// PROPERTY TESTS
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Any non-blank token deduplicates its own retries and stays
    /// independent from other tokens.
    #[test]
    fn sequential_duplicates_always_replay(token in "[A-Za-z0-9_-]{1,64}") {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let app = test_app(ApiConfig::default());

            let first = app
                .router
                .clone()
                .oneshot(create_user_request(&token))
                .await
                .unwrap();
            prop_assert_eq!(first.status(), StatusCode::CREATED);
            let first_body = body_bytes(first).await;

            let second = app
                .router
                .clone()
                .oneshot(create_user_request(&token))
                .await
                .unwrap();
            prop_assert_eq!(second.status(), StatusCode::CREATED);
            let second_body = body_bytes(second).await;

            prop_assert_eq!(first_body, second_body);
            prop_assert_eq!(app.state.repo.user_count(), 1);

            // A different token is a different logical operation.
            let other = format!("{token}-x");
            let response = app
                .router
                .clone()
                .oneshot(create_user_request(&other))
                .await
                .unwrap();
            prop_assert_eq!(response.status(), StatusCode::CREATED);
            prop_assert_eq!(app.state.repo.user_count(), 2);
            Ok(())
        })?;
    }
}
