use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    body::Body,
    http::{Method, Request, Response, StatusCode, header::CONTENT_TYPE},
};
use http_body_util::BodyExt;
use multicache::{
    application::users::UserDirectory,
    cache::{BatchCache, CacheFacade, JsonCodec},
    infra::{
        http::{AppState, build_router},
        memory::InMemoryStore,
    },
};
use serde_json::{Value, json};
use tower::ServiceExt;

fn test_app() -> (Router, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let facade = Arc::new(CacheFacade::new(
        store.clone(),
        Arc::new(JsonCodec),
        Duration::from_secs(120),
    ));
    let engine = Arc::new(BatchCache::new(facade.clone()));
    let users = Arc::new(UserDirectory::new(facade, engine));
    (build_router(AppState { users }), store)
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_owned()))
        .expect("request should build")
}

async fn body_json(response: Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn health_endpoint_responds() {
    let (app, _store) = test_app();

    let request = Request::builder()
        .method(Method::GET)
        .uri("/_health")
        .body(Body::empty())
        .expect("request should build");
    let response = app.oneshot(request).await.expect("router should respond");

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn cache_get_returns_the_fixed_user() {
    let (app, store) = test_app();

    let response = app
        .clone()
        .oneshot(post_json("/cache/get", ""))
        .await
        .expect("router should respond");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"id": 1, "name": "user1"}));

    // The lookup populated the single-key namespace.
    assert_eq!(store.len(), 1);
    assert!(store.ttl(b"cache:user:1").is_some());

    // A second request is answered from the cache.
    let response = app
        .oneshot(post_json("/cache/get", ""))
        .await
        .expect("router should respond");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn cache_list_returns_known_users_keyed_by_id() {
    let (app, store) = test_app();

    let response = app
        .oneshot(post_json("/cache/list", "[1, 2, 99]"))
        .await
        .expect("router should respond");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(
        body,
        json!({
            "1": {"id": 1, "name": "user1"},
            "2": {"id": 2, "name": "user2"},
        })
    );

    // Only the users that exist were written back.
    assert_eq!(store.len(), 2);
    assert!(store.ttl(b"cache:user:batch:1").is_some());
    assert!(store.ttl(b"cache:user:batch:2").is_some());
    assert!(store.ttl(b"cache:user:batch:99").is_none());
}

#[tokio::test]
async fn cache_list_reuses_cached_entries_across_requests() {
    let (app, store) = test_app();

    let first = app
        .clone()
        .oneshot(post_json("/cache/list", "[1, 2, 3]"))
        .await
        .expect("router should respond");
    let first_body = body_json(first).await;
    assert_eq!(store.len(), 3);

    let second = app
        .oneshot(post_json("/cache/list", "[1, 2, 3]"))
        .await
        .expect("router should respond");
    let second_body = body_json(second).await;

    assert_eq!(first_body, second_body);
    assert_eq!(store.len(), 3);
}

#[tokio::test]
async fn cache_list_rejects_malformed_bodies() {
    let (app, _store) = test_app();

    let response = app
        .oneshot(post_json("/cache/list", "not-json"))
        .await
        .expect("router should respond");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cache_list_with_no_ids_returns_an_empty_object() {
    let (app, store) = test_app();

    let response = app
        .oneshot(post_json("/cache/list", "[]"))
        .await
        .expect("router should respond");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({}));
    assert!(store.is_empty());
}
