//! HTTP surface tests: auth, identity, entry CRUD, and the AI-off paths.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use memoir::db::DiaryDB;
use memoir::{api, AppState, EmbedCache};

const TEST_KEY: &str = "test-key";

fn test_app(api_key: Option<&str>) -> Router {
    let state = AppState {
        db: Arc::new(DiaryDB::open(":memory:").expect("in-memory db")),
        ai: None,
        api_key: api_key.map(str::to_string),
        embed_cache: EmbedCache::new(16),
        started_at: std::time::Instant::now(),
    };
    api::router(state)
}

fn req(method: Method, path: &str, user: Option<i64>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header(header::AUTHORIZATION, format!("Bearer {TEST_KEY}"));
    if let Some(id) = user {
        builder = builder.header("x-user-id", id.to_string());
    }
    match body {
        Some(v) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(v.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(resp: axum::response::Response) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let app = test_app(Some(TEST_KEY));
    let resp = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = json_body(resp).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["ai"], false);
}

#[tokio::test]
async fn missing_bearer_is_rejected() {
    let app = test_app(Some(TEST_KEY));
    let resp = app
        .oneshot(
            Request::builder()
                .method(Method::GET)
                .uri("/entries")
                .header("x-user-id", "1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wrong_bearer_is_rejected() {
    let app = test_app(Some(TEST_KEY));
    let resp = app
        .oneshot(
            Request::builder()
                .method(Method::GET)
                .uri("/entries")
                .header(header::AUTHORIZATION, "Bearer not-the-key")
                .header("x-user-id", "1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn no_api_key_means_open_access() {
    let app = test_app(None);
    let resp = app
        .oneshot(
            Request::builder()
                .method(Method::GET)
                .uri("/entries")
                .header("x-user-id", "1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_identity_header_is_unauthorized() {
    let app = test_app(Some(TEST_KEY));
    let resp = app.oneshot(req(Method::GET, "/entries", None, None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn entry_crud_flow() {
    let app = test_app(Some(TEST_KEY));

    // create
    let resp = app
        .clone()
        .oneshot(req(
            Method::POST,
            "/entries",
            Some(1),
            Some(json!({"title": "First day", "content": "Moved into the new flat.", "mood": "excited"})),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created = json_body(resp).await;
    let id = created["id"].as_i64().unwrap();
    assert_eq!(created["title"], "First day");

    // read back
    let resp = app
        .clone()
        .oneshot(req(Method::GET, &format!("/entries/{id}"), Some(1), None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let got = json_body(resp).await;
    assert_eq!(got["content"], "Moved into the new flat.");
    assert_eq!(got["mood"], "excited");

    // list
    let resp = app
        .clone()
        .oneshot(req(Method::GET, "/entries", Some(1), None))
        .await
        .unwrap();
    let list = json_body(resp).await;
    assert_eq!(list.as_array().unwrap().len(), 1);

    // update
    let resp = app
        .clone()
        .oneshot(req(
            Method::PUT,
            &format!("/entries/{id}"),
            Some(1),
            Some(json!({"title": "First day, revised"})),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let updated = json_body(resp).await;
    assert_eq!(updated["title"], "First day, revised");

    // delete
    let resp = app
        .clone()
        .oneshot(req(Method::DELETE, &format!("/entries/{id}"), Some(1), None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    // gone
    let resp = app
        .oneshot(req(Method::GET, &format!("/entries/{id}"), Some(1), None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn entries_are_owner_scoped_over_http() {
    let app = test_app(Some(TEST_KEY));

    let resp = app
        .clone()
        .oneshot(req(
            Method::POST,
            "/entries",
            Some(1),
            Some(json!({"title": "mine", "content": "secret"})),
        ))
        .await
        .unwrap();
    let id = json_body(resp).await["id"].as_i64().unwrap();

    // another user sees a 404, not the entry
    let resp = app
        .oneshot(req(Method::GET, &format!("/entries/{id}"), Some(2), None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn empty_title_is_a_bad_request() {
    let app = test_app(Some(TEST_KEY));
    let resp = app
        .oneshot(req(
            Method::POST,
            "/entries",
            Some(1),
            Some(json!({"title": "  ", "content": "body"})),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body = json_body(resp).await;
    assert!(body["error"].as_str().unwrap().contains("title"));
}

#[tokio::test]
async fn chat_without_ai_is_unavailable() {
    let app = test_app(Some(TEST_KEY));
    let resp = app
        .oneshot(req(
            Method::POST,
            "/chat",
            Some(1),
            Some(json!({"question": "what did I write?"})),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn digest_without_ai_is_unavailable() {
    let app = test_app(Some(TEST_KEY));
    let resp = app.oneshot(req(Method::POST, "/digest", Some(1), None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn entries_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("memoir.db");
    let path = path.to_str().unwrap();

    let first = DiaryDB::open(path).unwrap();
    let entry = first
        .create_entry(1, &memoir::db::EntryInput {
            title: "durable".into(),
            content: "still here after reopen".into(),
            mood: None,
        })
        .unwrap();
    drop(first);

    let second = DiaryDB::open(path).unwrap();
    let got = second.get_entry(1, entry.id).unwrap().unwrap();
    assert_eq!(got.content, "still here after reopen");
}
