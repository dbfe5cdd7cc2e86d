use axum::extract::State;
use axum::http::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use subtle::ConstantTimeEq;
use tower_http::limit::RequestBodyLimitLayer;

use crate::error::MemoirError;
use crate::AppState;

mod assistant;
mod entries;

use assistant::*;
use entries::*;

/// The opaque identity provider hands us a stable numeric user id per
/// request; we trust it unconditionally.
fn current_user(headers: &axum::http::HeaderMap) -> Result<i64, MemoirError> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(MemoirError::Unauthorized)
}

/// Auth middleware: checks Bearer token if MEMOIR_API_KEY is configured.
async fn require_auth(
    State(state): State<AppState>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, MemoirError> {
    let Some(ref expected) = state.api_key else {
        return Ok(next.run(req).await);
    };

    let unauthorized = || MemoirError::Unauthorized;

    let header = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(unauthorized)?;

    let token = header.strip_prefix("Bearer ").ok_or_else(unauthorized)?;

    // constant-time comparison to prevent timing attacks
    if token.as_bytes().ct_eq(expected.as_bytes()).into() {
        Ok(next.run(req).await)
    } else {
        Err(unauthorized())
    }
}

async fn index() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": "memoir",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let (cache_len, cache_cap, hits, misses) = state.embed_cache.stats();
    Json(serde_json::json!({
        "status": "ok",
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "ai": state.ai.is_some(),
        "embed_cache": { "len": cache_len, "cap": cache_cap, "hits": hits, "misses": misses },
    }))
}

pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/", get(index))
        .route("/health", get(health));

    let protected = Router::new()
        .route("/entries", post(create_entry).get(list_entries))
        .route(
            "/entries/{id}",
            get(get_entry).put(update_entry).delete(delete_entry),
        )
        .route("/chat", post(chat))
        .route("/digest", post(weekly_digest))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    public
        .merge(protected)
        .layer(RequestBodyLimitLayer::new(256 * 1024))
        .with_state(state)
}
