//! Chat and digest handlers.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::current_user;
use crate::ai::CachedEmbedder;
use crate::error::MemoirError;
use crate::{chat, digest, AppState};

#[derive(Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub question: String,
    /// Opaque grouping key for the conversation. Minted server-side when
    /// the client doesn't supply one.
    pub session_id: Option<String>,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub answer: String,
    pub show_suggestions: bool,
    pub related_entry_ids: Vec<i64>,
    pub session_id: String,
}

pub async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, MemoirError> {
    let user_id = current_user(&headers)?;
    let ai = state.ai.as_ref().ok_or(MemoirError::AiNotConfigured)?;

    let session_id = req
        .session_id
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let embedder = CachedEmbedder { inner: ai, cache: state.embed_cache.clone() };
    let outcome =
        chat::respond(&state.db, ai, &embedder, user_id, &session_id, &req.question).await?;

    Ok(Json(ChatResponse {
        answer: outcome.answer,
        show_suggestions: outcome.show_suggestions,
        related_entry_ids: outcome.related_entry_ids,
        session_id,
    }))
}

#[derive(Serialize)]
pub struct DigestResponse {
    pub digest: String,
}

pub async fn weekly_digest(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<DigestResponse>, MemoirError> {
    let user_id = current_user(&headers)?;
    let ai = state.ai.as_ref().ok_or(MemoirError::AiNotConfigured)?;

    let text = digest::digest(&state.db, ai, user_id).await?;
    Ok(Json(DigestResponse { digest: text }))
}
