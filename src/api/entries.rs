//! Entry CRUD handlers. Create and content-changing update re-index; delete
//! cascades chunk removal at the storage layer.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use tracing::warn;

use super::current_user;
use crate::db::{Entry, EntryInput, EntryUpdate};
use crate::error::MemoirError;
use crate::{db_call, index, AppState};

#[derive(Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub skip: usize,
    pub limit: Option<usize>,
}

pub async fn create_entry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<EntryInput>,
) -> Result<(StatusCode, Json<Entry>), MemoirError> {
    let user_id = current_user(&headers)?;
    let entry = db_call(&state.db, move |d| d.create_entry(user_id, &input)).await??;

    reindex(&state, &entry).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn list_entries(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Entry>>, MemoirError> {
    let user_id = current_user(&headers)?;
    let limit = params.limit.unwrap_or(20).clamp(1, 100);
    let skip = params.skip;
    let entries = db_call(&state.db, move |d| d.list_entries(user_id, skip, limit)).await??;
    Ok(Json(entries))
}

pub async fn get_entry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Entry>, MemoirError> {
    let user_id = current_user(&headers)?;
    let entry = db_call(&state.db, move |d| d.get_entry(user_id, id))
        .await??
        .ok_or(MemoirError::NotFound)?;
    Ok(Json(entry))
}

pub async fn update_entry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(update): Json<EntryUpdate>,
) -> Result<Json<Entry>, MemoirError> {
    let user_id = current_user(&headers)?;
    let (entry, content_changed) =
        db_call(&state.db, move |d| d.update_entry(user_id, id, &update))
            .await??
            .ok_or(MemoirError::NotFound)?;

    if content_changed {
        reindex(&state, &entry).await?;
    }
    Ok(Json(entry))
}

pub async fn delete_entry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode, MemoirError> {
    let user_id = current_user(&headers)?;
    let deleted = db_call(&state.db, move |d| d.delete_entry(user_id, id)).await??;
    if !deleted {
        return Err(MemoirError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Re-chunk and re-embed an entry's current content. Without AI configured
/// the entry is still stored, it just stays out of retrieval.
async fn reindex(state: &AppState, entry: &Entry) -> Result<(), MemoirError> {
    match &state.ai {
        Some(ai) => {
            index::index_entry(&state.db, ai, entry.id, entry.owner_id, &entry.content).await
        }
        None => {
            warn!(entry_id = entry.id, "AI not configured, entry not indexed");
            Ok(())
        }
    }
}
