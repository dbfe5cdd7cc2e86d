//! Entry indexing: chunk, embed, replace.

use tracing::debug;

use crate::ai::AiConfig;
use crate::chunker::{chunk, MAX_CHUNK_CHARS};
use crate::error::MemoirError;
use crate::{db_call, SharedDB};

/// Re-index one entry: segment its current content, embed every chunk in a
/// single batch call, and atomically replace the entry's prior chunk batch.
///
/// Runs after every create and every content-changing update, so stale
/// chunks never coexist with new ones. An entry whose content chunks to
/// nothing ends up with zero chunks.
pub async fn index_entry(
    db: &SharedDB,
    ai: &AiConfig,
    entry_id: i64,
    owner_id: i64,
    content: &str,
) -> Result<(), MemoirError> {
    let pieces = chunk(content, MAX_CHUNK_CHARS);
    let embeddings = ai.get_embeddings(&pieces).await?;
    let batch: Vec<(String, Vec<f32>)> = pieces.into_iter().zip(embeddings).collect();

    debug!(entry_id, chunks = batch.len(), "indexing entry");
    db_call(db, move |d| d.replace_chunks(entry_id, owner_id, &batch)).await??;
    Ok(())
}
