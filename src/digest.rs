//! Weekly digest: one forward-looking writing prompt from recent entries.

use tracing::debug;

use crate::ai::LanguageModel;
use crate::db::now_ms;
use crate::error::MemoirError;
use crate::{db_call, prompts, SharedDB};

/// How far back the digest looks.
pub const DIGEST_WINDOW_MS: i64 = 7 * 24 * 60 * 60 * 1000;

/// Summarize the user's last week of entries into a single nudge toward
/// further writing.
///
/// Zero entries short-circuits to a fixed encouragement with no model call.
/// One entry gets a reflection prompt; two or more get the forward-looking
/// template over the joined texts. The model is called once, without retry —
/// the digest is a low-stakes extra, not worth the latency of a retry loop.
pub async fn digest(
    db: &SharedDB,
    model: &dyn LanguageModel,
    user_id: i64,
) -> Result<String, MemoirError> {
    let since = now_ms() - DIGEST_WINDOW_MS;
    let entries = db_call(db, move |d| d.entries_since(user_id, since)).await??;
    debug!(count = entries.len(), "entries in digest window");

    match entries.len() {
        0 => Ok(prompts::DIGEST_EMPTY_WEEK_MESSAGE.to_string()),
        1 => {
            let prompt = prompts::digest_single_entry_prompt(&entries[0].content);
            model.generate(&prompt).await
        }
        _ => {
            let joined = entries
                .iter()
                .map(|e| e.content.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");
            let prompt = prompts::digest_week_prompt(&joined);
            model.generate(&prompt).await
        }
    }
}
