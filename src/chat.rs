//! Grounded diary chat: retrieve, rank, prompt, parse.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use crate::ai::{generate_with_retry, Embedder, LanguageModel};
use crate::db::chat::{SESSION_WINDOW_MS, TRANSCRIPT_LIMIT};
use crate::db::{now_ms, ChatTurn};
use crate::error::MemoirError;
use crate::rank::{rank, RankedChunk, RELEVANCE_THRESHOLD, TOP_K};
use crate::{db_call, prompts, SharedDB};

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// The structured result of one chat turn.
#[derive(Debug, Serialize)]
pub struct ChatOutcome {
    pub answer: String,
    pub show_suggestions: bool,
    pub related_entry_ids: Vec<i64>,
}

impl ChatOutcome {
    fn plain(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            show_suggestions: false,
            related_entry_ids: vec![],
        }
    }
}

/// Answer a question against the user's diary.
///
/// Sweeps stale transcript turns, loads session context and the user's chunk
/// pool, ranks chunks against the embedded question, asks the model, and
/// parses its reply into an answer plus a suggestion decision. Both sides of
/// the exchange are logged as turns on every path. Model-layer failures are
/// downgraded to a fixed apology; only storage failures propagate.
pub async fn respond(
    db: &SharedDB,
    model: &dyn LanguageModel,
    embedder: &dyn Embedder,
    user_id: i64,
    session_id: &str,
    question: &str,
) -> Result<ChatOutcome, MemoirError> {
    let question = question.trim();
    if question.is_empty() {
        return Err(MemoirError::EmptyQuestion);
    }

    // Opportunistic sweep: stale turns across all users go first, so the
    // window cutoff is enforced whenever anyone chats.
    let swept = db_call(db, |d| d.sweep_turns_before(now_ms() - SESSION_WINDOW_MS)).await??;
    if swept > 0 {
        debug!(swept, "swept stale chat turns");
    }

    let (sid, uid) = (session_id.to_string(), user_id);
    let turns =
        db_call(db, move |d| d.recent_turns(uid, &sid, SESSION_WINDOW_MS, TRANSCRIPT_LIMIT))
            .await??;
    let transcript = render_transcript(&turns);

    let pool = db_call(db, move |d| d.chunks_for_owner(uid)).await??;
    if pool.is_empty() {
        // Nothing to retrieve from — no model call, just onboarding.
        let outcome = ChatOutcome::plain(prompts::ONBOARDING_MESSAGE);
        log_exchange(db, user_id, session_id, question, &outcome.answer, None).await?;
        return Ok(outcome);
    }

    // Embedding the question is a model-layer call too: a failure here gets
    // the same calm downgrade as a failed generation.
    let query_emb = match embedder.embed(question).await {
        Ok(v) => v,
        Err(e) => {
            info!(error = %e, "question embedding failed");
            let outcome = ChatOutcome::plain(prompts::MODEL_DOWN_MESSAGE);
            log_exchange(db, user_id, session_id, question, &outcome.answer, None).await?;
            return Ok(outcome);
        }
    };

    let ranked = rank(&query_emb, pool, RELEVANCE_THRESHOLD, TOP_K);
    debug!(candidates = ranked.len(), "ranked chunks above threshold");

    let context = render_context(&ranked);
    let prompt = prompts::diary_chat_prompt(&context, &transcript, question);

    let raw = match generate_with_retry(model, &prompt, RETRY_ATTEMPTS, RETRY_BACKOFF).await {
        Ok(text) => text,
        Err(e) => {
            info!(error = %e, "model unavailable after retries");
            let outcome = ChatOutcome::plain(prompts::MODEL_DOWN_MESSAGE);
            log_exchange(db, user_id, session_id, question, &outcome.answer, None).await?;
            return Ok(outcome);
        }
    };

    let (answer, show_suggestions) = parse_reply(&raw);

    let related_entry_ids = if show_suggestions && !ranked.is_empty() {
        dedup_entry_ids(&ranked)
    } else {
        vec![]
    };

    let ids = show_suggestions.then(|| related_entry_ids.clone());
    log_exchange(db, user_id, session_id, question, &answer, ids).await?;

    Ok(ChatOutcome { answer, show_suggestions, related_entry_ids })
}

/// Log the question and the produced answer as one user turn and one
/// assistant turn, atomically. The suggested-id list is attached to the
/// assistant turn only when suggestions are shown.
async fn log_exchange(
    db: &SharedDB,
    user_id: i64,
    session_id: &str,
    question: &str,
    answer: &str,
    suggested_ids: Option<Vec<i64>>,
) -> Result<(), MemoirError> {
    let (sid, q, a) = (session_id.to_string(), question.to_string(), answer.to_string());
    db_call(db, move |d| d.append_exchange(user_id, &sid, &q, &a, suggested_ids.as_deref()))
        .await?
}

/// Render prior turns as a labeled transcript, or the placeholder sentinel
/// when the session has none.
fn render_transcript(turns: &[ChatTurn]) -> String {
    if turns.is_empty() {
        return prompts::NO_HISTORY_SENTINEL.to_string();
    }
    turns
        .iter()
        .map(|t| format!("{}: {}", capitalize(&t.role), t.message))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render the top-ranked chunks into the context block, each labeled with
/// its rank and percentage match score.
fn render_context(ranked: &[RankedChunk]) -> String {
    if ranked.is_empty() {
        return prompts::NO_CONTEXT_SENTINEL.to_string();
    }
    ranked
        .iter()
        .enumerate()
        .map(|(i, rc)| {
            format!("Entry {} (Match: {:.0}%):\n{}", i + 1, rc.score * 100.0, rc.chunk.chunk_text)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Distinct source entry ids behind the ranked chunks, in rank order.
/// Multiple chunks may share one entry.
fn dedup_entry_ids(ranked: &[RankedChunk]) -> Vec<i64> {
    let mut seen = std::collections::HashSet::new();
    ranked
        .iter()
        .map(|rc| rc.chunk.entry_id)
        .filter(|id| seen.insert(*id))
        .collect()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Split the raw model reply into the answer body and the suggestion flag.
///
/// Any line whose uppercased form contains `SHOW_SUGGESTIONS:` is the control
/// line: `YES` sets the flag, `NO` clears it, and the line is dropped from
/// the body. The control line may appear anywhere and may be missing
/// entirely — the flag then stays false and the whole text is the answer.
pub fn parse_reply(raw: &str) -> (String, bool) {
    let mut show_suggestions = false;
    let mut answer_lines = Vec::new();

    for line in raw.lines() {
        let upper = line.trim().to_uppercase();
        if upper.contains(prompts::SUGGESTIONS_MARKER) {
            if upper.contains("YES") {
                show_suggestions = true;
            } else if upper.contains("NO") {
                show_suggestions = false;
            }
        } else {
            answer_lines.push(line);
        }
    }

    // Strip any stray marker text left inside the joined body
    let answer = answer_lines
        .join("\n")
        .trim()
        .replace(prompts::SUGGESTIONS_MARKER, "")
        .trim()
        .to_string();

    (answer, show_suggestions)
}
