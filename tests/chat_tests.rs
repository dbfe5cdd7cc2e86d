//! Grounded responder tests with scripted model and embedder fakes.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use memoir::ai::{Embedder, LanguageModel};
use memoir::chat::respond;
use memoir::db::chat::{SESSION_WINDOW_MS, TRANSCRIPT_LIMIT};
use memoir::db::{DiaryDB, EntryInput};
use memoir::error::MemoirError;
use memoir::SharedDB;

/// Replays a fixed script of replies; records call count and last prompt.
struct ScriptedModel {
    replies: parking_lot::Mutex<VecDeque<Result<String, String>>>,
    calls: AtomicUsize,
    last_prompt: parking_lot::Mutex<String>,
}

impl ScriptedModel {
    fn new(replies: Vec<Result<&str, &str>>) -> Self {
        Self {
            replies: parking_lot::Mutex::new(
                replies
                    .into_iter()
                    .map(|r| r.map(str::to_string).map_err(str::to_string))
                    .collect(),
            ),
            calls: AtomicUsize::new(0),
            last_prompt: parking_lot::Mutex::new(String::new()),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, prompt: &str) -> Result<String, MemoirError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock() = prompt.to_string();
        match self.replies.lock().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(msg)) => Err(MemoirError::AiBackend(msg)),
            None => Err(MemoirError::AiBackend("script exhausted".into())),
        }
    }
}

/// Deterministic embedder: a few known phrases map to fixed directions,
/// everything else is orthogonal to them.
struct FakeEmbedder {
    calls: AtomicUsize,
}

impl FakeEmbedder {
    fn new() -> Self {
        Self { calls: AtomicUsize::new(0) }
    }
}

#[async_trait::async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoirError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if text.contains("hiking") {
            Ok(vec![1.0, 0.0, 0.0])
        } else if text.contains("cooking") {
            Ok(vec![0.0, 1.0, 0.0])
        } else {
            Ok(vec![0.0, 0.0, 1.0])
        }
    }
}

fn test_db() -> SharedDB {
    Arc::new(DiaryDB::open(":memory:").expect("in-memory db"))
}

/// Seed one entry whose chunks point in the given direction.
fn seed_entry(db: &SharedDB, owner: i64, title: &str, chunks: &[(&str, Vec<f32>)]) -> i64 {
    let entry = db
        .create_entry(owner, &EntryInput {
            title: title.into(),
            content: chunks.iter().map(|(t, _)| *t).collect::<Vec<_>>().join("\n"),
            mood: None,
        })
        .unwrap();
    let batch: Vec<(String, Vec<f32>)> =
        chunks.iter().map(|(t, v)| (t.to_string(), v.clone())).collect();
    db.replace_chunks(entry.id, owner, &batch).unwrap();
    entry.id
}

#[tokio::test]
async fn empty_store_short_circuits_without_model_call() {
    let db = test_db();
    let model = ScriptedModel::new(vec![Ok("should never be used")]);
    let embedder = FakeEmbedder::new();

    let outcome = respond(&db, &model, &embedder, 1, "s1", "hi").await.unwrap();

    assert!(outcome.answer.contains("don't have any diary entries yet"));
    assert!(!outcome.show_suggestions);
    assert!(outcome.related_entry_ids.is_empty());
    assert_eq!(model.calls(), 0, "onboarding must not invoke the model");
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);

    // both sides of the exchange are still logged
    let turns = db.recent_turns(1, "s1", SESSION_WINDOW_MS, TRANSCRIPT_LIMIT).unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].role, "user");
    assert_eq!(turns[0].message, "hi");
    assert_eq!(turns[1].role, "assistant");
}

#[tokio::test]
async fn grounded_answer_with_deduped_suggestions() {
    let db = test_db();
    // two entries; the first contributes two chunks, all aligned with "hiking"
    let e1 = seed_entry(&db, 1, "trail day", &[
        ("went hiking at dawn", vec![1.0, 0.0, 0.0]),
        ("the hiking trail was muddy", vec![0.9, 0.1, 0.0]),
    ]);
    let e2 = seed_entry(&db, 1, "summit", &[
        ("another hiking trip", vec![0.8, 0.0, 0.2]),
    ]);

    let model = ScriptedModel::new(vec![Ok(
        "You wrote about two hikes recently.\nSHOW_SUGGESTIONS: YES",
    )]);
    let embedder = FakeEmbedder::new();

    let outcome = respond(&db, &model, &embedder, 1, "s1", "when did I go hiking?")
        .await
        .unwrap();

    assert_eq!(outcome.answer, "You wrote about two hikes recently.");
    assert!(outcome.show_suggestions);
    // three chunks, two distinct entries, rank order preserved
    assert_eq!(outcome.related_entry_ids, vec![e1, e2]);
    assert_eq!(model.calls(), 1);

    // the assistant turn carries the suggested ids
    let turns = db.recent_turns(1, "s1", SESSION_WINDOW_MS, TRANSCRIPT_LIMIT).unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[1].suggested_entry_ids, Some(vec![e1, e2]));
}

#[tokio::test]
async fn no_flag_means_no_suggested_ids() {
    let db = test_db();
    seed_entry(&db, 1, "trail day", &[("went hiking", vec![1.0, 0.0, 0.0])]);

    let model = ScriptedModel::new(vec![Ok("Hi! How can I help?\nSHOW_SUGGESTIONS: NO")]);
    let embedder = FakeEmbedder::new();

    let outcome = respond(&db, &model, &embedder, 1, "s1", "thanks, about hiking").await.unwrap();
    assert!(!outcome.show_suggestions);
    assert!(outcome.related_entry_ids.is_empty());

    let turns = db.recent_turns(1, "s1", SESSION_WINDOW_MS, TRANSCRIPT_LIMIT).unwrap();
    assert_eq!(turns[1].suggested_entry_ids, None);
}

#[tokio::test]
async fn no_relevant_match_still_calls_model_with_sentinel() {
    let db = test_db();
    // chunk orthogonal to the "cooking" query direction
    seed_entry(&db, 1, "trail day", &[("went hiking", vec![1.0, 0.0, 0.0])]);

    let model = ScriptedModel::new(vec![Ok(
        "I couldn't find anything about that.\nSHOW_SUGGESTIONS: NO",
    )]);
    let embedder = FakeEmbedder::new();

    let outcome = respond(&db, &model, &embedder, 1, "s1", "what about cooking?").await.unwrap();
    assert_eq!(model.calls(), 1, "empty ranking is not an error, model still runs");
    assert!(!outcome.show_suggestions);
    assert!(model.last_prompt.lock().contains("No relevant diary entries found."));
}

#[tokio::test]
async fn missing_control_line_defaults_to_no_suggestions() {
    let db = test_db();
    seed_entry(&db, 1, "trail day", &[("went hiking", vec![1.0, 0.0, 0.0])]);

    let model = ScriptedModel::new(vec![Ok("A reply without any control line.")]);
    let embedder = FakeEmbedder::new();

    let outcome = respond(&db, &model, &embedder, 1, "s1", "hiking?").await.unwrap();
    assert_eq!(outcome.answer, "A reply without any control line.");
    assert!(!outcome.show_suggestions);
    assert!(outcome.related_entry_ids.is_empty());
}

#[tokio::test]
async fn transient_failure_retries_then_succeeds() {
    let db = test_db();
    seed_entry(&db, 1, "trail day", &[("went hiking", vec![1.0, 0.0, 0.0])]);

    let model = ScriptedModel::new(vec![
        Err("503 upstream"),
        Err("timeout"),
        Ok("Found it on the third try.\nSHOW_SUGGESTIONS: NO"),
    ]);
    let embedder = FakeEmbedder::new();

    let outcome = respond(&db, &model, &embedder, 1, "s1", "hiking?").await.unwrap();
    assert_eq!(model.calls(), 3);
    assert_eq!(outcome.answer, "Found it on the third try.");
}

#[tokio::test]
async fn model_down_degrades_to_apology() {
    let db = test_db();
    seed_entry(&db, 1, "trail day", &[("went hiking", vec![1.0, 0.0, 0.0])]);

    let model = ScriptedModel::new(vec![Err("down"), Err("down"), Err("down")]);
    let embedder = FakeEmbedder::new();

    let outcome = respond(&db, &model, &embedder, 1, "s1", "hiking?").await.unwrap();
    assert_eq!(model.calls(), 3, "three attempts total");
    assert!(outcome.answer.contains("trouble connecting"));
    assert!(!outcome.show_suggestions);
    assert!(outcome.related_entry_ids.is_empty());

    // the failed exchange is still part of the transcript
    let turns = db.recent_turns(1, "s1", SESSION_WINDOW_MS, TRANSCRIPT_LIMIT).unwrap();
    assert_eq!(turns.len(), 2);
}

#[tokio::test]
async fn transcript_reaches_the_prompt_on_followup() {
    let db = test_db();
    seed_entry(&db, 1, "trail day", &[("went hiking", vec![1.0, 0.0, 0.0])]);

    let model = ScriptedModel::new(vec![
        Ok("First answer.\nSHOW_SUGGESTIONS: NO"),
        Ok("Second answer.\nSHOW_SUGGESTIONS: NO"),
    ]);
    let embedder = FakeEmbedder::new();

    respond(&db, &model, &embedder, 1, "s1", "hiking?").await.unwrap();
    assert!(model.last_prompt.lock().contains("No previous conversation."));

    respond(&db, &model, &embedder, 1, "s1", "and the hiking weather?").await.unwrap();
    let prompt = model.last_prompt.lock().clone();
    assert!(prompt.contains("User: hiking?"));
    assert!(prompt.contains("Assistant: First answer."));
}

#[tokio::test]
async fn sessions_do_not_share_transcripts() {
    let db = test_db();
    seed_entry(&db, 1, "trail day", &[("went hiking", vec![1.0, 0.0, 0.0])]);

    let model = ScriptedModel::new(vec![
        Ok("Answer one.\nSHOW_SUGGESTIONS: NO"),
        Ok("Answer two.\nSHOW_SUGGESTIONS: NO"),
    ]);
    let embedder = FakeEmbedder::new();

    respond(&db, &model, &embedder, 1, "session-a", "hiking?").await.unwrap();
    respond(&db, &model, &embedder, 1, "session-b", "more hiking?").await.unwrap();

    // fresh session sees the placeholder, not session-a's turns
    assert!(model.last_prompt.lock().contains("No previous conversation."));
}

#[tokio::test]
async fn empty_question_is_rejected() {
    let db = test_db();
    let model = ScriptedModel::new(vec![]);
    let embedder = FakeEmbedder::new();

    let err = respond(&db, &model, &embedder, 1, "s1", "   ").await.unwrap_err();
    assert!(matches!(err, MemoirError::EmptyQuestion));
    assert_eq!(model.calls(), 0);
}
