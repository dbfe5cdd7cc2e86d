//! SQLite-backed storage for entries, chunks, and chat turns.

pub mod chat;
mod chunks;
mod entries;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use serde::{Deserialize, Serialize};

use crate::error::MemoirError;

/// Set busy_timeout on every connection handed out by the pool.
/// Prevents SQLITE_BUSY under concurrent write pressure (reindex + chat).
#[derive(Debug)]
struct BusyTimeoutCustomizer;
impl r2d2::CustomizeConnection<rusqlite::Connection, rusqlite::Error> for BusyTimeoutCustomizer {
    fn on_acquire(&self, conn: &mut rusqlite::Connection) -> Result<(), rusqlite::Error> {
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(())
    }
}

type PooledConn = r2d2::PooledConnection<SqliteConnectionManager>;

const MAX_TITLE_LEN: usize = 255;
const MAX_CONTENT_LEN: usize = 65_536;
const MAX_MOOD_LEN: usize = 64;

/// A diary entry. Owned text document; chunks are derived from `content`.
#[derive(Debug, Clone, Serialize)]
pub struct Entry {
    pub id: i64,
    pub owner_id: i64,
    pub title: String,
    pub content: String,
    pub mood: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct EntryInput {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub mood: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EntryUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    /// `None` leaves the mood unchanged, `Some(None)` clears it,
    /// `Some(Some(_))` replaces it. An explicit JSON `null` clears.
    #[serde(default, deserialize_with = "double_option")]
    pub mood: Option<Option<String>>,
}

/// Keeps "field absent" distinct from "field is null": the outer Option is
/// filled whenever the key is present at all.
fn double_option<'de, D>(de: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(de).map(Some)
}

/// A retrievable fragment of one entry, with its embedding.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: i64,
    pub entry_id: i64,
    pub owner_id: i64,
    pub chunk_text: String,
    pub embedding: Vec<f32>,
    pub chunk_index: i64,
}

/// One message in a conversation. Immutable once written.
#[derive(Debug, Clone, Serialize)]
pub struct ChatTurn {
    pub id: i64,
    pub user_id: i64,
    pub session_id: String,
    pub role: String,
    pub message: String,
    /// Entry ids suggested alongside this turn (assistant turns only),
    /// stored as a JSON array string.
    pub suggested_entry_ids: Option<Vec<i64>>,
    pub created_at: i64,
}

pub(crate) fn validate_entry_input(input: &EntryInput) -> Result<(), MemoirError> {
    validate_entry_fields(&input.title, &input.content, input.mood.as_deref())
}

/// Field-level limits, shared by create and update so the merged result of a
/// partial update obeys the same bounds as a fresh entry.
pub(crate) fn validate_entry_fields(
    title: &str,
    content: &str,
    mood: Option<&str>,
) -> Result<(), MemoirError> {
    if title.trim().is_empty() {
        return Err(MemoirError::EmptyTitle);
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(MemoirError::Validation("title too long".into()));
    }
    if content.chars().count() > MAX_CONTENT_LEN {
        return Err(MemoirError::Validation("content too long".into()));
    }
    if let Some(mood) = mood {
        if mood.chars().count() > MAX_MOOD_LEN {
            return Err(MemoirError::Validation("mood too long".into()));
        }
    }
    Ok(())
}

pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before Unix epoch")
        .as_millis() as i64
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id INTEGER NOT NULL,
    title TEXT NOT NULL,
    content TEXT NOT NULL DEFAULT '',
    mood TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_entries_owner ON entries(owner_id);
CREATE INDEX IF NOT EXISTS idx_entries_created ON entries(created_at);

CREATE TABLE IF NOT EXISTS chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entry_id INTEGER NOT NULL REFERENCES entries(id) ON DELETE CASCADE,
    owner_id INTEGER NOT NULL,
    chunk_text TEXT NOT NULL,
    embedding BLOB NOT NULL,
    chunk_index INTEGER NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_chunks_owner ON chunks(owner_id);
CREATE INDEX IF NOT EXISTS idx_chunks_entry ON chunks(entry_id);

CREATE TABLE IF NOT EXISTS chat_turns (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    session_id TEXT NOT NULL,
    role TEXT NOT NULL,
    message TEXT NOT NULL,
    suggested_entry_ids TEXT,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_turns_session ON chat_turns(user_id, session_id);
CREATE INDEX IF NOT EXISTS idx_turns_created ON chat_turns(created_at);
"#;

/// SQLite-backed diary store.
pub struct DiaryDB {
    pool: Pool<SqliteConnectionManager>,
}

impl DiaryDB {
    fn conn(&self) -> Result<PooledConn, MemoirError> {
        self.pool.get().map_err(|e| MemoirError::Internal(format!("pool: {e}")))
    }

    /// Open (or create) a database at the given path.
    /// Pool size defaults to 8 (1 writer + 7 readers in WAL mode).
    pub fn open(path: &str) -> Result<Self, MemoirError> {
        let pool_size = if path == ":memory:" { 2 } else { 8 };
        let manager = if path == ":memory:" {
            // Shared cache so all pool connections see the same in-memory DB.
            // Each test gets a unique name to avoid cross-test pollution.
            let name = uuid::Uuid::new_v4().to_string();
            SqliteConnectionManager::file(format!("file:{name}?mode=memory&cache=shared"))
        } else {
            SqliteConnectionManager::file(path)
        };
        let pool = Pool::builder()
            .max_size(pool_size)
            .connection_customizer(Box::new(BusyTimeoutCustomizer))
            .build(manager)
            .map_err(|e| MemoirError::Internal(format!("pool: {e}")))?;

        let conn = pool.get().map_err(|e| MemoirError::Internal(e.to_string()))?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;
        drop(conn);
        Ok(Self { pool })
    }
}

fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<Entry> {
    Ok(Entry {
        id: row.get("id")?,
        owner_id: row.get("owner_id")?,
        title: row.get("title")?,
        content: row.get("content")?,
        mood: row.get("mood")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn row_to_chunk(row: &rusqlite::Row) -> rusqlite::Result<Chunk> {
    let blob: Vec<u8> = row.get("embedding")?;
    Ok(Chunk {
        id: row.get("id")?,
        entry_id: row.get("entry_id")?,
        owner_id: row.get("owner_id")?,
        chunk_text: row.get("chunk_text")?,
        embedding: crate::ai::bytes_to_embedding(&blob),
        chunk_index: row.get("chunk_index")?,
    })
}

fn row_to_turn(row: &rusqlite::Row) -> rusqlite::Result<ChatTurn> {
    let ids_json: Option<String> = row.get("suggested_entry_ids")?;
    Ok(ChatTurn {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        session_id: row.get("session_id")?,
        role: row.get("role")?,
        message: row.get("message")?,
        suggested_entry_ids: ids_json.and_then(|s| serde_json::from_str(&s).ok()),
        created_at: row.get("created_at")?,
    })
}
